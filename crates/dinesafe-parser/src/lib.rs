pub mod dataset;
pub mod errors;
pub mod filter;
pub mod heatmap;
pub mod model;
pub mod normalize;
pub mod raw;
pub mod schema;
pub mod summary;

pub use dataset::Dataset;
pub use errors::FormatError;
pub use filter::{FilterDomains, InspectionFilter};
pub use heatmap::{heatmap_points, HeatmapPoint};
pub use model::{EstablishmentStatus, InspectionRecord, Severity};
pub use normalize::{
    cast_row, normalize, Coercion, DropReason, NormalizeReport, Normalized, RawRow, RowOutcome,
};
pub use raw::RawTable;
pub use schema::{DATASET_COLUMNS, SCHEMA_VERSION};
pub use summary::DatasetSummary;
