pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{PipelineError, Result};
pub use fetcher::{CkanFetcher, Fetcher, RawFetch};
pub use loader::{DatasetLoader, Freshness, LoadedDataset, Origin, SnapshotState};
pub use snapshot::{DateRange, SnapshotMetadata, SnapshotSource, SnapshotStore, METADATA_FILE};
