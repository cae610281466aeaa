use polars::prelude::DataType;

/// Bump whenever a column is added, removed, renamed or retyped. Snapshots
/// written under another version are rejected on load.
pub const SCHEMA_VERSION: u32 = 1;

pub const ROW_ID: &str = "row_id";
pub const ESTABLISHMENT_ID: &str = "establishment_id";
pub const INSPECTION_ID: &str = "inspection_id";
pub const ESTABLISHMENT_NAME: &str = "establishment_name";
pub const ESTABLISHMENT_TYPE: &str = "establishment_type";
pub const ESTABLISHMENT_ADDRESS: &str = "establishment_address";
pub const ESTABLISHMENT_STATUS: &str = "establishment_status";
pub const MIN_INSPECTIONS_PER_YEAR: &str = "min_inspections_per_year";
pub const INFRACTION_DETAILS: &str = "infraction_details";
pub const INSPECTION_DATE: &str = "inspection_date";
pub const SEVERITY: &str = "severity";
pub const ACTION: &str = "action";
pub const OUTCOME: &str = "outcome";
pub const AMOUNT_FINED: &str = "amount_fined";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const SEVERITY_RANK: &str = "severity_rank";

pub const DATASET_COLUMNS: [&str; 17] = [
    ROW_ID,
    ESTABLISHMENT_ID,
    INSPECTION_ID,
    ESTABLISHMENT_NAME,
    ESTABLISHMENT_TYPE,
    ESTABLISHMENT_ADDRESS,
    ESTABLISHMENT_STATUS,
    MIN_INSPECTIONS_PER_YEAR,
    INFRACTION_DETAILS,
    INSPECTION_DATE,
    SEVERITY,
    ACTION,
    OUTCOME,
    AMOUNT_FINED,
    LATITUDE,
    LONGITUDE,
    SEVERITY_RANK,
];

/// Columns that may never hold nulls in a normalized dataset.
pub const MANDATORY_COLUMNS: [&str; 4] = [
    ESTABLISHMENT_ID,
    INSPECTION_DATE,
    ESTABLISHMENT_STATUS,
    SEVERITY,
];

pub fn column_dtype(name: &str) -> Option<DataType> {
    let dtype = match name {
        ROW_ID | MIN_INSPECTIONS_PER_YEAR => DataType::Int64,
        INSPECTION_DATE => DataType::Date,
        AMOUNT_FINED | LATITUDE | LONGITUDE => DataType::Float64,
        SEVERITY_RANK => DataType::Int32,
        ESTABLISHMENT_ID | INSPECTION_ID | ESTABLISHMENT_NAME | ESTABLISHMENT_TYPE
        | ESTABLISHMENT_ADDRESS | ESTABLISHMENT_STATUS | INFRACTION_DETAILS | SEVERITY
        | ACTION | OUTCOME => DataType::String,
        _ => return None,
    };
    Some(dtype)
}

const UPSTREAM_COLUMN_COUNT: usize = 16;

/// Header names as published in the DineSafe datastore dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamColumn {
    RowId,
    EstablishmentId,
    InspectionId,
    EstablishmentName,
    EstablishmentType,
    EstablishmentAddress,
    EstablishmentStatus,
    MinInspectionsPerYear,
    InfractionDetails,
    InspectionDate,
    Severity,
    Action,
    Outcome,
    AmountFined,
    Latitude,
    Longitude,
}

impl UpstreamColumn {
    pub const ALL: [UpstreamColumn; UPSTREAM_COLUMN_COUNT] = [
        UpstreamColumn::RowId,
        UpstreamColumn::EstablishmentId,
        UpstreamColumn::InspectionId,
        UpstreamColumn::EstablishmentName,
        UpstreamColumn::EstablishmentType,
        UpstreamColumn::EstablishmentAddress,
        UpstreamColumn::EstablishmentStatus,
        UpstreamColumn::MinInspectionsPerYear,
        UpstreamColumn::InfractionDetails,
        UpstreamColumn::InspectionDate,
        UpstreamColumn::Severity,
        UpstreamColumn::Action,
        UpstreamColumn::Outcome,
        UpstreamColumn::AmountFined,
        UpstreamColumn::Latitude,
        UpstreamColumn::Longitude,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            UpstreamColumn::RowId => "_id",
            UpstreamColumn::EstablishmentId => "Establishment ID",
            UpstreamColumn::InspectionId => "Inspection ID",
            UpstreamColumn::EstablishmentName => "Establishment Name",
            UpstreamColumn::EstablishmentType => "Establishment Type",
            UpstreamColumn::EstablishmentAddress => "Establishment Address",
            UpstreamColumn::EstablishmentStatus => "Establishment Status",
            UpstreamColumn::MinInspectionsPerYear => "Min. Inspections Per Year",
            UpstreamColumn::InfractionDetails => "Infraction Details",
            UpstreamColumn::InspectionDate => "Inspection Date",
            UpstreamColumn::Severity => "Severity",
            UpstreamColumn::Action => "Action",
            UpstreamColumn::Outcome => "Outcome",
            UpstreamColumn::AmountFined => "Amount Fined",
            UpstreamColumn::Latitude => "Latitude",
            UpstreamColumn::Longitude => "Longitude",
        }
    }

    /// A payload without this column cannot be normalized at all.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            UpstreamColumn::EstablishmentId | UpstreamColumn::InspectionDate
        )
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Position of each upstream column within a particular payload's header.
#[derive(Debug, Clone)]
pub struct ColumnLookup {
    positions: [Option<usize>; UPSTREAM_COLUMN_COUNT],
}

impl ColumnLookup {
    /// Matches headers case-insensitively after trimming.
    pub fn resolve(headers: &[String]) -> Self {
        let mut positions = [None; UPSTREAM_COLUMN_COUNT];
        for column in UpstreamColumn::ALL {
            positions[column.index()] = headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(column.header()));
        }
        Self { positions }
    }

    pub fn position(&self, column: UpstreamColumn) -> Option<usize> {
        self.positions[column.index()]
    }

    pub fn missing(&self) -> impl Iterator<Item = UpstreamColumn> + '_ {
        UpstreamColumn::ALL
            .into_iter()
            .filter(|column| self.position(*column).is_none())
    }
}
