use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::errors::FormatError;
use crate::model::{EstablishmentStatus, InspectionRecord, Severity};
use crate::raw::RawTable;
use crate::schema::{ColumnLookup, UpstreamColumn};

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub dataset: Dataset,
    pub report: NormalizeReport,
}

/// Diagnostics accumulated while casting a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub dropped_missing_establishment: usize,
    pub dropped_bad_date: usize,
    pub coerced_values: usize,
    pub unknown_severities: usize,
    pub unknown_statuses: usize,
    pub missing_columns: Vec<String>,
}

impl NormalizeReport {
    pub fn dropped_rows(&self) -> usize {
        self.dropped_missing_establishment + self.dropped_bad_date
    }

    fn record_drop(&mut self, reason: &DropReason) {
        match reason {
            DropReason::MissingEstablishmentId => self.dropped_missing_establishment += 1,
            DropReason::InvalidInspectionDate { .. } => self.dropped_bad_date += 1,
        }
    }

    fn record_coercions(&mut self, coercions: &[Coercion]) {
        self.coerced_values += coercions.len();
        for coercion in coercions {
            match coercion {
                Coercion::UnknownSeverity(_) => self.unknown_severities += 1,
                Coercion::UnknownStatus(_) => self.unknown_statuses += 1,
                Coercion::Unparsable { .. } => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingEstablishmentId,
    InvalidInspectionDate { raw: String },
}

/// A value that was replaced rather than kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coercion {
    UnknownSeverity(String),
    UnknownStatus(String),
    Unparsable { column: &'static str, raw: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Keep {
        record: InspectionRecord,
        coercions: Vec<Coercion>,
    },
    Drop(DropReason),
}

/// One payload row viewed through the resolved header positions.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    lookup: &'a ColumnLookup,
    values: &'a [String],
}

impl<'a> RawRow<'a> {
    pub fn new(lookup: &'a ColumnLookup, values: &'a [String]) -> Self {
        Self { lookup, values }
    }

    /// Trimmed cell text; empty cells and absent columns read as `None`.
    pub fn get(&self, column: UpstreamColumn) -> Option<&'a str> {
        let position = self.lookup.position(column)?;
        self.values
            .get(position)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Casts a whole payload onto the fixed schema. Rows failing a mandatory
/// field are dropped; everything else is coerced. Only structural problems
/// with the payload as a whole are errors.
pub fn normalize(raw: &RawTable) -> Result<Normalized, FormatError> {
    let lookup = ColumnLookup::resolve(raw.columns());
    if let Some(column) = lookup.missing().find(UpstreamColumn::is_required) {
        return Err(FormatError::MissingColumn {
            column: column.header(),
        });
    }
    if raw.is_empty() {
        return Err(FormatError::EmptyData);
    }

    let mut report = NormalizeReport {
        input_rows: raw.len(),
        missing_columns: lookup
            .missing()
            .map(|column| column.header().to_string())
            .collect(),
        ..NormalizeReport::default()
    };

    let mut records = Vec::with_capacity(raw.len());
    for values in raw.rows() {
        match cast_row(&RawRow::new(&lookup, values)) {
            RowOutcome::Keep { record, coercions } => {
                report.record_coercions(&coercions);
                records.push(record);
            }
            RowOutcome::Drop(reason) => report.record_drop(&reason),
        }
    }
    report.kept_rows = records.len();

    if records.is_empty() {
        return Err(FormatError::AllRowsDropped {
            input_rows: report.input_rows,
        });
    }

    let dataset = Dataset::from_records(&records)?;
    Ok(Normalized { dataset, report })
}

pub fn cast_row(row: &RawRow<'_>) -> RowOutcome {
    let Some(establishment_id) = row.get(UpstreamColumn::EstablishmentId) else {
        return RowOutcome::Drop(DropReason::MissingEstablishmentId);
    };
    let raw_date = row.get(UpstreamColumn::InspectionDate).unwrap_or_default();
    let Some(inspection_date) = parse_inspection_date(raw_date) else {
        return RowOutcome::Drop(DropReason::InvalidInspectionDate {
            raw: raw_date.to_string(),
        });
    };

    let mut coercions = Vec::new();

    let severity = match row.get(UpstreamColumn::Severity) {
        None => Severity::None,
        Some(value) => Severity::recognize(value).unwrap_or_else(|| {
            coercions.push(Coercion::UnknownSeverity(value.to_string()));
            Severity::Unknown
        }),
    };

    let establishment_status = match row.get(UpstreamColumn::EstablishmentStatus) {
        None => EstablishmentStatus::Unknown,
        Some(value) => EstablishmentStatus::recognize(value).unwrap_or_else(|| {
            coercions.push(Coercion::UnknownStatus(value.to_string()));
            EstablishmentStatus::Unknown
        }),
    };

    let record = InspectionRecord {
        row_id: cast_i64(row, UpstreamColumn::RowId, &mut coercions),
        establishment_id: establishment_id.to_string(),
        inspection_id: optional_text(row, UpstreamColumn::InspectionId),
        establishment_name: optional_text(row, UpstreamColumn::EstablishmentName),
        establishment_type: optional_text(row, UpstreamColumn::EstablishmentType),
        establishment_address: optional_text(row, UpstreamColumn::EstablishmentAddress),
        establishment_status,
        min_inspections_per_year: cast_i64(
            row,
            UpstreamColumn::MinInspectionsPerYear,
            &mut coercions,
        ),
        infraction_details: optional_text(row, UpstreamColumn::InfractionDetails),
        inspection_date,
        severity,
        action: optional_text(row, UpstreamColumn::Action),
        outcome: optional_text(row, UpstreamColumn::Outcome),
        amount_fined: cast_f64(row, UpstreamColumn::AmountFined, &mut coercions),
        latitude: cast_f64(row, UpstreamColumn::Latitude, &mut coercions),
        longitude: cast_f64(row, UpstreamColumn::Longitude, &mut coercions),
    };

    RowOutcome::Keep { record, coercions }
}

fn optional_text(row: &RawRow<'_>, column: UpstreamColumn) -> Option<String> {
    row.get(column).map(str::to_string)
}

pub(crate) fn parse_inspection_date(value: &str) -> Option<NaiveDate> {
    static DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.date())
}

fn cast_f64(
    row: &RawRow<'_>,
    column: UpstreamColumn,
    coercions: &mut Vec<Coercion>,
) -> Option<f64> {
    let value = row.get(column)?;
    let cleaned: String = if column == UpstreamColumn::AmountFined {
        value.chars().filter(|c| *c != '$' && *c != ',').collect()
    } else {
        value.to_string()
    };

    match cleaned.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Some(parsed),
        _ => {
            coercions.push(Coercion::Unparsable {
                column: column.header(),
                raw: value.to_string(),
            });
            None
        }
    }
}

fn cast_i64(
    row: &RawRow<'_>,
    column: UpstreamColumn,
    coercions: &mut Vec<Coercion>,
) -> Option<i64> {
    let value = row.get(column)?;
    // Upstream occasionally types the letter O for a zero.
    let cleaned = value.replace(['O', 'o'], "0");
    match cleaned.parse::<i64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            coercions.push(Coercion::Unparsable {
                column: column.header(),
                raw: value.to_string(),
            });
            None
        }
    }
}
