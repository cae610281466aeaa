use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Collapses an upstream vocabulary value into a lookup key: lowercase with all
/// whitespace removed, so `"NC - OB"` and `"nc-ob"` compare equal.
fn vocabulary_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Significant,
    Minor,
    NcOb,
    None,
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::Critical,
        Severity::Significant,
        Severity::Minor,
        Severity::NcOb,
        Severity::None,
        Severity::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Significant => "Significant",
            Severity::Minor => "Minor",
            Severity::NcOb => "NC-OB",
            Severity::None => "None",
            Severity::Unknown => "Unknown",
        }
    }

    /// Ordinal used for the derived `severity_rank` column.
    pub fn rank(&self) -> Option<i32> {
        match self {
            Severity::Critical => Some(3),
            Severity::Significant => Some(2),
            Severity::Minor => Some(1),
            Severity::NcOb | Severity::None => Some(0),
            Severity::Unknown => None,
        }
    }

    /// Maps an upstream spelling onto the closed vocabulary. Returns `None` for
    /// values that are not recognised; callers decide how to coerce them.
    pub fn recognize(value: &str) -> Option<Self> {
        match vocabulary_key(value).as_str() {
            "c-crucial" | "crucial" | "critical" | "c" => Some(Severity::Critical),
            "s-significant" | "significant" | "s" => Some(Severity::Significant),
            "m-minor" | "minor" | "m" => Some(Severity::Minor),
            "na-notapplicable" | "notapplicable" | "na" | "nc-ob" | "ncob" | "nc" => {
                Some(Severity::NcOb)
            }
            "none" => Some(Severity::None),
            "unknown" => Some(Severity::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EstablishmentStatus {
    Pass,
    ConditionalPass,
    Closed,
    Unknown,
}

impl EstablishmentStatus {
    pub const ALL: [EstablishmentStatus; 4] = [
        EstablishmentStatus::Pass,
        EstablishmentStatus::ConditionalPass,
        EstablishmentStatus::Closed,
        EstablishmentStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EstablishmentStatus::Pass => "Pass",
            EstablishmentStatus::ConditionalPass => "Conditional Pass",
            EstablishmentStatus::Closed => "Closed",
            EstablishmentStatus::Unknown => "Unknown",
        }
    }

    pub fn recognize(value: &str) -> Option<Self> {
        match vocabulary_key(value).as_str() {
            "pass" => Some(EstablishmentStatus::Pass),
            "conditionalpass" => Some(EstablishmentStatus::ConditionalPass),
            "closed" => Some(EstablishmentStatus::Closed),
            "unknown" => Some(EstablishmentStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for EstablishmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inspection event (one infraction line when an inspection found several).
///
/// Upstream has no primary key; establishment id, inspection date and
/// infraction details together identify a row, and duplicates are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub row_id: Option<i64>,
    pub establishment_id: String,
    pub inspection_id: Option<String>,
    pub establishment_name: Option<String>,
    pub establishment_type: Option<String>,
    pub establishment_address: Option<String>,
    pub establishment_status: EstablishmentStatus,
    pub min_inspections_per_year: Option<i64>,
    pub infraction_details: Option<String>,
    pub inspection_date: NaiveDate,
    pub severity: Severity,
    pub action: Option<String>,
    pub outcome: Option<String>,
    pub amount_fined: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl InspectionRecord {
    /// A record with only the mandatory fields populated.
    pub fn new(establishment_id: impl Into<String>, inspection_date: NaiveDate) -> Self {
        Self {
            row_id: None,
            establishment_id: establishment_id.into(),
            inspection_id: None,
            establishment_name: None,
            establishment_type: None,
            establishment_address: None,
            establishment_status: EstablishmentStatus::Unknown,
            min_inspections_per_year: None,
            infraction_details: None,
            inspection_date,
            severity: Severity::None,
            action: None,
            outcome: None,
            amount_fined: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn severity_rank(&self) -> Option<i32> {
        self.severity.rank()
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}
