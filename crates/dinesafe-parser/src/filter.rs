use std::collections::BTreeSet;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;

use crate::dataset::{date_to_days, Dataset};
use crate::errors::FormatError;
use crate::model::{EstablishmentStatus, Severity};
use crate::schema;

/// The choices a dashboard offers for each filter widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterDomains {
    pub severities: Vec<Severity>,
    pub statuses: Vec<EstablishmentStatus>,
    pub establishment_types: Vec<String>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl FilterDomains {
    pub fn from_dataset(dataset: &Dataset) -> Result<Self, FormatError> {
        let df = dataset.frame();

        let severities: BTreeSet<Severity> = df
            .column(schema::SEVERITY)?
            .str()?
            .into_iter()
            .flatten()
            .filter_map(Severity::recognize)
            .collect();
        let statuses: BTreeSet<EstablishmentStatus> = df
            .column(schema::ESTABLISHMENT_STATUS)?
            .str()?
            .into_iter()
            .flatten()
            .filter_map(EstablishmentStatus::recognize)
            .collect();
        let establishment_types: BTreeSet<String> = df
            .column(schema::ESTABLISHMENT_TYPE)?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();

        Ok(Self {
            severities: severities.into_iter().collect(),
            statuses: statuses.into_iter().collect(),
            establishment_types: establishment_types.into_iter().collect(),
            date_range: dataset.date_range()?,
        })
    }
}

/// Row selection driven by the dashboard's widgets. Empty selections and
/// unset bounds do not restrict anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionFilter {
    pub severities: Vec<Severity>,
    pub statuses: Vec<EstablishmentStatus>,
    pub establishment_types: Vec<String>,
    /// Inclusive.
    pub date_from: Option<NaiveDate>,
    /// Inclusive.
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive substring of the establishment name.
    pub name_contains: Option<String>,
}

impl InspectionFilter {
    pub fn is_unrestricted(&self) -> bool {
        self.severities.is_empty()
            && self.statuses.is_empty()
            && self.establishment_types.is_empty()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.name_contains.as_deref().map_or(true, str::is_empty)
    }

    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset, FormatError> {
        if self.is_unrestricted() {
            return Ok(dataset.clone());
        }

        let df = dataset.frame();
        let severity = df.column(schema::SEVERITY)?.str()?;
        let status = df.column(schema::ESTABLISHMENT_STATUS)?.str()?;
        let establishment_type = df.column(schema::ESTABLISHMENT_TYPE)?.str()?;
        let name = df.column(schema::ESTABLISHMENT_NAME)?.str()?;
        let date_days = df
            .column(schema::INSPECTION_DATE)?
            .cast(&DataType::Int32)?;
        let dates = date_days.i32()?;

        let severity_names: Vec<&str> = self.severities.iter().map(Severity::as_str).collect();
        let status_names: Vec<&str> = self
            .statuses
            .iter()
            .map(EstablishmentStatus::as_str)
            .collect();
        let from = self.date_from.map(date_to_days);
        let to = self.date_to.map(date_to_days);
        let needle = self
            .name_contains
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase);

        let mut mask = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let keep = selected(&severity_names, severity.get(idx))
                && selected(&status_names, status.get(idx))
                && selected_owned(&self.establishment_types, establishment_type.get(idx))
                && within(dates.get(idx), from, to)
                && match &needle {
                    None => true,
                    Some(needle) => name
                        .get(idx)
                        .is_some_and(|value| value.to_lowercase().contains(needle.as_str())),
                };
            mask.push(keep);
        }

        let mask = BooleanChunked::from_slice("mask".into(), &mask);
        Ok(Dataset::from_validated(df.filter(&mask)?))
    }
}

fn selected(choices: &[&str], value: Option<&str>) -> bool {
    choices.is_empty() || value.is_some_and(|value| choices.contains(&value))
}

fn selected_owned(choices: &[String], value: Option<&str>) -> bool {
    choices.is_empty() || value.is_some_and(|value| choices.iter().any(|choice| choice == value))
}

fn within(days: Option<i32>, from: Option<i32>, to: Option<i32>) -> bool {
    let Some(days) = days else {
        return false;
    };
    from.map_or(true, |from| days >= from) && to.map_or(true, |to| days <= to)
}
