use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;

use crate::dataset::Dataset;
use crate::errors::FormatError;
use crate::schema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub total_inspections: usize,
    pub unique_establishments: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Days between the earliest and latest inspection; 0 when empty.
    pub date_range_days: i64,
    /// Sorted by descending count, then by value.
    pub severity_counts: Vec<(String, usize)>,
    pub status_counts: Vec<(String, usize)>,
    pub establishment_type_counts: Vec<(String, usize)>,
}

impl DatasetSummary {
    pub fn from_dataset(dataset: &Dataset) -> Result<Self, FormatError> {
        let df = dataset.frame();
        let date_range = dataset.date_range()?;
        Ok(Self {
            total_inspections: dataset.height(),
            unique_establishments: dataset.unique_establishments()?,
            date_range,
            date_range_days: date_range.map_or(0, |(min, max)| (max - min).num_days()),
            severity_counts: value_counts(df.column(schema::SEVERITY)?.str()?),
            status_counts: value_counts(df.column(schema::ESTABLISHMENT_STATUS)?.str()?),
            establishment_type_counts: value_counts(
                df.column(schema::ESTABLISHMENT_TYPE)?.str()?,
            ),
        })
    }

    /// Mean number of inspection rows per establishment.
    pub fn inspections_per_establishment(&self) -> f64 {
        if self.unique_establishments == 0 {
            0.0
        } else {
            self.total_inspections as f64 / self.unique_establishments as f64
        }
    }

    pub fn most_common_severity(&self) -> Option<&str> {
        self.severity_counts.first().map(|(value, _)| value.as_str())
    }
}

fn value_counts(values: &StringChunked) -> Vec<(String, usize)> {
    ranked_counts(values.into_iter().flatten())
}

/// Occurrences of each value, most frequent first, ties by value.
pub(crate) fn ranked_counts<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}
