use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::errors::FormatError;
use crate::model::{EstablishmentStatus, InspectionRecord, Severity};
use crate::schema::{self, column_dtype, DATASET_COLUMNS, MANDATORY_COLUMNS, SCHEMA_VERSION};

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

/// Normalized inspections stored column-wise. The frame always carries
/// exactly [`DATASET_COLUMNS`] with their fixed dtypes.
#[derive(Debug, Clone)]
pub struct Dataset {
    df: DataFrame,
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.df.equals_missing(&other.df)
    }
}

impl Dataset {
    pub fn from_records(records: &[InspectionRecord]) -> Result<Self, FormatError> {
        let row_id: Vec<Option<i64>> = records.iter().map(|r| r.row_id).collect();
        let establishment_id: Vec<&str> = records
            .iter()
            .map(|r| r.establishment_id.as_str())
            .collect();
        let inspection_id: Vec<Option<&str>> =
            records.iter().map(|r| r.inspection_id.as_deref()).collect();
        let name: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.establishment_name.as_deref())
            .collect();
        let establishment_type: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.establishment_type.as_deref())
            .collect();
        let address: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.establishment_address.as_deref())
            .collect();
        let status: Vec<&str> = records
            .iter()
            .map(|r| r.establishment_status.as_str())
            .collect();
        let min_inspections: Vec<Option<i64>> = records
            .iter()
            .map(|r| r.min_inspections_per_year)
            .collect();
        let infraction: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.infraction_details.as_deref())
            .collect();
        let dates: Vec<i32> = records
            .iter()
            .map(|r| date_to_days(r.inspection_date))
            .collect();
        let severity: Vec<&str> = records.iter().map(|r| r.severity.as_str()).collect();
        let action: Vec<Option<&str>> = records.iter().map(|r| r.action.as_deref()).collect();
        let outcome: Vec<Option<&str>> = records.iter().map(|r| r.outcome.as_deref()).collect();
        let amount: Vec<Option<f64>> = records.iter().map(|r| r.amount_fined).collect();
        let latitude: Vec<Option<f64>> = records.iter().map(|r| r.latitude).collect();
        let longitude: Vec<Option<f64>> = records.iter().map(|r| r.longitude).collect();
        let rank: Vec<Option<i32>> = records.iter().map(|r| r.severity_rank()).collect();

        let date_series =
            Series::new(schema::INSPECTION_DATE.into(), dates).cast(&DataType::Date)?;

        let columns: Vec<Column> = vec![
            Series::new(schema::ROW_ID.into(), row_id).into(),
            Series::new(schema::ESTABLISHMENT_ID.into(), establishment_id).into(),
            Series::new(schema::INSPECTION_ID.into(), inspection_id).into(),
            Series::new(schema::ESTABLISHMENT_NAME.into(), name).into(),
            Series::new(schema::ESTABLISHMENT_TYPE.into(), establishment_type).into(),
            Series::new(schema::ESTABLISHMENT_ADDRESS.into(), address).into(),
            Series::new(schema::ESTABLISHMENT_STATUS.into(), status).into(),
            Series::new(schema::MIN_INSPECTIONS_PER_YEAR.into(), min_inspections).into(),
            Series::new(schema::INFRACTION_DETAILS.into(), infraction).into(),
            date_series.into(),
            Series::new(schema::SEVERITY.into(), severity).into(),
            Series::new(schema::ACTION.into(), action).into(),
            Series::new(schema::OUTCOME.into(), outcome).into(),
            Series::new(schema::AMOUNT_FINED.into(), amount).into(),
            Series::new(schema::LATITUDE.into(), latitude).into(),
            Series::new(schema::LONGITUDE.into(), longitude).into(),
            Series::new(schema::SEVERITY_RANK.into(), rank).into(),
        ];

        Ok(Self {
            df: DataFrame::new(columns)?,
        })
    }

    /// Wraps a frame read back from storage after checking it against the
    /// fixed schema and the mandatory-field invariants.
    pub fn from_frame(df: DataFrame) -> Result<Self, FormatError> {
        let names: Vec<&str> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str())
            .collect();
        if names != DATASET_COLUMNS {
            return Err(FormatError::Schema {
                message: format!("expected columns {DATASET_COLUMNS:?}, found {names:?}"),
            });
        }

        for name in DATASET_COLUMNS {
            let column = df.column(name)?;
            let expected = column_dtype(name).ok_or_else(|| FormatError::Schema {
                message: format!("no dtype registered for column '{name}'"),
            })?;
            if column.dtype() != &expected {
                return Err(FormatError::Schema {
                    message: format!(
                        "column '{name}' has dtype {}, expected {expected}",
                        column.dtype()
                    ),
                });
            }
        }

        for name in MANDATORY_COLUMNS {
            let nulls = df.column(name)?.null_count();
            if nulls > 0 {
                return Err(FormatError::Schema {
                    message: format!("mandatory column '{name}' contains {nulls} nulls"),
                });
            }
        }

        Ok(Self { df })
    }

    /// For frames derived from an already validated dataset (e.g. by row
    /// filtering), which cannot change the schema.
    pub(crate) fn from_validated(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn records(&self) -> Result<Vec<InspectionRecord>, FormatError> {
        let df = &self.df;
        let row_id = df.column(schema::ROW_ID)?.i64()?;
        let establishment_id = df.column(schema::ESTABLISHMENT_ID)?.str()?;
        let inspection_id = df.column(schema::INSPECTION_ID)?.str()?;
        let name = df.column(schema::ESTABLISHMENT_NAME)?.str()?;
        let establishment_type = df.column(schema::ESTABLISHMENT_TYPE)?.str()?;
        let address = df.column(schema::ESTABLISHMENT_ADDRESS)?.str()?;
        let status = df.column(schema::ESTABLISHMENT_STATUS)?.str()?;
        let min_inspections = df.column(schema::MIN_INSPECTIONS_PER_YEAR)?.i64()?;
        let infraction = df.column(schema::INFRACTION_DETAILS)?.str()?;
        let date_days = df
            .column(schema::INSPECTION_DATE)?
            .cast(&DataType::Int32)?;
        let dates = date_days.i32()?;
        let severity = df.column(schema::SEVERITY)?.str()?;
        let action = df.column(schema::ACTION)?.str()?;
        let outcome = df.column(schema::OUTCOME)?.str()?;
        let amount = df.column(schema::AMOUNT_FINED)?.f64()?;
        let latitude = df.column(schema::LATITUDE)?.f64()?;
        let longitude = df.column(schema::LONGITUDE)?.f64()?;

        let owned = |value: Option<&str>| value.map(str::to_string);

        let mut records = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let establishment = establishment_id.get(idx).ok_or_else(|| FormatError::Schema {
                message: format!("row {idx} has a null establishment_id"),
            })?;
            let inspection_date = dates
                .get(idx)
                .and_then(days_to_date)
                .ok_or_else(|| FormatError::Schema {
                    message: format!("row {idx} has an invalid inspection_date"),
                })?;
            let status_value = status.get(idx).unwrap_or_default();
            let establishment_status =
                EstablishmentStatus::recognize(status_value).ok_or_else(|| FormatError::Schema {
                    message: format!("row {idx} has unrecognised status '{status_value}'"),
                })?;
            let severity_value = severity.get(idx).unwrap_or_default();
            let severity = Severity::recognize(severity_value).ok_or_else(|| FormatError::Schema {
                message: format!("row {idx} has unrecognised severity '{severity_value}'"),
            })?;

            records.push(InspectionRecord {
                row_id: row_id.get(idx),
                establishment_id: establishment.to_string(),
                inspection_id: owned(inspection_id.get(idx)),
                establishment_name: owned(name.get(idx)),
                establishment_type: owned(establishment_type.get(idx)),
                establishment_address: owned(address.get(idx)),
                establishment_status,
                min_inspections_per_year: min_inspections.get(idx),
                infraction_details: owned(infraction.get(idx)),
                inspection_date,
                severity,
                action: owned(action.get(idx)),
                outcome: owned(outcome.get(idx)),
                amount_fined: amount.get(idx),
                latitude: latitude.get(idx),
                longitude: longitude.get(idx),
            });
        }
        Ok(records)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_frame(self) -> DataFrame {
        self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn schema_version(&self) -> u32 {
        SCHEMA_VERSION
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Earliest and latest inspection date, or `None` for an empty dataset.
    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, FormatError> {
        let days = self
            .df
            .column(schema::INSPECTION_DATE)?
            .cast(&DataType::Int32)?;
        let days = days.i32()?;
        let min = days.min().and_then(days_to_date);
        let max = days.max().and_then(days_to_date);
        Ok(min.zip(max))
    }

    pub fn unique_establishments(&self) -> Result<usize, FormatError> {
        Ok(self.df.column(schema::ESTABLISHMENT_ID)?.n_unique()?)
    }
}
