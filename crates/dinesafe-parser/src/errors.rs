use polars::prelude::PolarsError;
use thiserror::Error;

/// Whole-payload problems. Per-row casting issues never surface here; they are
/// dropped or coerced by the normalizer and counted in its report.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("CSV error: {source}")]
    Csv {
        #[source]
        source: csv::Error,
    },

    #[error("payload did not contain a header row")]
    MissingHeader,

    #[error("required column '{column}' is not present in the payload")]
    MissingColumn { column: &'static str },

    #[error("payload did not contain any data rows")]
    EmptyData,

    #[error("all {input_rows} rows failed mandatory-field casting")]
    AllRowsDropped { input_rows: usize },

    #[error("dataset schema mismatch: {message}")]
    Schema { message: String },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

impl From<csv::Error> for FormatError {
    fn from(source: csv::Error) -> Self {
        FormatError::Csv { source }
    }
}
