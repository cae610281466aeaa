use std::collections::HashMap;

use crate::errors::FormatError;

/// Untyped table mirroring the upstream payload: a header row plus rows of
/// text cells. Every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Convenience constructor for fixtures and tests.
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        let mut table = Self::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|cell| cell.to_string()).collect());
        }
        table
    }

    /// Decodes a header-first CSV document. Ragged rows are padded with empty
    /// cells or truncated to the header width.
    pub fn from_csv(content: &str) -> Result<Self, FormatError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect();
        if headers.iter().all(|header| header.is_empty()) {
            return Err(FormatError::MissingHeader);
        }

        let mut table = Self::new(headers);
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    /// Stacks tables by column name. The result carries the union of all
    /// columns in first-seen order; cells a table did not have are empty.
    pub fn concat(tables: impl IntoIterator<Item = RawTable>) -> RawTable {
        let mut combined = RawTable::default();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for table in tables {
            let mapping: Vec<usize> = table
                .columns
                .iter()
                .map(|column| {
                    *positions.entry(column.clone()).or_insert_with(|| {
                        combined.columns.push(column.clone());
                        combined.columns.len() - 1
                    })
                })
                .collect();

            let width = combined.columns.len();
            for row in &mut combined.rows {
                row.resize(width, String::new());
            }
            for row in table.rows {
                let mut aligned = vec![String::new(); width];
                for (cell, target) in row.into_iter().zip(&mapping) {
                    aligned[*target] = cell;
                }
                combined.rows.push(aligned);
            }
        }

        combined
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
