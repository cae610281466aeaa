use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, TimeDelta, Utc};
use dinesafe_parser::{Dataset, NormalizeReport, SCHEMA_VERSION};
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::is_within;
use crate::error::{PipelineError, Result};

pub const METADATA_FILE: &str = "metadata.json";

const DATA_PREFIX: &str = "dinesafe_";
const DATA_SUFFIX: &str = ".parquet";
const PARTIAL_SUFFIX: &str = ".partial";
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

/// The pointer record describing the current snapshot. Written 1:1 with a
/// data file and only after that file is complete on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// File name relative to the snapshot directory.
    pub data_file: String,
    pub fetched_at: DateTime<Utc>,
    pub row_count: usize,
    pub schema_version: u32,
    pub source: String,
    pub payload_hash: String,
    pub columns: Vec<String>,
    pub date_range: Option<DateRange>,
    pub unique_establishments: usize,
    pub report: NormalizeReport,
}

impl SnapshotMetadata {
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.fetched_at)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        is_within(now, self.fetched_at, max_age)
    }
}

/// Provenance of a dataset about to be persisted.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    pub source: String,
    pub payload_hash: String,
    pub report: NormalizeReport,
    pub fetched_at: DateTime<Utc>,
}

/// Owns the snapshot directory: parquet data files plus one `metadata.json`
/// pointing at the newest of them.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn save(&self, dataset: &Dataset, source: SnapshotSource) -> Result<SnapshotMetadata> {
        fs::create_dir_all(&self.dir)?;

        let fetched_at = self.next_timestamp(source.fetched_at)?;
        let data_file = format!(
            "{DATA_PREFIX}{}{DATA_SUFFIX}",
            fetched_at.format(FILE_TIMESTAMP_FORMAT)
        );
        let data_path = self.dir.join(&data_file);
        let partial_path = self.dir.join(format!("{data_file}{PARTIAL_SUFFIX}"));

        {
            let mut file = File::create(&partial_path)?;
            let mut frame = dataset.frame().clone();
            ParquetWriter::new(&mut file)
                .with_compression(ParquetCompression::Zstd(None))
                .with_statistics(StatisticsOptions::default())
                .finish(&mut frame)?;
            file.sync_all()?;
        }
        fs::rename(&partial_path, &data_path)?;
        debug!(path = %data_path.display(), rows = dataset.height(), "Wrote snapshot data file");

        let metadata = SnapshotMetadata {
            data_file,
            fetched_at,
            row_count: dataset.height(),
            schema_version: dataset.schema_version(),
            source: source.source,
            payload_hash: source.payload_hash,
            columns: dataset.column_names(),
            date_range: dataset
                .date_range()?
                .map(|(min, max)| DateRange { min, max }),
            unique_establishments: dataset.unique_establishments()?,
            report: source.report,
        };
        self.write_metadata(&metadata)?;

        info!(
            data_file = %metadata.data_file,
            rows = metadata.row_count,
            fetched_at = %metadata.fetched_at,
            "Saved snapshot"
        );
        Ok(metadata)
    }

    /// Timestamps are stored at microsecond precision and are strictly
    /// increasing across saves, so data file names never collide.
    fn next_timestamp(&self, requested: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let requested = requested.trunc_subsecs(6);
        let recorded = match self.read_metadata() {
            Ok(metadata) => metadata.map(|metadata| metadata.fetched_at),
            Err(PipelineError::SnapshotCorrupt { .. }) => None,
            Err(err) => return Err(err),
        };
        let newest_file = self
            .list_snapshots()?
            .iter()
            .filter_map(|path| timestamp_from_path(path))
            .max();

        let floor = recorded.max(newest_file);
        Ok(match floor {
            Some(floor) if requested <= floor => floor + TimeDelta::microseconds(1),
            _ => requested,
        })
    }

    fn write_metadata(&self, metadata: &SnapshotMetadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        let tmp_path = self.dir.join(format!("{METADATA_FILE}.tmp"));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, self.metadata_path())?;
        Ok(())
    }

    fn read_metadata(&self) -> Result<Option<SnapshotMetadata>> {
        let path = self.metadata_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| PipelineError::SnapshotCorrupt {
                path,
                reason: format!("metadata is not valid: {err}"),
            })
    }

    pub fn latest_metadata(&self) -> Result<Option<SnapshotMetadata>> {
        self.read_metadata()
    }

    /// The snapshot `metadata.json` points at. `Ok(None)` when nothing has
    /// been saved yet.
    pub fn load_latest(&self) -> Result<Option<(Dataset, SnapshotMetadata)>> {
        let Some(metadata) = self.read_metadata()? else {
            return Ok(None);
        };

        let corrupt = |path: PathBuf, reason: String| PipelineError::SnapshotCorrupt { path, reason };

        if !is_plain_file_name(&metadata.data_file) {
            return Err(corrupt(
                self.metadata_path(),
                format!("data_file '{}' is not a plain file name", metadata.data_file),
            ));
        }
        if metadata.schema_version != SCHEMA_VERSION {
            return Err(corrupt(
                self.metadata_path(),
                format!(
                    "schema version {} does not match {SCHEMA_VERSION}",
                    metadata.schema_version
                ),
            ));
        }

        let data_path = self.dir.join(&metadata.data_file);
        let file = File::open(&data_path)
            .map_err(|err| corrupt(data_path.clone(), format!("cannot open data file: {err}")))?;
        let frame = ParquetReader::new(file)
            .finish()
            .map_err(|err| corrupt(data_path.clone(), format!("cannot read parquet: {err}")))?;
        let dataset = Dataset::from_frame(frame)
            .map_err(|err| corrupt(data_path.clone(), err.to_string()))?;

        if dataset.height() != metadata.row_count {
            return Err(corrupt(
                data_path,
                format!(
                    "metadata records {} rows but the data file has {}",
                    metadata.row_count,
                    dataset.height()
                ),
            ));
        }

        debug!(data_file = %metadata.data_file, rows = metadata.row_count, "Loaded snapshot from disk");
        Ok(Some((dataset, metadata)))
    }

    /// Data files in the directory, oldest first.
    pub fn list_snapshots(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(DATA_PREFIX) && name.ends_with(DATA_SUFFIX) {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

fn timestamp_from_path(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.strip_prefix(DATA_PREFIX)?.strip_suffix(DATA_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, FILE_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
