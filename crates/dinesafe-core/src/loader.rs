use std::sync::Arc;
use std::time::Duration;

use dinesafe_parser::{normalize, Dataset};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{PipelineError, Result};
use crate::fetcher::Fetcher;
use crate::snapshot::{SnapshotMetadata, SnapshotSource, SnapshotStore};

/// Where a served dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Memory,
    Disk,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Freshness {
    Fresh,
    /// Older than the requested max age, served because a refresh failed.
    Stale,
}

/// Freshness of the persisted snapshot relative to a max age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnapshotState {
    Absent,
    Fresh,
    Stale,
}

impl SnapshotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotState::Absent => "ABSENT",
            SnapshotState::Fresh => "FRESH",
            SnapshotState::Stale => "STALE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Arc<Dataset>,
    pub metadata: SnapshotMetadata,
    pub origin: Origin,
    pub freshness: Freshness,
}

/// Ages with the snapshot it holds: an entry loaded from an older snapshot
/// on disk expires when that snapshot would.
#[derive(Debug, Clone)]
struct CachedDataset {
    dataset: Arc<Dataset>,
    metadata: SnapshotMetadata,
}

impl CachedDataset {
    fn serve(&self, origin: Origin, freshness: Freshness) -> LoadedDataset {
        LoadedDataset {
            dataset: Arc::clone(&self.dataset),
            metadata: self.metadata.clone(),
            origin,
            freshness,
        }
    }
}

/// Serves the dataset from memory, then disk, then the network, in that
/// order, depending on age.
pub struct DatasetLoader<F: Fetcher, C: Clock = SystemClock> {
    fetcher: F,
    store: SnapshotStore,
    clock: C,
    cached: Option<CachedDataset>,
    fetches: usize,
}

impl<F: Fetcher> DatasetLoader<F, SystemClock> {
    pub fn new(fetcher: F, store: SnapshotStore) -> Self {
        Self::with_clock(fetcher, store, SystemClock)
    }
}

impl<F: Fetcher, C: Clock> DatasetLoader<F, C> {
    pub fn with_clock(fetcher: F, store: SnapshotStore, clock: C) -> Self {
        Self {
            fetcher,
            store,
            clock,
            cached: None,
            fetches: 0,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Number of network fetches attempted by this loader.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn get_dataset(&mut self, max_age: Duration) -> Result<LoadedDataset> {
        let now = self.clock.now();

        if let Some(cached) = &self.cached {
            if cached.metadata.is_fresh(now, max_age) {
                return Ok(cached.serve(Origin::Memory, Freshness::Fresh));
            }
        }

        let stale_disk = match self.load_from_disk()? {
            Some((dataset, metadata)) if metadata.is_fresh(now, max_age) => {
                let cached = self.cache(dataset, metadata);
                return Ok(cached.serve(Origin::Disk, Freshness::Fresh));
            }
            other => other,
        };

        match self.refresh() {
            Ok(loaded) => Ok(loaded),
            Err(err @ PipelineError::Network { .. }) => {
                let fallback = if let Some(cached) = &self.cached {
                    Some(cached.serve(Origin::Memory, Freshness::Stale))
                } else {
                    stale_disk.map(|(dataset, metadata)| LoadedDataset {
                        dataset: Arc::new(dataset),
                        metadata,
                        origin: Origin::Disk,
                        freshness: Freshness::Stale,
                    })
                };
                match fallback {
                    Some(loaded) => {
                        warn!(
                            error = %err,
                            fetched_at = %loaded.metadata.fetched_at,
                            "Refresh failed; serving stale dataset"
                        );
                        Ok(loaded)
                    }
                    None => Err(PipelineError::SnapshotAbsent {
                        reason: format!("no snapshot on disk and the fetch failed: {err}"),
                    }),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches, normalizes and persists a new snapshot regardless of age.
    pub fn refresh(&mut self) -> Result<LoadedDataset> {
        self.fetches += 1;
        let raw = self.fetcher.fetch()?;
        let normalized = normalize(&raw.table)?;
        let source = SnapshotSource {
            source: self.fetcher.source_id(),
            payload_hash: raw.payload_hash,
            report: normalized.report,
            fetched_at: self.clock.now(),
        };
        let metadata = self.store.save(&normalized.dataset, source)?;
        info!(
            rows = metadata.row_count,
            dropped = metadata.report.dropped_rows(),
            coerced = metadata.report.coerced_values,
            "Refreshed dataset from upstream"
        );

        let cached = self.cache(normalized.dataset, metadata);
        Ok(cached.serve(Origin::Network, Freshness::Fresh))
    }

    /// Metadata of the dataset held in memory, else of the persisted snapshot.
    pub fn latest_metadata(&self) -> Result<Option<SnapshotMetadata>> {
        match &self.cached {
            Some(cached) => Ok(Some(cached.metadata.clone())),
            None => self.store.latest_metadata(),
        }
    }

    /// Freshness of the data this loader could serve right now. A snapshot
    /// that cannot be loaded counts as absent.
    pub fn snapshot_state(&self, max_age: Duration) -> Result<SnapshotState> {
        let now = self.clock.now();
        let metadata = match &self.cached {
            Some(cached) => Some(cached.metadata.clone()),
            None => self.load_from_disk()?.map(|(_, metadata)| metadata),
        };
        Ok(match metadata {
            None => SnapshotState::Absent,
            Some(metadata) if metadata.is_fresh(now, max_age) => SnapshotState::Fresh,
            Some(_) => SnapshotState::Stale,
        })
    }

    fn load_from_disk(&self) -> Result<Option<(Dataset, SnapshotMetadata)>> {
        match self.store.load_latest() {
            Ok(found) => Ok(found),
            Err(PipelineError::SnapshotCorrupt { path, reason }) => {
                warn!(path = %path.display(), reason = %reason, "Ignoring corrupt snapshot");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn cache(&mut self, dataset: Dataset, metadata: SnapshotMetadata) -> &CachedDataset {
        self.cached.insert(CachedDataset {
            dataset: Arc::new(dataset),
            metadata,
        })
    }
}
