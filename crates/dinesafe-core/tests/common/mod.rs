#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use dinesafe_core::{Fetcher, PipelineError, RawFetch, Result};
use dinesafe_parser::{normalize, Dataset, RawTable};

pub fn fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../dinesafe-parser/tests/data")
        .join(name);
    std::fs::read_to_string(path).expect("read fixture")
}

pub fn sample_table() -> RawTable {
    RawTable::from_csv(&fixture("dinesafe_sample.csv")).expect("sample csv")
}

pub fn sample_dataset() -> Dataset {
    normalize(&sample_table()).expect("sample normalizes").dataset
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Succeed,
    NetworkDown,
    Garbage,
}

/// Serves the sample fixture and counts calls. Clones share state, so a
/// test can keep a handle after moving one into a loader.
#[derive(Debug, Clone)]
pub struct FakeFetcher {
    calls: Arc<AtomicUsize>,
    mode: Arc<Mutex<FetchMode>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            mode: Arc::new(Mutex::new(FetchMode::Succeed)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: FetchMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

impl Fetcher for FakeFetcher {
    fn source_id(&self) -> String {
        "fake://dinesafe".to_string()
    }

    fn fetch(&self) -> Result<RawFetch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.mode.lock().unwrap() {
            FetchMode::Succeed => Ok(RawFetch {
                table: sample_table(),
                payload_hash: blake3::hash(fixture("dinesafe_sample.csv").as_bytes())
                    .to_hex()
                    .to_string(),
            }),
            FetchMode::NetworkDown => Err(PipelineError::Network {
                url: "fake://dinesafe".to_string(),
                message: "connection refused".to_string(),
                timeout: false,
            }),
            FetchMode::Garbage => Ok(RawFetch {
                table: RawTable::from_csv("foo,bar\n1,2\n").expect("csv"),
                payload_hash: "garbage".to_string(),
            }),
        }
    }
}
