use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub const DEFAULT_BASE_URL: &str = "https://ckan0.cf.opendata.inter.prod-toronto.ca";
pub const DEFAULT_PACKAGE_ID: &str = "dinesafe";

/// Runtime settings. Loaded from an optional TOML file, then overridden by
/// `DINESAFE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub base_url: String,
    pub package_id: String,
    pub snapshot_dir: PathBuf,
    pub timeout_secs: u64,
    pub max_age_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            package_id: DEFAULT_PACKAGE_ID.to_string(),
            snapshot_dir: PathBuf::from("data"),
            timeout_secs: 30,
            max_age_secs: 3600,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| PipelineError::Config(err.to_string()))
    }

    /// Reads `path` when given (a missing file is an error), applies the
    /// process environment on top, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|err| {
                    PipelineError::Config(format!("failed to read {}: {err}", path.display()))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `DINESAFE_*` overrides resolved through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DINESAFE_BASE_URL") {
            self.base_url = value;
        }
        if let Some(value) = lookup("DINESAFE_PACKAGE_ID") {
            self.package_id = value;
        }
        if let Some(value) = lookup("DINESAFE_SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("DINESAFE_TIMEOUT_SECS") {
            self.timeout_secs = parse_secs("DINESAFE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("DINESAFE_MAX_AGE_SECS") {
            self.max_age_secs = parse_secs("DINESAFE_MAX_AGE_SECS", &value)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(PipelineError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.package_id.trim().is_empty() {
            return Err(PipelineError::Config("package_id must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(PipelineError::Config("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| PipelineError::Config(format!("{key} must be a whole number of seconds: {err}")))
}
