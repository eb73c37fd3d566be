use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::limits::DEFAULT_LOCK_TIMEOUT_MS;

pub const DATA_DIR_VAR: &str = "INNKEEP_DATA_DIR";
pub const METRICS_PORT_VAR: &str = "INNKEEP_METRICS_PORT";
pub const COMPACT_THRESHOLD_VAR: &str = "INNKEEP_COMPACT_THRESHOLD";
pub const LOCK_TIMEOUT_VAR: &str = "INNKEEP_LOCK_TIMEOUT_MS";
pub const SWEEP_INTERVAL_VAR: &str = "INNKEEP_SWEEP_INTERVAL_SECS";

/// File name of the write-ahead log inside the data directory.
pub const WAL_FILE_NAME: &str = "innkeep.wal";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid value")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub lock_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

fn parse<T: FromStr>(var: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value })
    })
    .transpose()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            data_dir: lookup(DATA_DIR_VAR).map_or(defaults.data_dir, PathBuf::from),
            metrics_port: parse(METRICS_PORT_VAR, lookup(METRICS_PORT_VAR))?,
            compact_threshold: parse(COMPACT_THRESHOLD_VAR, lookup(COMPACT_THRESHOLD_VAR))?
                .unwrap_or(defaults.compact_threshold),
            lock_timeout: parse(LOCK_TIMEOUT_VAR, lookup(LOCK_TIMEOUT_VAR))?
                .map_or(defaults.lock_timeout, Duration::from_millis),
            sweep_interval: parse(SWEEP_INTERVAL_VAR, lookup(SWEEP_INTERVAL_VAR))?
                .map_or(defaults.sweep_interval, Duration::from_secs),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}
