//! Error taxonomy shared by the sampler, store, dispatcher and config loader.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain a usable snapshot from apcupsd. Always transient.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("apcupsd unreachable at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("apcupsd did not answer within {0:.1}s")]
    Timeout(f64),

    #[error("malformed apcupsd response: {0}")]
    Malformed(String),

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("field {field} has unparseable value '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Telemetry store failure. Transient unless [`StoreError::is_unrecoverable`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open telemetry database {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot create telemetry database directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("telemetry database is gone: {0}")]
    StorageLost(String),

    #[error("telemetry write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("telemetry query failed: {0}")]
    Query(#[source] rusqlite::Error),

    #[error("stored timestamp '{0}' is not a valid datetime")]
    Timestamp(String),
}

impl StoreError {
    /// True when the storage medium itself is unusable and the loop must stop.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, StoreError::Open { .. } | StoreError::Directory { .. } | StoreError::StorageLost(_))
    }
}

/// Per-device remote shutdown failure. Never aborts the fan-out.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("authentication failed for {host}: {detail}")]
    Auth { host: String, detail: String },

    #[error("connection to {host} failed: {detail}")]
    Connection { host: String, detail: String },
}

/// Missing or invalid configuration. Fatal before the monitor starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("cannot read configuration {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
