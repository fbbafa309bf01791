//! Error types for the harness side of the system.
//!
//! The decision engine itself only fails at construction
//! ([`havfs_core::ConfigError`]); everything here belongs to I/O around it.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a harness operation (run, replay, evaluate, load config).
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid scheduler configuration: {0}")]
    Config(#[from] havfs_core::ConfigError),

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("missing column `{column}` in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{0}")]
    Usage(String),

    #[error("failed to bind metrics exporter on {addr}: {source}")]
    ExporterBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single reporter sink. Never propagated into the engine.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error in reporter `{reporter}`: {source}")]
    Io {
        reporter: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error in reporter `{reporter}`: {message}")]
    Serialize {
        reporter: &'static str,
        message: String,
    },
}

impl ReportError {
    pub(crate) fn io(reporter: &'static str, source: std::io::Error) -> Self {
        Self::Io { reporter, source }
    }
}
