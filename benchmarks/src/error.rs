use std::path::PathBuf;
use thiserror::Error;

/// Errors local to one dataset. The driver records them and moves on to the
/// next dataset, except for [`BenchmarkError::Pool`].
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("ids are not unique in input data: duplicate id {id} in {}", .path.display())]
    DuplicateQueryId { id: String, path: PathBuf },
    #[error("Malformed JSON on line {line} of {}: {source}", .path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Query result references unknown id: {0}")]
    UnknownQueryId(String),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl BenchmarkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that leave the ranker pool unable to serve further batches.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,
    #[error("Failed to construct ranking engine for worker {worker}: {reason}")]
    EngineInit { worker: usize, reason: String },
    #[error("{lost} of {total} ranking workers were lost: {reason}")]
    WorkerLost {
        lost: usize,
        total: usize,
        reason: String,
    },
    #[error("Ranker pool is degraded: {available} of {expected} workers remain")]
    Degraded { available: usize, expected: usize },
}
