//! Error types for the analyzer and the capture side

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Faults that stop an aggregation run before it starts.
///
/// Anything local to one partition or one line is reported through the
/// report's warnings and skip counters instead.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("log root {path} does not exist")]
    LogRootMissing { path: PathBuf },

    #[error("log root {path} is not a directory")]
    LogRootNotDirectory { path: PathBuf },

    #[error("log root {path} is not accessible: {source}")]
    LogRootInaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Faults while persisting a captured request.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to create partition directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode request record: {0}")]
    Encode(#[from] serde_json::Error),
}
