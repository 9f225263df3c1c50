use std::path::PathBuf;

use handsign_core::CoreError;
use handsign_store::StoreError;
use thiserror::Error;

/// Per-image failures. The aggregator catches these and counts the sample as skipped.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Corpus-level failures. These abort aggregation before anything is written.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("data directory not found: {0}")]
    RootMissing(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("cannot list {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no samples extracted from {0}; check the dataset path and images")]
    EmptyCorpus(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("feature table is empty")]
    EmptyTable,

    #[error("unsupported artifact format version {0}")]
    UnsupportedFormat(u32),

    #[error("artifact is inconsistent: {0}")]
    InconsistentArtifact(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
