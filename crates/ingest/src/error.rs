use std::path::PathBuf;

use thiserror::Error;

use crate::progress::ProgressError;
use crate::store::StoreError;

/// Run-level failures. Everything narrower (one line, one file, one publish)
/// is logged and absorbed inside the pipeline instead.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("log directory not found: {0}")]
    SourceDirMissing(PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("progress record error: {0}")]
    Progress(#[from] ProgressError),

    #[error("force reprocess refused: event store does not deduplicate by fingerprint")]
    UnsafeForceReprocess,

    #[error("invalid line pattern: {0}")]
    Parser(#[from] regex::Error),
}
