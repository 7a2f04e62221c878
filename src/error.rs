use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by ingestion, sniffing, sampling and storage functions.
///
/// This is a single error enum shared across every stage of the pipeline. The orchestrator wraps it
/// in [`crate::ingestion::IngestError`] to record which stage failed.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The extension or logical file type is not one of the supported delimited-text formats.
    #[error("unsupported file type: .{ext}")]
    UnsupportedFormat { ext: String },

    /// A referenced raw file no longer exists on disk.
    #[error("file missing: {}", path.display())]
    FileMissing { path: PathBuf },

    /// Sampling failed in a way bad-line skipping could not absorb.
    #[error("load failed: {message}")]
    LoadFailed { message: String },

    /// The sample parsed to zero data rows.
    #[error("no rows parsed from {}; try a different delimiter or encoding", path.display())]
    EmptyResult { path: PathBuf },

    /// The streaming total-count pass failed.
    ///
    /// Never surfaced by [`crate::ingestion::csv::load_sample`]; it degrades to
    /// [`crate::ingestion::csv::TotalRows::Estimated`] instead.
    #[error("total row count failed: {message}")]
    TotalCountFailed { message: String },

    /// Underlying I/O error (e.g. permission denied, disk full).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Metadata (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unreadable configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// Storage layout problem that is not a plain I/O error (bad glob root, non UTF-8 path).
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl IngestionError {
    pub(crate) fn unsupported(ext: impl Into<String>) -> Self {
        Self::UnsupportedFormat { ext: ext.into() }
    }

    /// Map an I/O error on `path` to [`IngestionError::FileMissing`] when the file is gone.
    pub(crate) fn from_io_at(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileMissing { path: path.into() }
        } else {
            Self::Io(err)
        }
    }
}
