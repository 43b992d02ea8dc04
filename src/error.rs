use std::path::PathBuf;

use thiserror::Error;

/// Failures that end a job without producing a manifest. Everything that
/// goes wrong on a single page is recorded as an anomaly instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("source document unreadable: {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("source document has no pages: {path}")]
    EmptyDocument { path: PathBuf },

    #[error("OCR worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("job cancelled after {completed} of {total} pages")]
    Cancelled { completed: usize, total: usize },

    #[error("failed to write {file_name}: {reason}")]
    OutputFailed { file_name: String, reason: String },

    #[error("page conservation violated: {0}")]
    PageConservation(String),
}
