use std::path::PathBuf;

/// Errors raised while loading, saving, or editing a notebook document.
#[derive(Debug, thiserror::Error)]
pub enum NotebookError {
    #[error("Malformed notebook: {0}")]
    MalformedDocument(String),

    #[error("Failed to read {}: {source}", .path.display())]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write notebook to {target}: {reason}")]
    UnwritableTarget { target: String, reason: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Cell index {index} out of range (notebook has {len} cells)")]
    CellIndexOutOfRange { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, NotebookError>;
