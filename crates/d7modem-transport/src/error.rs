use std::path::PathBuf;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the link at the specified path.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested operation is not available for this kind of link.
    #[error("{operation} is not supported on {kind} links")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
