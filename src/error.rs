//! Error types shared across the downloader and the splitter.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole command, or that are logged and swallowed at a
/// component boundary (ledger I/O).
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Catalog returned status {status} for {url}")]
    CatalogStatus { url: String, status: u16 },

    #[error("Cannot create destination root {}: {source}", path.display())]
    DestinationRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Ledger IO error on {}: {source}", path.display())]
    LedgerIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Validation fraction must be between 0 and 1, got {0}")]
    InvalidFraction(f64),

    #[error("Worker task failed: {0}")]
    WorkerError(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panicked_task_is_worker_error() {
        let err = tokio::task::spawn_blocking(|| -> Vec<String> { panic!("boom") })
            .await
            .map_err(Error::from)
            .unwrap_err();

        assert!(matches!(err, Error::WorkerError(ref e) if e.is_panic()));
        assert!(err.to_string().starts_with("Worker task failed"));
    }
}
