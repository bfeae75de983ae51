//! Processing of a single work item
//!
//! Checks the ledger, fetches, validates, writes the file and records it. Every
//! failure is reported with the item's batch position and ends processing of
//! that item only.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bytesize::ByteSize;
use tracing::instrument;

use super::http::Fetcher;
use super::models::{FetchOutcome, ItemError, ItemOutcome, SavedImage, WorkItem};
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerEntry};
use crate::progress::{report, report_failure};
use crate::validator::{ValidationOutcome, Validator};

/// Creates the destination root. Runs before any worker starts, a failure
/// aborts the whole download.
pub async fn prepare_destination(dest_root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest_root)
        .await
        .map_err(|source| Error::DestinationRoot {
            path: dest_root.to_path_buf(),
            source,
        })
}

#[derive(Debug)]
pub struct DownloadUnit {
    ledger: Arc<Ledger>,
    fetcher: Fetcher,
    validator: Validator,
    dest_root: PathBuf,
    timeout: Duration,
}

impl DownloadUnit {
    pub fn new(
        ledger: Arc<Ledger>,
        fetcher: Fetcher,
        validator: Validator,
        dest_root: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            validator,
            dest_root: dest_root.into(),
            timeout,
        }
    }

    /// Directory receiving every image of a class.
    pub fn class_dir(&self, class_label: &str) -> PathBuf {
        self.dest_root.join(class_label)
    }

    #[instrument(
        name = "download_item",
        level = "debug",
        skip(self, item),
        fields(index = item.sequence_index, url = %item.remote_url)
    )]
    pub async fn process(&self, item: &WorkItem) -> ItemOutcome {
        let position = Some(item.position());

        match self.try_process(item).await {
            Ok(saved) => {
                report(
                    format!("{} file saved ({})", item.name, ByteSize::b(saved.size)),
                    position,
                );
                ItemOutcome::Saved(saved)
            }
            Err(err @ ItemError::AlreadyPresent) => {
                report(&err, position);
                ItemOutcome::Abandoned(err)
            }
            Err(err) => {
                report_failure(&err, position);
                ItemOutcome::Abandoned(err)
            }
        }
    }

    async fn try_process(&self, item: &WorkItem) -> std::result::Result<SavedImage, ItemError> {
        if self.ledger.exists(item.dedup_key()).await {
            return Err(ItemError::AlreadyPresent);
        }

        let bytes = match self.fetcher.fetch(&item.remote_url, self.timeout).await {
            FetchOutcome::Success { bytes, .. } => bytes,
            FetchOutcome::HttpError { status_code } => {
                return Err(ItemError::HttpStatus {
                    url: item.remote_url.clone(),
                    status: status_code,
                });
            }
            FetchOutcome::TransportError { message } => {
                return Err(ItemError::Transport {
                    url: item.remote_url.clone(),
                    message,
                });
            }
        };

        let (extension, content_hash) = match self.validator.classify(&bytes) {
            ValidationOutcome::Valid {
                format_extension,
                content_hash,
            } => (format_extension, content_hash),
            ValidationOutcome::NotAnImage => {
                return Err(ItemError::InvalidImage {
                    name: item.name.clone(),
                });
            }
            ValidationOutcome::KnownBad { content_hash } => {
                return Err(ItemError::KnownBadImage {
                    name: item.name.clone(),
                    content_hash,
                });
            }
        };

        // create_dir_all succeeds when another worker created it first
        let class_dir = self.class_dir(&item.class_label);
        tokio::fs::create_dir_all(&class_dir)
            .await
            .map_err(|source| ItemError::Write {
                path: class_dir.clone(),
                source,
            })?;

        let path = class_dir.join(format!("{}.{}", item.name, extension));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| ItemError::Write {
                path: path.clone(),
                source,
            })?;

        self.ledger
            .append(&LedgerEntry {
                key: item.dedup_key().to_string(),
                content_hash: content_hash.clone(),
                class_label: item.class_label.clone(),
                collection_id: item.collection_id.clone(),
            })
            .await;

        Ok(SavedImage {
            path,
            content_hash,
            size: bytes.len() as u64,
        })
    }
}
