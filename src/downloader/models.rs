//! Data structures for the download pipeline
//!
//! Work items flowing through the queue, the outcome taxonomies of each stage,
//! and the per-run accounting.

use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::progress::Position;

/// One image to download, tagged with its place in the whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Canonical source URL, also the dedup key
    pub remote_url: String,
    /// File stem used when the image is saved
    pub name: String,
    pub class_label: String,
    pub collection_id: String,
    pub sequence_index: usize,
    pub total_count: usize,
}

impl WorkItem {
    pub fn dedup_key(&self) -> &str {
        &self.remote_url
    }

    pub fn position(&self) -> Position {
        Position::new(self.sequence_index, self.total_count)
    }
}

/// Message carried by the work queue.
#[derive(Debug, Clone)]
pub enum QueueMessage {
    Work(WorkItem),
    /// Tells the receiving worker to exit, one per worker
    Shutdown,
}

/// Result of a single GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { bytes: Vec<u8>, http_status: u16 },
    HttpError { status_code: u16 },
    TransportError { message: String },
}

/// Why an item was abandoned. None of these stop the run.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Image already downloaded, skipping")]
    AlreadyPresent,

    #[error("Status code is not OK for {url}, {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Error, cannot download {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{name} seems to not be a valid image file, skipping")]
    InvalidImage { name: String },

    #[error("{name} md5 {content_hash} corresponds to a bad image, skipping")]
    KnownBadImage { name: String, content_hash: String },

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub content_hash: String,
    pub size: u64,
}

#[derive(Debug)]
pub enum ItemOutcome {
    Saved(SavedImage),
    Abandoned(ItemError),
}

/// Counts of item outcomes, per worker or for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub saved: usize,
    pub already_present: usize,
    pub http_errors: usize,
    pub transport_errors: usize,
    pub invalid_images: usize,
    pub known_bad_images: usize,
    pub write_errors: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Saved(_) => self.saved += 1,
            ItemOutcome::Abandoned(err) => match err {
                ItemError::AlreadyPresent => self.already_present += 1,
                ItemError::HttpStatus { .. } => self.http_errors += 1,
                ItemError::Transport { .. } => self.transport_errors += 1,
                ItemError::InvalidImage { .. } => self.invalid_images += 1,
                ItemError::KnownBadImage { .. } => self.known_bad_images += 1,
                ItemError::Write { .. } => self.write_errors += 1,
            },
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.saved += other.saved;
        self.already_present += other.already_present;
        self.http_errors += other.http_errors;
        self.transport_errors += other.transport_errors;
        self.invalid_images += other.invalid_images;
        self.known_bad_images += other.known_bad_images;
        self.write_errors += other.write_errors;
    }

    /// Number of items that went through the download unit
    pub fn processed(&self) -> usize {
        self.saved
            + self.already_present
            + self.http_errors
            + self.transport_errors
            + self.invalid_images
            + self.known_bad_images
            + self.write_errors
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved, {} already downloaded, {} http errors, {} transport errors, {} invalid, {} bad images, {} write errors",
            self.saved,
            self.already_present,
            self.http_errors,
            self.transport_errors,
            self.invalid_images,
            self.known_bad_images,
            self.write_errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_record_and_merge() {
        let mut first = RunSummary::default();
        first.record(&ItemOutcome::Abandoned(ItemError::AlreadyPresent));
        first.record(&ItemOutcome::Abandoned(ItemError::HttpStatus {
            url: "http://x/1.jpg".to_string(),
            status: 404,
        }));

        let mut second = RunSummary::default();
        second.record(&ItemOutcome::Saved(SavedImage {
            path: PathBuf::from("goldfish/a.jpg"),
            content_hash: "abc".to_string(),
            size: 3,
        }));

        first.merge(second);
        assert_eq!(first.saved, 1);
        assert_eq!(first.already_present, 1);
        assert_eq!(first.http_errors, 1);
        assert_eq!(first.processed(), 3);
    }

    #[test]
    fn test_item_error_messages() {
        let err = ItemError::HttpStatus {
            url: "http://x/1.jpg".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "Status code is not OK for http://x/1.jpg, 404");
    }
}
