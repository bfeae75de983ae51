//! Concurrent image download pipeline
//!
//! This module provides the HTTP fetcher, the per-item download unit and the
//! worker pool that drives them from a bounded queue.

mod http;
mod models;
mod queue;
mod unit;

// Re-export the public API
pub use http::Fetcher;
pub use models::{
    FetchOutcome, ItemError, ItemOutcome, QueueMessage, RunSummary, SavedImage, WorkItem,
};
pub use queue::{DrainTracker, Pipeline};
pub use unit::{DownloadUnit, prepare_destination};
