//! Concurrent ImageNet synset downloader.
//!
//! Synset listings are resolved into work items, downloaded by a fixed pool of
//! workers, validated, and recorded in a CSV ledger so later runs skip what is
//! already on disk. The `split` module prepares train/valid subsets from the
//! downloaded class directories.

pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod ledger;
pub mod progress;
pub mod split;
pub mod util;
pub mod validator;
