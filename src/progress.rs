//! Progress lines of the form `index/total message`.

use std::fmt;

/// Position of an item inside the whole batch.
///
/// `index` is zero-based; it is rendered one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub total: usize,
}

impl Position {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index + 1, self.total)
    }
}

pub fn format_progress(message: impl fmt::Display, position: Option<Position>) -> String {
    match position {
        Some(position) => format!("{position} {message}"),
        None => message.to_string(),
    }
}

pub fn report(message: impl fmt::Display, position: Option<Position>) {
    tracing::info!("{}", format_progress(message, position));
}

pub fn report_failure(message: impl fmt::Display, position: Option<Position>) {
    tracing::warn!("{}", format_progress(message, position));
}
