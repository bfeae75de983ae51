//! Durable record of downloaded images
//!
//! The ledger is a plain CSV file: one header line, then one row per accepted
//! image. Rows are only ever appended. Every read and every append goes through
//! the same async mutex, so rows written by concurrent workers never interleave.
//!
//! Membership checks and appends are separate critical sections. A worker that
//! sees a key as missing does not keep the lock while it downloads, so two
//! workers handling the same key at the same time can both append a row.

use std::path::{Path, PathBuf};

use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, error, instrument, warn};

use crate::error::{Error, Result};

pub const LEDGER_HEADER: &str = "URL,MD5,Classname,Imagenet ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Dedup key, the canonical source URL
    pub key: String,
    pub content_hash: String,
    pub class_label: String,
    pub collection_id: String,
}

impl LedgerEntry {
    pub fn to_row(&self) -> String {
        [
            &self.key,
            &self.content_hash,
            &self.class_label,
            &self.collection_id,
        ]
        .iter()
        .map(|field| quote_field(field))
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// Quotes a field when it contains a separator, a quote or a line break.
pub fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits one CSV line into its fields, undoing [`quote_field`].
pub fn parse_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a row with this exact key has been recorded.
    ///
    /// A missing ledger file means nothing was downloaded yet. Other read
    /// failures are logged and treated the same way.
    #[instrument(level = "debug", skip(self), fields(ledger = ?self.path))]
    pub async fn exists(&self, key: &str) -> bool {
        let _guard = self.lock.lock().await;

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Ledger does not exist yet");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read ledger, assuming key is absent");
                return false;
            }
        };

        content
            .lines()
            .skip(1)
            .filter(|line| !line.is_empty())
            .any(|line| parse_row(line).first().is_some_and(|first| first == key))
    }

    /// Appends one row, writing the header first if the file is new.
    ///
    /// Failures are logged and swallowed, the caller keeps going without the
    /// row recorded.
    #[instrument(level = "debug", skip(self, entry), fields(ledger = ?self.path, key = %entry.key))]
    pub async fn append(&self, entry: &LedgerEntry) {
        let _guard = self.lock.lock().await;

        if let Err(e) = self.write_row(entry).await {
            error!(error = %e, "Failed to record ledger entry");
        }
    }

    async fn write_row(&self, entry: &LedgerEntry) -> Result<()> {
        let ledger_io = |source: std::io::Error| Error::LedgerIo {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(ledger_io)?;

        let is_empty = file.metadata().await.map_err(ledger_io)?.len() == 0;

        let mut buffer = String::new();
        if is_empty {
            debug!("Writing ledger header");
            buffer.push_str(LEDGER_HEADER);
            buffer.push('\n');
        }
        buffer.push_str(&entry.to_row());
        buffer.push('\n');

        file.write_all(buffer.as_bytes()).await.map_err(ledger_io)?;
        file.flush().await.map_err(ledger_io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(key: &str) -> LedgerEntry {
        LedgerEntry {
            key: key.to_string(),
            content_hash: "900150983cd24fb0d6963f7d28e17f72".to_string(),
            class_label: "goldfish".to_string(),
            collection_id: "n01443537".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_ledger_has_no_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("data.csv"));

        assert!(!ledger.exists("http://x/1.jpg").await);
        assert!(!ledger.path().exists(), "exists() must not create the file");
    }

    #[tokio::test]
    async fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("data.csv"));

        ledger.append(&entry("http://x/1.jpg")).await;
        ledger.append(&entry("http://x/2.jpg")).await;

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LEDGER_HEADER);
        assert_eq!(
            lines[1],
            "http://x/1.jpg,900150983cd24fb0d6963f7d28e17f72,goldfish,n01443537"
        );
    }

    #[tokio::test]
    async fn test_exists_matches_whole_key() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("data.csv"));

        ledger.append(&entry("http://x/10.jpg")).await;

        assert!(ledger.exists("http://x/10.jpg").await);
        // a prefix of a recorded key is a different image
        assert!(!ledger.exists("http://x/1").await);
        // the header is not a key
        assert!(!ledger.exists("URL").await);
    }

    #[tokio::test]
    async fn test_fields_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("data.csv"));

        let mut tricky = entry("http://x/a,b.jpg");
        tricky.class_label = "tench, Tinca tinca".to_string();
        ledger.append(&tricky).await;

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "\"http://x/a,b.jpg\",900150983cd24fb0d6963f7d28e17f72,\"tench, Tinca tinca\",n01443537"
        );
        assert_eq!(parse_row(row)[2], "tench, Tinca tinca");
        assert!(ledger.exists("http://x/a,b.jpg").await);
    }

    #[test]
    fn test_parse_row_unescapes_quotes() {
        let fields = parse_row(&quote_field("say \"cheese\""));
        assert_eq!(fields, vec!["say \"cheese\"".to_string()]);
        assert_eq!(parse_row("a,,c"), vec!["a", "", "c"]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::new(dir.path().join("data.csv")));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger.append(&entry(&format!("http://x/{i}.jpg"))).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 33);
        assert_eq!(lines.iter().filter(|l| **l == LEDGER_HEADER).count(), 1);
        for i in 0..32 {
            assert!(ledger.exists(&format!("http://x/{i}.jpg")).await);
        }
    }

    #[tokio::test]
    async fn test_append_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("missing").join("data.csv"));

        ledger.append(&entry("http://x/1.jpg")).await;

        assert!(!ledger.exists("http://x/1.jpg").await);
    }
}
