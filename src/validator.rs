//! Image validation and content fingerprinting
//!
//! Downloaded bytes are sniffed for an image signature and fingerprinted with
//! MD5. Some hosts answer dead links with a placeholder image instead of an
//! error status, so a fixed deny-list of fingerprints is rejected even when the
//! bytes are a perfectly valid image.

use std::collections::HashSet;

/// Fingerprints of images that must never be accepted.
pub const BAD_IMAGE_HASHES: &[&str] = &[
    // flickr "photo unavailable"
    "880a7a58e05d3e83797f27573bb6d35c",
    // warning sign
    "596246739a83bb45e30e13437e0810d9",
    // forbidden sign
    "969e595182a947c7fdaaef4a34401760",
    // hugedomain logo
    "af5db09e39ca35d8930b4e59962e09e5",
];

/// Result of classifying a downloaded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid {
        format_extension: String,
        content_hash: String,
    },
    NotAnImage,
    KnownBad {
        content_hash: String,
    },
}

/// Lowercase hex MD5 of the full content.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// File extension of the image format found in `bytes`, if any.
pub fn image_extension(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.extension())
}

#[derive(Debug, Clone)]
pub struct Validator {
    deny_list: HashSet<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            deny_list: BAD_IMAGE_HASHES.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Adds fingerprints on top of the shipped deny-list.
    pub fn with_denied_hashes<I, S>(mut self, hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_list
            .extend(hashes.into_iter().map(|h| h.into().to_lowercase()));
        self
    }

    pub fn is_denied(&self, content_hash: &str) -> bool {
        self.deny_list.contains(content_hash)
    }

    #[tracing::instrument(level = "trace", skip_all, fields(len = bytes.len()))]
    pub fn classify(&self, bytes: &[u8]) -> ValidationOutcome {
        let content_hash = content_hash(bytes);

        if self.is_denied(&content_hash) {
            tracing::debug!(hash = %content_hash, "Content matches the deny-list");
            return ValidationOutcome::KnownBad { content_hash };
        }

        match image_extension(bytes) {
            Some(ext) => ValidationOutcome::Valid {
                format_extension: ext.to_string(),
                content_hash,
            },
            None => ValidationOutcome::NotAnImage,
        }
    }
}
