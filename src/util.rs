use reqwest::Client;

use crate::error::{Error, Result};

/// Downloads a text document, failing on any non-success status
pub async fn download_text(client: &Client, url: &str) -> Result<String> {
    tracing::debug!("Downloading {}", url);

    let resp = client.get(url).send().await?;

    if !resp.status().is_success() {
        return Err(Error::CatalogStatus {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }

    Ok(resp.text().await?)
}

/// Number of workers used when none is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Makes a name safe to use as a single path component
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("n01440764_10026"), "n01440764_10026");
        assert_eq!(sanitize_file_stem("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_file_stem(".."), "_");
        assert_eq!(sanitize_file_stem("  a\\b "), "a_b");
    }

    #[test]
    fn test_default_workers_is_positive() {
        assert!(default_workers() >= 1);
    }
}
