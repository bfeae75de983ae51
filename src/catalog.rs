//! ImageNet catalog access
//!
//! Resolves synset ids ("wnids") into image URL listings, turns the listings
//! into work items for the download pipeline, and searches the synset word
//! list when no id is given.

use std::path::Path;

use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use crate::downloader::WorkItem;
use crate::error::Result;
use crate::util::{download_text, sanitize_file_stem};
use crate::validator::content_hash;

pub const LIST_URL: &str =
    "http://www.image-net.org/api/text/imagenet.synset.geturls.getmapping?wnid={wnid}";
pub const WORDS_URL: &str = "http://image-net.org/archive/words.txt";
pub const SYNSET_URL: &str = "http://www.image-net.org/synset?wnid={wnid}";

const URL_FINGERPRINT_LEN: usize = 8;

/// One usable line of a synset listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    /// Canonical form of the URL
    pub url: String,
}

/// Synset found by a word search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynsetMatch {
    pub wnid: String,
    pub terms: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    client: Client,
    listing_url: String,
    words_url: String,
}

impl Catalog {
    pub fn new(
        client: Client,
        listing_url: impl Into<String>,
        words_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            listing_url: listing_url.into(),
            words_url: words_url.into(),
        }
    }

    pub fn listing_url_for(&self, wnid: &str) -> String {
        self.listing_url.replace("{wnid}", wnid)
    }

    /// Fetches the raw listing document of a synset.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_listing(&self, wnid: &str) -> Result<String> {
        let url = self.listing_url_for(wnid);
        info!(wnid, "Fetching image listing");
        download_text(&self.client, &url).await
    }

    /// Fetches and parses the listings of every synset, in order.
    pub async fn resolve(&self, wnids: &[String]) -> Result<Vec<(String, Vec<ListingEntry>)>> {
        let mut listings = Vec::with_capacity(wnids.len());
        for wnid in wnids {
            let text = self.fetch_listing(wnid).await?;
            let entries = parse_listing(&text);
            info!(wnid = %wnid, images = entries.len(), "Listing resolved");
            listings.push((wnid.clone(), entries));
        }
        Ok(listings)
    }

    /// Synsets whose terms contain any of the comma-separated class names.
    #[instrument(level = "debug", skip(self))]
    pub async fn search(&self, classnames: &str) -> Result<Vec<SynsetMatch>> {
        let words = download_text(&self.client, &self.words_url).await?;
        Ok(search_words(&words, classnames))
    }
}

/// Parses a listing where each line is `name url` or a bare URL.
///
/// Lines that do not fit either shape, or whose URL is not http(s), are
/// skipped.
pub fn parse_listing(text: &str) -> Vec<ListingEntry> {
    text.lines()
        .filter_map(|line| {
            let entry = parse_listing_line(line);
            if entry.is_none() && !line.trim().is_empty() {
                debug!(line, "Skipping malformed listing line");
            }
            entry
        })
        .collect()
}

fn parse_listing_line(line: &str) -> Option<ListingEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (name, raw_url) = match fields.as_slice() {
        [name, url] => (Some(*name), *url),
        [url] => (None, *url),
        _ => return None,
    };

    let url = Url::parse(raw_url).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    let name = match name {
        Some(name) => sanitize_file_stem(name),
        None => name_from_url(&url),
    };

    Some(ListingEntry {
        name,
        url: url.to_string(),
    })
}

/// File stem of the last path segment suffixed with a short URL fingerprint,
/// or the whole fingerprint when there is no stem.
///
/// Different URLs often share a stem, the suffix keeps their files apart.
fn name_from_url(url: &Url) -> String {
    let fingerprint = content_hash(url.as_str().as_bytes());
    let short = fingerprint[..URL_FINGERPRINT_LEN].to_string();

    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|segment| Path::new(segment).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("{}_{}", sanitize_file_stem(stem), short))
        .unwrap_or(fingerprint)
}

/// Flattens every listing into work items numbered across the whole batch.
pub fn build_batch(listings: &[(String, Vec<ListingEntry>)], class_label: &str) -> Vec<WorkItem> {
    let total_count = listings.iter().map(|(_, entries)| entries.len()).sum();

    listings
        .iter()
        .flat_map(|(wnid, entries)| entries.iter().map(move |entry| (wnid, entry)))
        .enumerate()
        .map(|(sequence_index, (wnid, entry))| WorkItem {
            remote_url: entry.url.clone(),
            name: entry.name.clone(),
            class_label: class_label.to_string(),
            collection_id: wnid.clone(),
            sequence_index,
            total_count,
        })
        .collect()
}

/// Matches `wnid<TAB>terms` lines against comma-separated class names.
pub fn search_words(words: &str, classnames: &str) -> Vec<SynsetMatch> {
    let needles: Vec<&str> = classnames
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();

    words
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .filter(|(_, terms)| needles.iter().any(|needle| terms.contains(needle)))
        .map(|(wnid, terms)| SynsetMatch {
            wnid: wnid.trim().to_string(),
            terms: terms.trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_malformed_line_is_skipped() {
        let entries = parse_listing("catA http://x/1.jpg\ngarbage\n");
        assert_eq!(
            entries,
            vec![ListingEntry {
                name: "catA".to_string(),
                url: "http://x/1.jpg".to_string(),
            }]
        );
    }

    #[test]
    fn test_bare_url_gets_name_from_path() {
        let url = "http://farm1.static.flickr.com/12/3456_abc.jpg";
        let entries = parse_listing(&format!("{url}\r\n"));
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].name,
            format!("3456_abc_{}", &content_hash(url.as_bytes())[..8])
        );

        let no_path = parse_listing("http://example.com/");
        assert_eq!(no_path[0].name, content_hash(b"http://example.com/"));
    }

    #[test]
    fn test_same_stem_urls_get_distinct_names() {
        let entries = parse_listing("http://a/x/photo.png\nhttp://b/y/photo.png\n");
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].name, entries[1].name);
        assert!(entries.iter().all(|e| e.name.starts_with("photo_")));
    }

    #[test]
    fn test_rejects_non_http_and_extra_fields() {
        let text = "a ftp://x/1.jpg\nb http://x/2.jpg extra\nc not-a-url\n\n";
        assert!(parse_listing(text).is_empty());
    }

    #[test]
    fn test_url_is_canonicalized() {
        let entries = parse_listing("n01_1 HTTP://Example.COM:80/a b.jpg");
        // whitespace splits the line into three fields
        assert!(entries.is_empty());

        let entries = parse_listing("n01_1 HTTP://Example.COM:80/a%20b.jpg");
        assert_eq!(entries[0].url, "http://example.com/a%20b.jpg");
    }

    #[test]
    fn test_build_batch_numbers_across_collections() {
        let listings = vec![
            ("n01".to_string(), parse_listing("a http://x/a.jpg\nb http://x/b.jpg")),
            ("n02".to_string(), parse_listing("http://y/c.png")),
        ];
        let items = build_batch(&listings, "fish");

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.total_count == 3));
        assert_eq!(
            items.iter().map(|i| i.sequence_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(items[2].collection_id, "n02");
        assert!(items[2].name.starts_with("c_"));
        assert_eq!(items[0].class_label, "fish");
    }

    #[test]
    fn test_search_words() {
        let words = "n01443537\tgoldfish, Carassius auratus\nn01440764\ttench, Tinca tinca\nn02084071\tdog, domestic dog\n";

        let found = search_words(words, "goldfish,dog");
        assert_eq!(
            found.iter().map(|m| m.wnid.as_str()).collect::<Vec<_>>(),
            vec!["n01443537", "n02084071"]
        );
        assert!(search_words(words, "cat").is_empty());
        assert!(search_words(words, "").is_empty());
    }

    #[tokio::test]
    async fn test_resolve_fetches_each_listing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geturls"))
            .and(query_param("wnid", "n0001"))
            .respond_with(ResponseTemplate::new(200).set_body_string("catA http://x/1.jpg\ngarbage\n"))
            .mount(&mock_server)
            .await;

        let catalog = Catalog::new(
            Client::new(),
            format!("{}/geturls?wnid={{wnid}}", mock_server.uri()),
            format!("{}/words.txt", mock_server.uri()),
        );
        let listings = catalog.resolve(&["n0001".to_string()]).await.unwrap();
        let items = build_batch(&listings, "cats");

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].remote_url, "http://x/1.jpg");
        assert_eq!(items[0].collection_id, "n0001");
        assert_eq!(items[0].total_count, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let catalog = Catalog::new(
            Client::new(),
            format!("{}/geturls?wnid={{wnid}}", mock_server.uri()),
            format!("{}/words.txt", mock_server.uri()),
        );
        let err = catalog.fetch_listing("n0001").await.unwrap_err();

        assert!(matches!(
            err,
            crate::error::Error::CatalogStatus { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_search_fetches_words() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/words.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("n01443537\tgoldfish, Carassius auratus\n"),
            )
            .mount(&mock_server)
            .await;

        let catalog = Catalog::new(
            Client::new(),
            format!("{}/geturls?wnid={{wnid}}", mock_server.uri()),
            format!("{}/words.txt", mock_server.uri()),
        );
        let found = catalog.search("goldfish").await.unwrap();

        assert_eq!(
            found,
            vec![SynsetMatch {
                wnid: "n01443537".to_string(),
                terms: "goldfish, Carassius auratus".to_string(),
            }]
        );
    }
}
