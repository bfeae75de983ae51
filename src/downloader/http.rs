//! HTTP retrieval of a single image
//!
//! One GET per call, no retry. Transport outcomes are folded into
//! [`FetchOutcome`] so callers never handle `reqwest` errors directly.

use std::{error::Error as _, time::Duration};

use reqwest::{
    Client, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use tracing::{instrument, trace};

use super::models::FetchOutcome;
use crate::error::Result;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        Self::with_max_redirects(10)
    }

    pub fn with_max_redirects(max_redirects: usize) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    #[instrument(name = "fetch", level = "debug", skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, timeout: Duration) -> FetchOutcome {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => return transport_error(&e, timeout),
        };

        let status = response.status();
        trace!(status = %status, "Got response");
        if status != StatusCode::OK {
            return FetchOutcome::HttpError {
                status_code: status.as_u16(),
            };
        }

        match response.bytes().await {
            Ok(bytes) => FetchOutcome::Success {
                bytes: bytes.to_vec(),
                http_status: status.as_u16(),
            },
            Err(e) => transport_error(&e, timeout),
        }
    }
}

fn transport_error(err: &reqwest::Error, timeout: Duration) -> FetchOutcome {
    let message = if err.is_timeout() {
        format!("timed out after {}s", timeout.as_secs_f32())
    } else {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    };
    FetchOutcome::TransportError { message }
}
