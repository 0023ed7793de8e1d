//! Blocking HTTP access to the record service
//!
//! All calls here block, so they only ever run on worker threads. Downloads
//! are read in chunks; the cancel token is checked between chunks and every
//! chunk produces a progress callback.

use std::io::Read;
use std::time::Duration;

use bevy::log::debug;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use url::Url;

use super::attachment::Attachment;
use super::workers::CancelToken;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL '{href}': {source}")]
    InvalidUrl {
        href: String,
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("HTTP error {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("failed reading response from {url}: {source}")]
    Body {
        url: String,
        source: std::io::Error,
    },
    #[error("failed to decode JSON from {url}: {source}")]
    Json {
        url: String,
        source: serde_json::Error,
    },
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
}

/// Client for the record service rooted at a base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        // Validate once so later joins only fail on bad hrefs
        Url::parse(base_url).map_err(|source| FetchError::InvalidUrl {
            href: base_url.to_string(),
            source,
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an href from the record service. Absolute URLs are kept,
    /// anything else is appended to the base URL.
    pub fn resolve(&self, href: &str) -> Result<Url, FetchError> {
        if let Ok(url) = Url::parse(href) {
            return Ok(url);
        }
        let joined = if href.starts_with('/') {
            format!("{}{}", self.base_url, href)
        } else {
            format!("{}/{}", self.base_url, href)
        };
        Url::parse(&joined).map_err(|source| FetchError::InvalidUrl {
            href: href.to_string(),
            source,
        })
    }

    /// Download a body, reporting `(bytes_so_far, content_length)` per chunk
    pub fn get_bytes<F>(
        &self,
        url: &Url,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<Vec<u8>, FetchError>
    where
        F: FnMut(u64, Option<u64>),
    {
        let url_string = url.to_string();
        debug!("GET {}", url_string);

        let mut response =
            self.client
                .get(url.clone())
                .send()
                .map_err(|source| FetchError::Request {
                    url: url_string.clone(),
                    source,
                })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::Status {
                url: url_string,
                status: status.as_u16(),
                body,
            });
        }

        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(256 * 1024 * 1024) as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { url: url_string });
            }
            let read = response
                .read(&mut chunk)
                .map_err(|source| FetchError::Body {
                    url: url_string.clone(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
            on_progress(body.len() as u64, total);
        }

        Ok(body)
    }

    /// GET an href and decode the JSON body
    pub fn get_json<T: DeserializeOwned>(
        &self,
        href: &str,
        cancel: &CancelToken,
    ) -> Result<T, FetchError> {
        let url = self.resolve(href)?;
        let bytes = self.get_bytes(&url, cancel, |_, _| {})?;
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Json {
            url: url.to_string(),
            source,
        })
    }

    /// `GET /attachments/?owner_id={owner_id}`
    pub fn list_attachments(
        &self,
        owner_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<Attachment>, FetchError> {
        let mut url = self.resolve("/attachments/")?;
        url.query_pairs_mut().append_pair("owner_id", owner_id);
        self.get_json(url.as_str(), cancel)
    }

    /// `GET /patients/{id}`, kept opaque
    pub fn patient(&self, id: &str, cancel: &CancelToken) -> Result<serde_json::Value, FetchError> {
        self.get_json(&format!("/patients/{id}"), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_resolve_relative_href() {
        let api = client("http://localhost:8000/");
        assert_eq!(
            api.resolve("/attachments/3/data").unwrap().as_str(),
            "http://localhost:8000/attachments/3/data"
        );
        assert_eq!(
            api.resolve("attachments/3/data").unwrap().as_str(),
            "http://localhost:8000/attachments/3/data"
        );
    }

    #[test]
    fn test_resolve_keeps_base_path() {
        let api = client("https://records.example.org/api/v1");
        assert_eq!(
            api.resolve("/patients/12").unwrap().as_str(),
            "https://records.example.org/api/v1/patients/12"
        );
    }

    #[test]
    fn test_resolve_absolute_href() {
        let api = client("http://localhost:8000");
        assert_eq!(
            api.resolve("https://cdn.example.org/model.glb").unwrap().as_str(),
            "https://cdn.example.org/model.glb"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", Duration::from_secs(1)),
            Err(FetchError::InvalidUrl { .. })
        ));
    }
}
