// src/repository/client.rs

//! HTTP transport for repository artifacts
//!
//! Everything the pipeline pulls off the network goes through [`Transport`],
//! so the fetch engine and orchestrator can run against [`MemoryTransport`]
//! without a server.

use crate::config::HeadersConfig;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure to retrieve a remote resource
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to read body of {url}: {source}")]
    Io { url: String, source: io::Error },
}

/// Source of remote bytes
pub trait Transport: Send + Sync {
    /// GET `url`, returning the body as a stream
    ///
    /// Anything other than a 200 response is an error.
    fn get(&self, url: &str) -> std::result::Result<Box<dyn Read + Send>, FetchError>;

    /// POST a JSON body to `url` and decode the JSON reply
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, FetchError>;

    /// GET `url` and read the whole body as text
    fn get_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        let mut body = String::new();
        self.get(url)?
            .read_to_string(&mut body)
            .map_err(|e| FetchError::Io {
                url: url.to_string(),
                source: e,
            })?;
        Ok(body)
    }
}

/// reqwest-backed transport sending the configured device headers
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new HTTP transport
    ///
    /// Must not be called from inside an async runtime; the refresh path
    /// builds it on a blocking thread.
    pub fn new(timeout: Duration, headers: &HeadersConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        let pairs = [
            (USER_AGENT, headers.user_agent.as_str()),
            (HeaderName::from_static("x-machine"), headers.machine.as_str()),
            (HeaderName::from_static("x-firmware"), headers.firmware.as_str()),
            (HeaderName::from_static("x-unique-id"), headers.unique_id.as_str()),
        ];
        for (name, value) in pairs {
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::ConfigError(format!("Invalid value for header {}: {}", name, e))
            })?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> std::result::Result<Box<dyn Read + Send>, FetchError> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(Box::new(response))
    }

    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, FetchError> {
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json().map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: format!("invalid JSON reply: {}", e),
        })
    }
}

/// In-memory transport serving canned responses
///
/// Unknown URLs answer 404. Every request is counted so callers can check
/// which candidates were probed.
#[derive(Default)]
pub struct MemoryTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    replies: Mutex<HashMap<String, serde_json::Value>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for GET `url`
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        lock(&self.bodies).insert(url.into(), body.into());
    }

    /// Answer POST `url` with `reply`
    pub fn insert_json(&self, url: impl Into<String>, reply: serde_json::Value) {
        lock(&self.replies).insert(url.into(), reply);
    }

    /// Number of requests made for `url`
    pub fn hits(&self, url: &str) -> usize {
        lock(&self.hits).get(url).copied().unwrap_or(0)
    }

    fn record(&self, url: &str) {
        *lock(&self.hits).entry(url.to_string()).or_default() += 1;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str) -> std::result::Result<Box<dyn Read + Send>, FetchError> {
        self.record(url);
        match lock(&self.bodies).get(url) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    fn post_json(
        &self,
        url: &str,
        _body: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, FetchError> {
        self.record(url);
        lock(&self.replies)
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_serves_and_counts() {
        let transport = MemoryTransport::new();
        transport.insert("https://repo.example.com/Release", "Origin: Example\n");

        let body = transport.get_text("https://repo.example.com/Release").unwrap();
        assert_eq!(body, "Origin: Example\n");
        assert_eq!(transport.hits("https://repo.example.com/Release"), 1);

        let missing = transport.get("https://repo.example.com/Packages");
        assert!(matches!(missing, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(transport.hits("https://repo.example.com/Packages"), 1);
    }

    #[test]
    fn test_memory_transport_json() {
        let transport = MemoryTransport::new();
        transport.insert_json(
            "https://pay.example.com/package/a/info",
            serde_json::json!({ "price": "$1.99" }),
        );

        let reply = transport
            .post_json("https://pay.example.com/package/a/info", &serde_json::json!({}))
            .unwrap();
        assert_eq!(reply["price"], "$1.99");
    }

    #[test]
    fn test_http_transport_rejects_bad_header() {
        let headers = HeadersConfig {
            user_agent: "bad\nvalue".to_string(),
            ..HeadersConfig::default()
        };
        let result = HttpTransport::new(HTTP_TIMEOUT, &headers);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
