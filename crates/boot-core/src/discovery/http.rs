//! Discovery client for the etcd v2 keys API.

use super::{DiscoveryError, DiscoveryStore, Node, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// v2 error code for a missing key.
const ERROR_KEY_NOT_FOUND: u32 = 100;
/// v2 error code for a create on an existing key.
const ERROR_NODE_EXIST: u32 = 105;

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct KeysErrorBody {
    #[serde(rename = "errorCode")]
    error_code: u32,
    #[serde(default)]
    message: String,
}

/// Discovery store reached over HTTP.
///
/// Every request is bounded by the timeout given at construction, so a hung
/// endpoint delays a caller by at most that long.
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDiscovery {
    /// Create a client for `base_url` (e.g. `http://10.0.0.5:2381`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(request_error)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/v2/keys/{}", self.base_url, key.trim_start_matches('/'))
    }

    /// Turn a non-success response into the matching error.
    async fn check(key: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<KeysErrorBody>(&body) {
            Ok(e) if e.error_code == ERROR_KEY_NOT_FOUND => DiscoveryError::NotFound(key.to_string()),
            Ok(e) if e.error_code == ERROR_NODE_EXIST => {
                DiscoveryError::AlreadyExists(key.to_string())
            }
            Ok(e) => DiscoveryError::Request(format!(
                "{} on {} (code {}): {}",
                status, key, e.error_code, e.message
            )),
            Err(_) if status == StatusCode::NOT_FOUND => DiscoveryError::NotFound(key.to_string()),
            Err(_) => DiscoveryError::Request(format!("{} on {}: {}", status, key, body.trim())),
        };
        Err(err)
    }

    async fn put_form(&self, key: &str, form: &[(&str, String)]) -> Result<()> {
        let response = self
            .client
            .put(self.key_url(key))
            .form(form)
            .send()
            .await
            .map_err(request_error)?;
        Self::check(key, response).await?;
        Ok(())
    }
}

fn request_error(e: reqwest::Error) -> DiscoveryError {
    DiscoveryError::Request(e.to_string())
}

#[async_trait]
impl DiscoveryStore for HttpDiscovery {
    async fn get(&self, key: &str, recursive: bool) -> Result<Node> {
        let mut request = self.client.get(self.key_url(key));
        if recursive {
            request = request.query(&[("recursive", "true")]);
        }

        let response = request.send().await.map_err(request_error)?;
        let response = Self::check(key, response).await?;
        let body: KeysResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Malformed(format!("{}: {}", key, e)))?;

        debug!("Fetched {} ({} children)", key, body.node.nodes.len());
        Ok(body.node)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut form = vec![("value", value.to_string())];
        if let Some(ttl) = ttl {
            form.push(("ttl", ttl.as_secs().to_string()));
        }
        self.put_form(key, &form).await
    }

    async fn create(&self, key: &str, value: &str) -> Result<()> {
        let form = [("value", value.to_string()), ("prevExist", "false".to_string())];
        self.put_form(key, &form).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.key_url(key))
            .send()
            .await
            .map_err(request_error)?;
        Self::check(key, response).await?;
        Ok(())
    }
}
