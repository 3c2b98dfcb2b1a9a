//! Compute-resource existence checks.
//!
//! A cluster member is backed by a compute resource (a pod) whose name is the
//! member name. The reconciler asks which resources are still alive within a
//! namespace and label scope; members without one are stale.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Mount point of the pod's service account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Credentials unavailable: {0}")]
    Credentials(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ResourceError>;

/// Lists the names of live compute resources.
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// Names of resources in `namespace` matching the label `selector`.
    async fn live_names(&self, namespace: &str, selector: &str) -> Result<HashSet<String>>;
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

/// Pod lister backed by the Kubernetes API server.
#[derive(Debug, Clone)]
pub struct KubernetesPods {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl KubernetesPods {
    /// Create a lister for an explicit API server URL and bearer token.
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResourceError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Create a lister from the in-cluster environment and service account.
    pub fn in_cluster<F>(lookup: F, timeout: Duration) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("KUBERNETES_SERVICE_HOST").ok_or_else(|| {
            ResourceError::Credentials("KUBERNETES_SERVICE_HOST not set".to_string())
        })?;
        let port = lookup("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".to_string());
        // IPv6 service addresses need brackets in a URL
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = std::fs::read_to_string(dir.join("token"))
            .map_err(|e| ResourceError::Credentials(format!("service account token: {}", e)))?;
        let ca = std::fs::read(dir.join("ca.crt"))
            .map_err(|e| ResourceError::Credentials(format!("service account CA: {}", e)))?;
        let ca = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| ResourceError::Credentials(format!("service account CA: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .add_root_certificate(ca)
            .build()
            .map_err(|e| ResourceError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_url: format!("https://{}:{}", host, port),
            token: Some(token.trim().to_string()),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl ResourceLister for KubernetesPods {
    async fn live_names(&self, namespace: &str, selector: &str) -> Result<HashSet<String>> {
        let url = format!("{}/api/v1/namespaces/{}/pods", self.api_url, namespace);
        let mut request = self.client.get(url).query(&[("labelSelector", selector)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResourceError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResourceError::Request(format!(
                "{} listing pods in {}: {}",
                status,
                namespace,
                body.trim()
            )));
        }

        let pods: PodList = response
            .json()
            .await
            .map_err(|e| ResourceError::Malformed(e.to_string()))?;
        Ok(pods.items.into_iter().map(|p| p.metadata.name).collect())
    }
}

/// Fixed set of live resources for testing. Records every query.
pub struct StaticResources {
    names: HashSet<String>,
    queries: Mutex<Vec<(String, String)>>,
    unavailable: bool,
}

impl StaticResources {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            queries: Mutex::new(Vec::new()),
            unavailable: false,
        }
    }

    /// A lister whose every query fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    /// `(namespace, selector)` pairs queried so far.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceLister for StaticResources {
    async fn live_names(&self, namespace: &str, selector: &str) -> Result<HashSet<String>> {
        self.queries
            .lock()
            .unwrap()
            .push((namespace.to_string(), selector.to_string()));
        if self.unavailable {
            return Err(ResourceError::Request("api server unreachable".to_string()));
        }
        Ok(self.names.clone())
    }
}
