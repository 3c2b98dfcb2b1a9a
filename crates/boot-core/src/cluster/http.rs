//! Cluster admin client for the etcd v2 members API.

use super::{AdminError, ClusterAdmin, Member, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Debug, Serialize)]
struct AddMemberRequest<'a> {
    #[serde(rename = "peerURLs")]
    peer_urls: &'a [String],
}

#[derive(Debug, Clone)]
pub struct HttpClusterAdmin {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClusterAdmin {
    /// Create a client for a member's client URL (e.g. `http://10.0.0.7:2379`).
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

    fn members_url(&self) -> String {
        format!("{}/v2/members", self.base_url)
    }

    async fn check(what: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body = body.trim().to_string();
        Err(match status {
            StatusCode::NOT_FOUND => AdminError::NotFound(what.to_string()),
            StatusCode::CONFLICT => AdminError::Conflict(format!("{}: {}", what, body)),
            _ => AdminError::Request(format!("{} on {}: {}", status, what, body)),
        })
    }
}

fn request_error(e: reqwest::Error) -> AdminError {
    AdminError::Request(e.to_string())
}

#[async_trait]
impl ClusterAdmin for HttpClusterAdmin {
    async fn list_members(&self) -> Result<Vec<Member>> {
        let response = self
            .client
            .get(self.members_url())
            .send()
            .await
            .map_err(request_error)?;
        let response = Self::check("member list", response).await?;
        let body: MembersResponse = response
            .json()
            .await
            .map_err(|e| AdminError::Malformed(e.to_string()))?;
        Ok(body.members)
    }

    async fn add_member(&self, peer_urls: &[String]) -> Result<Member> {
        let response = self
            .client
            .post(self.members_url())
            .json(&AddMemberRequest { peer_urls })
            .send()
            .await
            .map_err(request_error)?;
        let response = Self::check(&peer_urls.join(","), response).await?;
        response
            .json()
            .await
            .map_err(|e| AdminError::Malformed(e.to_string()))
    }

    async fn remove_member(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.members_url(), id))
            .send()
            .await
            .map_err(request_error)?;
        Self::check(id, response).await?;
        Ok(())
    }
}
