//! Node Transport — the network calls made to remote proxy nodes.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::config::NodeTarget;
use crate::error::TransportError;

/// Raw fetches against a single node. Implementations do no decoding.
pub trait NodeTransport: Send + Sync + 'static {
    fn fetch_stats(
        &self,
        node_id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    fn fetch_health(
        &self,
        node_id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    fn fetch_metrics(
        &self,
        node_id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

struct Endpoint {
    base_url: String,
    token: Option<String>,
}

/// HTTP transport: `GET {url}/node/{stats,health,metrics}` per node.
pub struct HttpNodeTransport {
    http: Client,
    endpoints: HashMap<String, Endpoint>,
}

impl HttpNodeTransport {
    pub fn new(targets: &[NodeTarget]) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("building node HTTP client")?;

        let endpoints = targets
            .iter()
            .map(|t| {
                (
                    t.id.clone(),
                    Endpoint {
                        base_url: t.url.trim_end_matches('/').to_string(),
                        token: t.token.clone(),
                    },
                )
            })
            .collect();

        Ok(Self { http, endpoints })
    }

    async fn get(
        &self,
        node_id: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let endpoint = self
            .endpoints
            .get(node_id)
            .ok_or_else(|| TransportError::UnknownNode(node_id.to_string()))?;

        let url = format!("{}{}", endpoint.base_url, path);
        let mut req = self.http.get(&url).timeout(timeout);
        if let Some(token) = &endpoint.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        debug!(node = node_id, url = %url, bytes = body.len(), "node fetch completed");
        Ok(body.to_vec())
    }
}

impl NodeTransport for HttpNodeTransport {
    async fn fetch_stats(&self, node_id: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.get(node_id, "/node/stats", timeout).await
    }

    async fn fetch_health(&self, node_id: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.get(node_id, "/node/health", timeout).await
    }

    async fn fetch_metrics(&self, node_id: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.get(node_id, "/node/metrics", timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_node_is_rejected_without_network() {
        let transport = HttpNodeTransport::new(&[]).unwrap();
        let err = transport
            .fetch_stats("ghost", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::UnknownNode("ghost".into()));
    }
}
