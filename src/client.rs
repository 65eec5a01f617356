//! Typed HTTP client for the realityctl daemon REST API.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use uuid::Uuid;

use crate::domain::types::{
    BandwidthQuery, BandwidthStats, Envelope, FleetStats, HealthReport, PerNodeMetrics,
    PerNodeStatistics, X25519Keypairs,
};

pub struct RealityClient {
    base_url: String,
    http: Client,
}

impl RealityClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Client for a daemon listening on `addr` (host:port or a full URL).
    pub fn for_addr(addr: &str) -> Result<Self> {
        if addr.starts_with("http://") || addr.starts_with("https://") {
            Self::new(addr)
        } else {
            Self::new(&format!("http://{}", addr))
        }
    }

    pub async fn stats(&self) -> Result<FleetStats> {
        self.get("/api/system/stats").await
    }

    pub async fn bandwidth(&self, query: &BandwidthQuery) -> Result<BandwidthStats> {
        self.get_with_query("/api/system/stats/bandwidth", Some(query)).await
    }

    pub async fn nodes(&self) -> Result<Vec<PerNodeStatistics>> {
        self.get("/api/system/stats/nodes").await
    }

    pub async fn health(&self) -> Result<HealthReport> {
        self.get("/api/system/health").await
    }

    pub async fn metrics(&self) -> Result<Vec<PerNodeMetrics>> {
        self.get("/api/system/nodes/metrics").await
    }

    pub async fn keypairs(&self) -> Result<X25519Keypairs> {
        self.get("/api/system/tools/x25519/generate").await
    }

    pub async fn hosts(&self) -> Result<serde_json::Value> {
        self.get("/api/hosts").await
    }

    pub async fn host(&self, id: Uuid) -> Result<serde_json::Value> {
        self.get(&format!("/api/hosts/{}", id)).await
    }

    // ── Internal helpers ───────────────────────────────────

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query::<T, ()>(path, None).await
    }

    async fn get_with_query<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.get(&url);
        if let Some(query) = query {
            req = req.query(query);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url, status, body);
        }

        let envelope: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("parsing response from {}", url))?;
        Ok(envelope.response)
    }
}
