//! Persistence Store for hosts.
//!
//! `HostStore` is the seam the rest of the crate talks to. `MemoryHostStore`
//! keeps records in memory behind a write lock so concurrent updates are
//! serialized; every write re-validates the resulting host.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;

use super::host::{Host, HostDraft, HostPatch};

/// Which hosts a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFilter {
    pub include_disabled: bool,
    pub include_hidden: bool,
    pub config_profile_id: Option<Uuid>,
}

impl Default for HostFilter {
    fn default() -> Self {
        Self {
            include_disabled: true,
            include_hidden: true,
            config_profile_id: None,
        }
    }
}

impl HostFilter {
    fn matches(&self, host: &Host) -> bool {
        (self.include_disabled || !host.is_disabled)
            && (self.include_hidden || !host.is_hidden)
            && self
                .config_profile_id
                .map_or(true, |id| host.config_profile_id == Some(id))
    }
}

pub trait HostStore: Send + Sync + 'static {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Host, StoreError>> + Send;

    /// Matching hosts ordered by `view_position`, then id.
    fn list(&self, filter: HostFilter) -> impl Future<Output = Vec<Host>> + Send;

    fn create(&self, host: Host) -> impl Future<Output = Result<Host, StoreError>> + Send;

    fn update(
        &self,
        id: Uuid,
        patch: HostPatch,
    ) -> impl Future<Output = Result<Host, StoreError>> + Send;

    fn delete(&self, id: Uuid) -> impl Future<Output = Result<Host, StoreError>> + Send;
}

#[derive(Default)]
pub struct MemoryHostStore {
    hosts: RwLock<HashMap<Uuid, Host>>,
}

impl MemoryHostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load hosts from a YAML list of drafts. Invalid entries are skipped
    /// with a warning; an unreadable file is an error.
    pub async fn seed_from_file(&self, path: &Path) -> Result<usize> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading host seed file {}", path.display()))?;
        let drafts: Vec<HostDraft> = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing host seed file {}", path.display()))?;

        let mut loaded = 0;
        for draft in drafts {
            let remark = draft.remark.clone();
            match draft.build() {
                Ok(host) => match self.create(host).await {
                    Ok(_) => loaded += 1,
                    Err(e) => warn!(remark = %remark, error = %e, "skipping seeded host"),
                },
                Err(e) => warn!(remark = %remark, error = %e, "skipping invalid seeded host"),
            }
        }

        info!(path = %path.display(), hosts = loaded, "seeded host store");
        Ok(loaded)
    }
}

impl HostStore for MemoryHostStore {
    async fn get(&self, id: Uuid) -> Result<Host, StoreError> {
        self.hosts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, filter: HostFilter) -> Vec<Host> {
        let mut hosts: Vec<Host> = self
            .hosts
            .read()
            .await
            .values()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect();
        hosts.sort_by(|a, b| a.view_position.cmp(&b.view_position).then(a.id.cmp(&b.id)));
        hosts
    }

    async fn create(&self, host: Host) -> Result<Host, StoreError> {
        host.validate()?;
        let mut hosts = self.hosts.write().await;
        if hosts.contains_key(&host.id) {
            return Err(StoreError::AlreadyExists(host.id));
        }
        hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn update(&self, id: Uuid, patch: HostPatch) -> Result<Host, StoreError> {
        let mut hosts = self.hosts.write().await;
        let current = hosts.get(&id).ok_or(StoreError::NotFound(id))?;

        let mut updated = current.clone();
        patch.apply(&mut updated)?;
        updated.validate()?;

        hosts.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<Host, StoreError> {
        let mut hosts = self.hosts.write().await;
        let host = hosts.get(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(route_id) = host.route_id {
            return Err(StoreError::StillRouted { id, route_id });
        }
        hosts.remove(&id).ok_or(StoreError::NotFound(id))
    }
}
