use async_graphql::{Context, EmptySubscription, Object, Schema};
use std::sync::Arc;

use crate::domain::types::*;

use super::DaemonSystem;

pub type RealitySchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Fleet-wide traffic totals and host counts.
    async fn stats(&self, ctx: &Context<'_>) -> async_graphql::Result<FleetStats> {
        let svc = ctx.data::<Arc<DaemonSystem>>()?;
        Ok(svc.get_stats().await)
    }

    async fn bandwidth_stats(
        &self,
        ctx: &Context<'_>,
        query: Option<BandwidthQuery>,
    ) -> async_graphql::Result<BandwidthStats> {
        let svc = ctx.data::<Arc<DaemonSystem>>()?;
        Ok(svc.get_bandwidth_stats(&query.unwrap_or_default()).await)
    }

    async fn nodes_statistics(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Vec<PerNodeStatistics>> {
        let svc = ctx.data::<Arc<DaemonSystem>>()?;
        Ok(svc.get_nodes_statistics().await)
    }

    async fn health(&self, ctx: &Context<'_>) -> async_graphql::Result<HealthReport> {
        let svc = ctx.data::<Arc<DaemonSystem>>()?;
        Ok(svc.get_health().await)
    }

    /// Raw Prometheus metrics, one entry per node that returned them.
    async fn nodes_metrics(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<PerNodeMetrics>> {
        let svc = ctx.data::<Arc<DaemonSystem>>()?;
        Ok(svc.get_nodes_metrics().await)
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn generate_x25519_keypairs(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<X25519Keypairs> {
        let svc = ctx.data::<Arc<DaemonSystem>>()?;
        svc.generate_x25519_keypairs()
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }
}

pub fn build_schema(system: Arc<DaemonSystem>) -> RealitySchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(system)
        .finish()
}
