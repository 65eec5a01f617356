use anyhow::{Context, Result};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::graphql::{self, RealitySchema};
use crate::api::rest::{self, AppState};
use crate::api::DaemonSystem;
use crate::config::Config;
use crate::domain::aggregator::FleetAggregator;
use crate::domain::host_store::MemoryHostStore;
use crate::domain::registry::NodeRegistry;
use crate::transport::HttpNodeTransport;

pub async fn run(config: Config) -> Result<()> {
    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.daemon.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "realityctl daemon starting");

    let system = Arc::new(build_system(&config).await?);

    let app_state = AppState {
        system: system.clone(),
    };

    // GraphQL sub-router carries the schema as its own state
    let schema = graphql::build_schema(system.clone());
    let graphql_router = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .with_state(schema);

    let app = rest::router(app_state)
        .merge(graphql_router)
        .layer(TraceLayer::new_for_http());

    let http_addr = &config.daemon.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(
        addr = %http_addr,
        nodes = config.nodes.len(),
        fetch_timeout_ms = config.telemetry.fetch_timeout_ms,
        deadline_ms = config.telemetry.deadline_ms,
        "HTTP server listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("realityctl daemon stopped");
    Ok(())
}

/// Wire transport, registry, host store, and aggregator into the facade.
async fn build_system(config: &Config) -> Result<DaemonSystem> {
    let registry = NodeRegistry::new(config.nodes.clone());
    let transport = Arc::new(HttpNodeTransport::new(registry.targets())?);
    let aggregator = FleetAggregator::new(transport, config.telemetry.aggregator_settings());

    let hosts = Arc::new(MemoryHostStore::new());
    if let Some(seed) = &config.hosts.seed_file {
        hosts.seed_from_file(Path::new(seed)).await?;
    }

    let active = registry.list_active_node_ids();
    if active.is_empty() {
        warn!("no active nodes configured, telemetry will report an empty fleet");
    }

    Ok(DaemonSystem::new(
        aggregator,
        registry,
        hosts,
        config.system_settings(),
    ))
}

async fn graphql_playground() -> Html<String> {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn graphql_handler(
    State(schema): State<RealitySchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeTarget;

    #[tokio::test]
    async fn system_is_wired_from_config() {
        let config = Config {
            nodes: vec![NodeTarget {
                id: "de-1".into(),
                url: "http://127.0.0.1:1".into(),
                enabled: false,
                token: None,
            }],
            ..Config::default()
        };
        let system = build_system(&config).await.unwrap();

        // The only node is disabled, so this is an empty fleet.
        let health = system.get_health().await;
        assert_eq!(health.node_count, 0);
        assert!(health.failed_nodes.is_empty());
    }
}
