use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::host::{HostDraft, HostPatch, HostView};
use crate::domain::host_store::{HostFilter, HostStore};
use crate::domain::types::*;
use crate::error::{ControlError, StoreError};

use super::DaemonSystem;

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub system: Arc<DaemonSystem>,
}

type ApiResult<T> = Result<Json<Envelope<T>>, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // System facade
        .route("/api/system/stats", get(stats))
        .route("/api/system/stats/bandwidth", get(bandwidth_stats))
        .route("/api/system/stats/nodes", get(nodes_statistics))
        .route("/api/system/health", get(fleet_health))
        .route("/api/system/nodes/metrics", get(nodes_metrics))
        .route("/api/system/tools/x25519/generate", get(generate_x25519))
        // Hosts
        .route("/api/hosts", get(list_hosts).post(create_host))
        .route(
            "/api/hosts/{id}",
            get(get_host).patch(update_host).delete(delete_host),
        )
        .with_state(state)
}

fn wrap<T>(response: T) -> Json<Envelope<T>> {
    Json(Envelope { response })
}

fn control_error(e: ControlError) -> (StatusCode, String) {
    if let Some(field) = e.field() {
        debug!(field, "rejected host configuration");
    }
    let status = match e {
        ControlError::InvalidConfiguration { .. } => StatusCode::BAD_REQUEST,
        ControlError::EntropyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, e.to_string())
}

fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::Invalid(inner) => control_error(inner),
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        StoreError::AlreadyExists(_) | StoreError::StillRouted { .. } => {
            (StatusCode::CONFLICT, e.to_string())
        }
    }
}

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats(State(state): State<AppState>) -> ApiResult<FleetStats> {
    Ok(wrap(state.system.get_stats().await))
}

async fn bandwidth_stats(
    State(state): State<AppState>,
    Query(query): Query<BandwidthQuery>,
) -> ApiResult<BandwidthStats> {
    Ok(wrap(state.system.get_bandwidth_stats(&query).await))
}

async fn nodes_statistics(State(state): State<AppState>) -> ApiResult<Vec<PerNodeStatistics>> {
    Ok(wrap(state.system.get_nodes_statistics().await))
}

async fn fleet_health(State(state): State<AppState>) -> ApiResult<HealthReport> {
    Ok(wrap(state.system.get_health().await))
}

async fn nodes_metrics(State(state): State<AppState>) -> ApiResult<Vec<PerNodeMetrics>> {
    Ok(wrap(state.system.get_nodes_metrics().await))
}

async fn generate_x25519(State(state): State<AppState>) -> ApiResult<X25519Keypairs> {
    state
        .system
        .generate_x25519_keypairs()
        .map(wrap)
        .map_err(|e| {
            warn!(error = %e, "x25519 keypair generation failed");
            control_error(e)
        })
}

// ── Hosts ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostListParams {
    #[serde(default)]
    include_hidden: Option<bool>,
    #[serde(default)]
    include_disabled: Option<bool>,
    #[serde(default)]
    config_profile_id: Option<Uuid>,
}

async fn list_hosts(
    State(state): State<AppState>,
    Query(params): Query<HostListParams>,
) -> ApiResult<Vec<HostView>> {
    let filter = HostFilter {
        include_hidden: params.include_hidden.unwrap_or(true),
        include_disabled: params.include_disabled.unwrap_or(true),
        config_profile_id: params.config_profile_id,
    };
    let policy = &state.system.settings().fingerprint_policy;
    let hosts = state.system.hosts().list(filter).await;
    Ok(wrap(
        hosts.into_iter().map(|h| HostView::new(h, policy)).collect(),
    ))
}

async fn get_host(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<HostView> {
    let host = state.system.hosts().get(id).await.map_err(store_error)?;
    Ok(wrap(HostView::new(
        host,
        &state.system.settings().fingerprint_policy,
    )))
}

async fn create_host(
    State(state): State<AppState>,
    Json(draft): Json<HostDraft>,
) -> Result<(StatusCode, Json<Envelope<HostView>>), (StatusCode, String)> {
    let host = draft.build().map_err(control_error)?;
    let host = state.system.hosts().create(host).await.map_err(store_error)?;
    info!(host = %host.id, remark = %host.remark, "host created");
    Ok((
        StatusCode::CREATED,
        wrap(HostView::new(
            host,
            &state.system.settings().fingerprint_policy,
        )),
    ))
}

async fn update_host(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<HostPatch>,
) -> ApiResult<HostView> {
    if patch.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "empty update".to_string()));
    }
    let host = state
        .system
        .hosts()
        .update(id, patch)
        .await
        .map_err(store_error)?;
    info!(host = %host.id, "host updated");
    Ok(wrap(HostView::new(
        host,
        &state.system.settings().fingerprint_policy,
    )))
}

async fn delete_host(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<HostView> {
    let host = state.system.hosts().delete(id).await.map_err(store_error)?;
    info!(host = %host.id, "host deleted");
    Ok(wrap(HostView::new(
        host,
        &state.system.settings().fingerprint_policy,
    )))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode as Status;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use super::*;
    use crate::domain::aggregator::{AggregatorSettings, FleetAggregator};
    use crate::domain::host_store::MemoryHostStore;
    use crate::domain::registry::NodeRegistry;
    use crate::domain::system_service::SystemSettings;
    use crate::transport::HttpNodeTransport;

    /// Serve the REST router on an ephemeral port and return its base URL.
    async fn spawn_api() -> String {
        let transport = Arc::new(HttpNodeTransport::new(&[]).unwrap());
        let system = DaemonSystem::new(
            FleetAggregator::new(transport, AggregatorSettings::default()),
            NodeRegistry::default(),
            Arc::new(MemoryHostStore::new()),
            SystemSettings::default(),
        );
        let app = router(AppState {
            system: Arc::new(system),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn system_reads_are_wrapped_in_an_envelope() {
        let base = spawn_api().await;
        let resp = reqwest::get(format!("{base}/api/system/health")).await.unwrap();
        assert_eq!(resp.status(), Status::OK);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["response"]["status"], "HEALTHY");
        assert_eq!(body["response"]["nodeCount"], 0);
        assert_eq!(body["response"]["failedNodes"], json!([]));

        let keys: Value = reqwest::get(format!("{base}/api/system/tools/x25519/generate"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let pair = &keys["response"]["keypairs"][0];
        assert_eq!(pair["publicKey"].as_str().unwrap().len(), 43);
        assert_eq!(pair["privateKey"].as_str().unwrap().len(), 43);
    }

    #[tokio::test]
    async fn host_errors_map_to_status_codes() {
        let base = spawn_api().await;
        let http = reqwest::Client::new();

        let invalid = http
            .post(format!("{base}/api/hosts"))
            .json(&json!({ "remark": "edge", "address": "edge.example.net", "port": 0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), Status::BAD_REQUEST);
        assert!(invalid.text().await.unwrap().contains("port"));

        let missing = http
            .get(format!("{base}/api/hosts/{}", Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), Status::NOT_FOUND);

        let created = http
            .post(format!("{base}/api/hosts"))
            .json(&json!({
                "remark": "edge", "address": "edge.example.net", "port": 443, "routeId": 7
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), Status::CREATED);
        let body: Value = created.json().await.unwrap();
        let id = body["response"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["response"]["routable"], true);

        let empty = http
            .patch(format!("{base}/api/hosts/{id}"))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), Status::BAD_REQUEST);

        let routed = http
            .delete(format!("{base}/api/hosts/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(routed.status(), Status::CONFLICT);

        let detached = http
            .patch(format!("{base}/api/hosts/{id}"))
            .json(&json!({ "routeId": null }))
            .send()
            .await
            .unwrap();
        assert_eq!(detached.status(), Status::OK);

        let deleted = http
            .delete(format!("{base}/api/hosts/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), Status::OK);
    }
}
