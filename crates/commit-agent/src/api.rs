//! HTTP API for health checks, Prometheus metrics and resolved settings

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use commitclass::{
    health::{components, ComponentStatus, HealthRegistry},
    NodeSource, Quantity, Resolver, Settings, StructuredLogger,
};
use k8s_openapi::api::core::v1::Node;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub resolver: Arc<Resolver>,
    pub nodes: Arc<dyn NodeSource>,
    pub node_name: String,
    pub logger: StructuredLogger,
}

#[derive(Debug, Serialize)]
struct SettingsResponse {
    node: String,
    commit_class: Option<String>,
    factors: Settings,
    /// Allocatable after commit scaling, keyed by resource name
    scaled_allocatable: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the snapshot is synced
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Resolve commit settings for this agent's node
async fn settings(State(state): State<Arc<AppState>>) -> Response {
    let node = match state.nodes.node(&state.node_name).await {
        Ok(node) => node,
        Err(e) => {
            warn!(node = %state.node_name, error = %e, "Failed to look up node");
            return error_response(StatusCode::BAD_GATEWAY, format!("{e:#}"));
        }
    };

    match state.resolver.resolve_node(&node) {
        Ok(resolution) => {
            {
                let factors: Vec<(&str, f64)> = resolution.settings.iter().collect();
                state
                    .logger
                    .log_resolution(resolution.commit_class.as_deref(), &factors);
            }
            state.health_registry.set_healthy(components::RESOLVER).await;

            let scaled_allocatable = scale_allocatable(&resolution.settings, &node);
            Json(SettingsResponse {
                node: state.node_name.clone(),
                commit_class: resolution.commit_class,
                factors: resolution.settings,
                scaled_allocatable,
            })
            .into_response()
        }
        Err(e) => {
            state.logger.log_resolution_failure(&e.to_string());
            state
                .health_registry
                .set_degraded(components::RESOLVER, e.to_string())
                .await;
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// Apply commit scaling to the node's reported allocatable resources
fn scale_allocatable(settings: &Settings, node: &Node) -> BTreeMap<String, String> {
    let Some(allocatable) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) else {
        return BTreeMap::new();
    };

    allocatable
        .iter()
        .map(|(name, quantity)| {
            let scaled = match Quantity::try_from(quantity) {
                Ok(parsed) => settings.scale(name, &parsed).to_string(),
                Err(e) => {
                    debug!(resource = %name, error = %e, "Unparseable allocatable quantity");
                    quantity.0.clone()
                }
            };
            (name.clone(), scaled)
        })
        .collect()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/settings", get(settings))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use commitclass::{PolicyReplica, ResourceWhitelist, SourceEvent};
    use k8s_openapi::api::core::v1::NodeStatus;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity as ApiQuantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct FixedNode(Option<Node>);

    #[async_trait]
    impl NodeSource for FixedNode {
        async fn node(&self, name: &str) -> anyhow::Result<Node> {
            self.0
                .clone()
                .ok_or_else(|| anyhow::anyhow!("node {name} not found"))
        }
    }

    fn worker_node() -> Node {
        let allocatable = [("cpu", "4"), ("memory", "16Gi"), ("pods", "110")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), ApiQuantity(v.to_string())))
            .collect();

        Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                labels: Some([("pool".to_string(), "batch".to_string())].into()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(allocatable),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn batch_class() -> (String, Value) {
        (
            "batch".to_string(),
            json!({
                "metadata": { "name": "batch" },
                "spec": {
                    "selector": {
                        "matchExpressions": [
                            { "key": "pool", "operator": "In", "values": ["batch"] }
                        ]
                    },
                    "resources": [
                        { "name": "cpu", "percent": 150 },
                        { "name": "memory", "percent": 50 }
                    ]
                }
            }),
        )
    }

    async fn setup_test_app(objects: Vec<(String, Value)>, node: Option<Node>) -> (Router, Arc<AppState>) {
        let health_registry = HealthRegistry::new();
        health_registry.register(components::POLICY_REPLICA).await;
        health_registry.register(components::RESOLVER).await;

        let replica = Arc::new(PolicyReplica::new());
        replica.apply(SourceEvent::Restarted(objects));

        let state = Arc::new(AppState {
            health_registry,
            resolver: Arc::new(Resolver::new(replica, ResourceWhitelist::default())),
            nodes: Arc::new(FixedNode(node)),
            node_name: "worker-1".to_string(),
            logger: StructuredLogger::new("worker-1"),
        });

        (create_router(state.clone()), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_settings_scales_allocatable() {
        let (app, _state) = setup_test_app(vec![batch_class()], Some(worker_node())).await;

        let (status, body) = get_json(app, "/settings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["node"], "worker-1");
        assert_eq!(body["commit_class"], "batch");
        assert_eq!(body["factors"], json!({ "cpu": 1.5, "memory": 0.5 }));
        assert_eq!(body["scaled_allocatable"]["cpu"], "6");
        assert_eq!(body["scaled_allocatable"]["memory"], "8Gi");
        assert_eq!(body["scaled_allocatable"]["pods"], "110");
    }

    #[tokio::test]
    async fn test_settings_without_match_is_unscaled() {
        let (app, _state) = setup_test_app(Vec::new(), Some(worker_node())).await;

        let (status, body) = get_json(app, "/settings").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["commit_class"].is_null());
        assert_eq!(body["factors"], json!({}));
        assert_eq!(body["scaled_allocatable"]["memory"], "16Gi");
    }

    #[tokio::test]
    async fn test_settings_reports_invalid_class() {
        let broken = (
            "broken".to_string(),
            json!({
                "metadata": { "name": "broken" },
                "spec": { "resources": [{ "name": "cpu", "percent": "lots" }] }
            }),
        );
        let (app, state) = setup_test_app(vec![broken], Some(worker_node())).await;

        let (status, body) = get_json(app, "/settings").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("broken"));

        let health = state.health_registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_settings_skips_class_without_spec() {
        let draft = ("a-draft".to_string(), json!({ "metadata": { "name": "a-draft" } }));
        let (app, state) = setup_test_app(vec![draft, batch_class()], Some(worker_node())).await;

        let (status, body) = get_json(app, "/settings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["commit_class"], "batch");
        assert_eq!(body["scaled_allocatable"]["cpu"], "6");

        let health = state.health_registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_settings_missing_node() {
        let (app, _state) = setup_test_app(vec![batch_class()], None).await;

        let (status, body) = get_json(app, "/settings").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("worker-1"));
    }

    #[tokio::test]
    async fn test_healthz_and_readyz() {
        let (app, state) = setup_test_app(Vec::new(), None).await;

        let (status, body) = get_json(app.clone(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);

        state.health_registry.set_ready(true).await;
        let (status, _) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::OK);

        state
            .health_registry
            .set_unhealthy(components::POLICY_REPLICA, "policy source ended")
            .await;
        let (status, body) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _state) = setup_test_app(vec![batch_class()], Some(worker_node())).await;

        let (status, _) = get_json(app.clone(), "/settings").await;
        assert_eq!(status, StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("commitclass_resolutions_total"));
    }
}
