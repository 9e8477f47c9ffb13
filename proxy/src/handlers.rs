// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the Mastodon proxy.
//!
//! Routes:
//! - `POST /proxy/mastodon` forwards a call to a whitelisted instance
//! - `GET|POST /auth/mastodon/instances` reads or extends the whitelist
//! - `GET /auth/mastodon/verify/:instance` checks one instance
//! - `GET /health` and the metrics path

use crate::config::Config;
use crate::mediator::{new_request_id, MediationError, ProxyMediator, ProxyRequest};
use crate::metrics::ProxyMetrics;
use crate::validator::{validate_domain, ValidationResult};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fedigate_common::ErrorKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state.
pub struct AppState {
    pub mediator: ProxyMediator,
    pub metrics: Arc<ProxyMetrics>,
    pub config: Config,
}

/// Error response body for proxy failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub kind: ErrorKind,
    pub request_id: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub registry: &'static str,
    pub timestamp: String,
}

/// Whitelist listing.
#[derive(Debug, Serialize)]
pub struct InstancesResponse {
    pub success: bool,
    pub instances: Vec<String>,
}

/// Whitelist addition request.
#[derive(Debug, Deserialize)]
pub struct AddInstanceRequest {
    #[serde(default)]
    pub instance: Option<String>,
}

/// Whitelist addition response.
#[derive(Debug, Serialize)]
pub struct AddInstanceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Single instance check.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub valid: bool,
}

/// Build the full router: routes, CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors.allowed_origins);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/proxy/mastodon", post(mastodon_proxy))
        .route(
            "/auth/mastodon/instances",
            get(list_instances).post(add_instance),
        )
        .route("/auth/mastodon/verify/:instance", get(verify_instance));

    if state.config.metrics.enabled {
        let path = state.config.metrics.path.as_str();
        if path.starts_with('/') {
            app = app.route(path, get(metrics));
        } else {
            warn!(path = %path, "Metrics path must start with '/', using /metrics");
            app = app.route("/metrics", get(metrics));
        }
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` in the list allows any origin by echoing it back; a literal wildcard
/// cannot be combined with credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "fedigate-proxy",
        version: env!("CARGO_PKG_VERSION"),
        registry: state.mediator.registry().backend(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus exposition endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Forward a call to a whitelisted Mastodon instance.
pub async fn mastodon_proxy(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProxyRequest>,
) -> Response {
    let request_id = new_request_id();

    match state
        .mediator
        .mediate_with_id(request, request_id.clone())
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            let (status, code) = match &err {
                MediationError::InvalidInstance { .. } => (StatusCode::BAD_REQUEST, "INVALID_INSTANCE"),
                MediationError::InvalidMethod(_) => (StatusCode::BAD_REQUEST, "INVALID_METHOD"),
                MediationError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            };
            (
                status,
                Json(ErrorResponse {
                    error: err.to_string(),
                    code,
                    kind: err.kind(),
                    request_id,
                }),
            )
                .into_response()
        }
    }
}

/// List whitelisted instances.
pub async fn list_instances(State(state): State<Arc<AppState>>) -> Json<InstancesResponse> {
    let request_id = new_request_id();
    let instances = state.mediator.registry().list_instances().await;
    info!(request_id = %request_id, count = instances.len(), "Listed Mastodon instances");

    Json(InstancesResponse {
        success: true,
        instances,
    })
}

/// Add an instance to the whitelist.
pub async fn add_instance(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddInstanceRequest>,
) -> (StatusCode, Json<AddInstanceResponse>) {
    let request_id = new_request_id();

    let instance = match body.instance.as_deref().map(str::trim) {
        Some(instance) if !instance.is_empty() => instance.to_string(),
        _ => {
            warn!(request_id = %request_id, "Missing instance in request body");
            return failure(StatusCode::BAD_REQUEST, "Missing instance domain".to_string());
        }
    };

    if let ValidationResult::Invalid(err) = validate_domain(&instance) {
        warn!(request_id = %request_id, instance = %instance, error = %err, "Refusing malformed instance");
        return failure(
            StatusCode::BAD_REQUEST,
            format!("Invalid instance domain: {err}"),
        );
    }

    if state.mediator.registry().add_instance(&instance).await {
        info!(request_id = %request_id, instance = %instance, "Added Mastodon instance");
        (
            StatusCode::OK,
            Json(AddInstanceResponse {
                success: true,
                message: Some(format!("Added instance {instance} to whitelist")),
                error: None,
            }),
        )
    } else {
        error!(request_id = %request_id, instance = %instance, "Failed to add Mastodon instance");
        failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to add Mastodon instance".to_string(),
        )
    }
}

fn failure(status: StatusCode, error: String) -> (StatusCode, Json<AddInstanceResponse>) {
    (
        status,
        Json(AddInstanceResponse {
            success: false,
            message: None,
            error: Some(error),
        }),
    )
}

/// Check whether an instance is well formed and whitelisted.
pub async fn verify_instance(
    State(state): State<Arc<AppState>>,
    Path(instance): Path<String>,
) -> Json<VerifyResponse> {
    let request_id = new_request_id();
    let valid = validate_domain(&instance).is_valid()
        && state.mediator.registry().is_trusted(&instance).await;
    info!(request_id = %request_id, instance = %instance, valid, "Instance validity check");

    Json(VerifyResponse {
        success: true,
        valid,
    })
}
