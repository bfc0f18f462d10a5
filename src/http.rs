//! HTTP surfaces.
//!
//! - **Public router**: hand-off endpoints behind the gate middleware. The
//!   middleware runs the [`Dispatcher`] for every request, including paths
//!   that only exist upstream of a proxy prefix.
//! - **API router**: internal `/check-ip/:ip` and Prometheus `/metrics`.

use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::gateway::handoff::{self, Handoff};
use crate::gateway::{Action, Dispatcher, Forwarder, client_ip};
use crate::security::{Decision, LocalAssessor, ReputationBackend, VerdictSource};

/// State of the gate middleware.
pub struct GateState {
    pub dispatcher: Arc<Dispatcher>,
    pub forwarder: Arc<Forwarder>,
}

/// Gate middleware: one dispatcher decision per request.
async fn gate(State(state): State<Arc<GateState>>, req: Request, next: Next) -> Response {
    let ip = client_ip(req.headers());
    let path = req.uri().path().to_owned();
    let span = info_span!("request", id = %Uuid::new_v4(), ip = %ip, path = %path);

    async move {
        match state.dispatcher.handle(&path, &ip).await {
            Action::Proxy(route) => state.forwarder.forward(&route, req).await,
            Action::AllowNext => next.run(req).await,
            Action::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response(),
            Action::NotFound => not_found().await.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Router for the public listener.
pub fn public_router(gate_state: Arc<GateState>, handoff: Arc<Handoff>) -> Router {
    Router::new()
        .route("/player/login/dashboard", post(handoff::dashboard))
        .route("/player/growid/login/validate", post(handoff::validate))
        .route("/player/growid/checktoken", post(handoff::checktoken))
        .fallback(not_found)
        .with_state(handoff)
        .layer(middleware::from_fn_with_state(gate_state, gate))
}

// ============================================================================
// Internal API
// ============================================================================

/// Handler for GET /check-ip/:ip.
///
/// Assesses directly with the local assessor; the allow-cache is neither
/// consulted nor filled.
async fn check_ip(State(assessor): State<Arc<LocalAssessor>>, Path(ip): Path<String>) -> Response {
    let ip = ip.trim();
    if ip.is_empty() {
        return missing_ip().await;
    }

    let assessment = assessor.assess(ip).await;
    let body = match (assessment.source, assessment.verdict) {
        (VerdictSource::BanList, _) => json!({ "status": true }),
        (_, Some(verdict)) => json!(verdict),
        (VerdictSource::Unavailable { .. }, None) => json!({ "status": false }),
        (_, None) => json!({ "status": assessment.decision == Decision::Blocked }),
    };
    Json(body).into_response()
}

async fn missing_ip() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": "/:ip Is required!" })),
    )
        .into_response()
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Router for the internal API listener.
pub fn api_router(assessor: Arc<LocalAssessor>) -> Router {
    Router::new()
        .route("/check-ip", get(missing_ip))
        .route("/check-ip/", get(missing_ip))
        .route("/check-ip/:ip", get(check_ip))
        .route("/metrics", get(metrics_handler))
        .with_state(assessor)
}

/// Serve `router` on `addr` until the shutdown broadcast fires.
pub async fn serve(
    name: &'static str,
    addr: SocketAddr,
    router: Router,
    shutdown_tx: &broadcast::Sender<()>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(listener = name, address = %listener.local_addr()?, "HTTP listener started");

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    info!(listener = name, "HTTP listener stopped");
    Ok(())
}
