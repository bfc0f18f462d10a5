//! Fake collaborators: enricher, credential source, classifier API, sibling
//! reputation service and upstream origin. All count their calls.

#![allow(dead_code)]

use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{StatusCode, header};
use loginurl_gate::security::geo::{AsnRecord, Enricher, Enrichment};
use loginurl_gate::security::{CredentialSource, Secret};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::server::spawn_router;

/// Enricher with canned ASN organizations.
#[derive(Default)]
pub struct FakeEnricher {
    orgs: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl FakeEnricher {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            orgs: entries
                .iter()
                .map(|(ip, org)| (ip.to_string(), org.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Enricher for FakeEnricher {
    fn lookup(&self, ip: &str) -> Enrichment {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Enrichment {
            asn: self.orgs.get(ip).map(|org| AsnRecord {
                autonomous_system_number: Some(64500),
                autonomous_system_organization: Some(org.clone()),
            }),
            city: None,
            country: None,
        }
    }
}

/// Credential source handing out one fixed key, counting draws.
pub struct CountingCredentials {
    key: Option<String>,
    draws: AtomicUsize,
}

impl CountingCredentials {
    pub fn new(key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            draws: AtomicUsize::new(0),
        }
    }

    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }
}

impl CredentialSource for CountingCredentials {
    fn next(&self) -> Option<Secret> {
        self.draws.fetch_add(1, Ordering::SeqCst);
        self.key.as_deref().map(Secret::new)
    }
}

// ============================================================================
// Chat-completion classifier API
// ============================================================================

struct ClassifierState {
    status: StatusCode,
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
    last_auth: parking_lot::Mutex<Option<String>>,
}

/// OpenAI-compatible endpoint answering every request with `reply`.
pub struct FakeClassifierApi {
    pub addr: SocketAddr,
    state: Arc<ClassifierState>,
}

impl FakeClassifierApi {
    pub async fn spawn(reply: &str, delay: Duration) -> Self {
        Self::spawn_with_status(StatusCode::OK, reply, delay).await
    }

    /// Endpoint answering every request with `status` and `reply`.
    pub async fn spawn_with_status(status: StatusCode, reply: &str, delay: Duration) -> Self {
        let state = Arc::new(ClassifierState {
            status,
            reply: reply.to_string(),
            delay,
            calls: AtomicUsize::new(0),
            last_auth: parking_lot::Mutex::new(None),
        });
        let router = Router::new()
            .route("/chat/completions", post(chat))
            .with_state(Arc::clone(&state));
        Self {
            addr: spawn_router(router).await,
            state,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn last_auth(&self) -> Option<String> {
        self.state.last_auth.lock().clone()
    }
}

async fn chat(State(state): State<Arc<ClassifierState>>, req: Request) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    *state.last_auth.lock() = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    tokio::time::sleep(state.delay).await;
    let body: Value = json!({
        "choices": [{ "message": { "role": "assistant", "content": state.reply } }]
    });
    (state.status, Json(body)).into_response()
}

// ============================================================================
// Sibling reputation service
// ============================================================================

struct ReputationState {
    replies: HashMap<String, (StatusCode, String)>,
    delay: Duration,
    calls: AtomicUsize,
}

/// `/check-ip/:ip` service with per-IP canned replies (default `{"status":false}`).
pub struct FakeReputationApi {
    pub addr: SocketAddr,
    state: Arc<ReputationState>,
}

impl FakeReputationApi {
    pub async fn spawn(replies: &[(&str, u16, &str)], delay: Duration) -> Self {
        let state = Arc::new(ReputationState {
            replies: replies
                .iter()
                .map(|(ip, status, body)| {
                    (
                        ip.to_string(),
                        (StatusCode::from_u16(*status).unwrap(), body.to_string()),
                    )
                })
                .collect(),
            delay,
            calls: AtomicUsize::new(0),
        });
        let router = Router::new()
            .route("/check-ip/:ip", get(check_ip))
            .with_state(Arc::clone(&state));
        Self {
            addr: spawn_router(router).await,
            state,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

async fn check_ip(State(state): State<Arc<ReputationState>>, Path(ip): Path<String>) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.delay).await;
    let (status, body) = state
        .replies
        .get(&ip)
        .cloned()
        .unwrap_or((StatusCode::OK, r#"{"status":false}"#.to_string()));
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

// ============================================================================
// Upstream origin
// ============================================================================

async fn echo(req: Request) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let custom = req
        .headers()
        .get("x-custom")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(req.into_body(), 1 << 20).await.unwrap();

    (
        StatusCode::CREATED,
        [("x-origin", "yes")],
        Json(json!({
            "method": method,
            "path": path,
            "query": query,
            "custom": custom,
            "body": String::from_utf8_lossy(&body),
        })),
    )
        .into_response()
}

async fn moved() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]).into_response()
}

/// Origin that echoes requests back as JSON with status 201.
/// `/growtopia/moved` answers with a redirect.
pub async fn spawn_origin() -> SocketAddr {
    let router = Router::new()
        .route("/growtopia/moved", get(moved))
        .fallback(echo);
    spawn_router(router).await
}
