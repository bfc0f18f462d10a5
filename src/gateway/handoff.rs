//! Login hand-off endpoints.
//!
//! The game client opens the dashboard with a merchant `meta` blob, the login
//! form posts credentials to `validate`, and the client later refreshes with
//! `checktoken`. The `session` cookie issued by the dashboard is what ties the
//! first two steps together; it is a session token from
//! [`crate::security::session`].
//!
//! Replies to `validate` and `checktoken` are a fixed JSON envelope sent as
//! `text/html` with status 200, which is what the client parses.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::config::{MerchantBlock, SessionConfig};
use crate::security::session;

/// Name of the hand-off session cookie.
pub const SESSION_COOKIE: &str = "session";

/// Merchant shown on the denied page when none is recognized.
const DEFAULT_MERCHANT: &str = "Growtopia";

/// Characters escaped in redirect query values (everything but
/// `A-Z a-z 0-9 - _ . ! ~ * ' ( )`).
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Shared state of the hand-off endpoints.
pub struct Handoff {
    app_name: String,
    session: SessionConfig,
    merchants: Vec<MerchantBlock>,
}

impl Handoff {
    pub fn new(app_name: impl Into<String>, session: SessionConfig, merchants: Vec<MerchantBlock>) -> Self {
        Self {
            app_name: app_name.into(),
            session,
            merchants,
        }
    }

    /// Look up a merchant by name and check its key in constant time.
    ///
    /// Returns `Ok(name)` on a full match, `Err(Some(name))` when the merchant
    /// exists but the key is wrong, `Err(None)` otherwise.
    fn authorize(&self, merchant: &str, key: &str) -> Result<&str, Option<&str>> {
        let block = self
            .merchants
            .iter()
            .find(|m| m.name == merchant)
            .ok_or(None::<&str>)?;
        if bool::from(block.api_key.expose().as_bytes().ct_eq(key.as_bytes())) {
            Ok(&block.name)
        } else {
            Err(Some(&block.name))
        }
    }

    fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; HttpOnly; Secure; SameSite=Lax; Path={}",
            SESSION_COOKIE, token, self.session.cookie_path
        );
        if self.session.max_age_secs > 0 {
            cookie.push_str(&format!("; Max-Age={}", self.session.max_age_secs));
        }
        cookie
    }
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    status: &'static str,
    message: &'a str,
    token: &'a str,
    url: &'static str,
    #[serde(rename = "accountType")]
    account_type: &'static str,
}

impl<'a> Envelope<'a> {
    fn success(token: &'a str) -> Self {
        Self {
            status: "success",
            message: "Account Validated.",
            token,
            url: "",
            account_type: "growtopia",
        }
    }

    fn failed(message: &'a str) -> Self {
        Self {
            status: "failed",
            message,
            token: "",
            url: "",
            account_type: "growtopia",
        }
    }
}

impl IntoResponse for Envelope<'_> {
    fn into_response(self) -> Response {
        let body = serde_json::to_string(&self).unwrap_or_default();
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))],
            body,
        )
            .into_response()
    }
}

// ============================================================================
// Request parsing helpers
// ============================================================================

/// Parse the dashboard body: percent-encoded text of `key|value` lines.
/// Lines without `|` are ignored; later keys overwrite earlier ones.
pub fn parse_pipe_fields(body: &str) -> BTreeMap<String, String> {
    let decoded = percent_decode_str(body).decode_utf8_lossy();
    let mut fields = BTreeMap::new();
    for line in decoded.split('\n') {
        if !line.contains('|') {
            continue;
        }
        let mut parts = line.split('|');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default().trim_end_matches('\r');
        fields.insert(key.to_string(), value.to_string());
    }
    fields
}

/// First value of `name` in a form-encoded body.
fn form_field(body: &str, name: &str) -> String {
    form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Value of cookie `name` from the request's `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn denied(merchant_name: &str) -> Response {
    redirect(&format!(
        "dashboard/denied?merchant_name={}",
        utf8_percent_encode(merchant_name, QUERY_VALUE)
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /player/login/dashboard`
pub async fn dashboard(State(handoff): State<Arc<Handoff>>, body: String) -> Response {
    let fields = parse_pipe_fields(&body);

    let meta = fields.get("meta").map(String::as_str).unwrap_or_default();
    let merchant = form_field(meta, "merchant");
    let key = form_field(meta, "key");

    if merchant.is_empty() && key.is_empty() {
        debug!("dashboard request without merchant meta");
        return denied(DEFAULT_MERCHANT);
    }

    let name = match handoff.authorize(&merchant, &key) {
        Ok(name) => name,
        Err(known) => {
            warn!(merchant = %merchant, "dashboard merchant rejected");
            return denied(known.unwrap_or(DEFAULT_MERCHANT));
        }
    };

    let data = serde_json::to_string(&fields).unwrap_or_default();
    let location = format!(
        "dashboard/home?data={}&merchant_name={}",
        utf8_percent_encode(&data, QUERY_VALUE),
        utf8_percent_encode(name, QUERY_VALUE)
    );

    let token = session::issue(&handoff.session.secret);
    let mut response = redirect(&location);
    match HeaderValue::from_str(&handoff.session_cookie(&token)) {
        Ok(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
        Err(e) => warn!(error = %e, "session cookie not representable"),
    }
    info!(merchant = %name, "dashboard opened");
    response
}

/// `POST /player/growid/login/validate`
pub async fn validate(
    State(handoff): State<Arc<Handoff>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let valid = cookie_value(&headers, SESSION_COOKIE).is_some_and(|token| {
        session::validate(
            &token,
            &handoff.session.secret,
            handoff.session.max_age_secs,
        )
    });
    if !valid {
        let message = format!(
            "`o{}: `4Something went wrong... Bad connection or internet? No one knows.",
            handoff.app_name
        );
        return Envelope::failed(&message).into_response();
    }

    let account_session = session::issue(&handoff.session.secret);
    let value = |name: &str| -> String {
        form_urlencoded::byte_serialize(form_field(&body, name).as_bytes()).collect()
    };

    let grow_id = form_field(&body, "growId");
    let payload = format!(
        "_token={}&_session={}&merchant_name={}&growId={}&password={}",
        value("_token"),
        account_session,
        value("merchant_name"),
        value("growId"),
        value("password"),
    );
    let token = STANDARD.encode(payload);

    info!(grow_id = %grow_id, "account validated");
    Envelope::success(&token).into_response()
}

/// `POST /player/growid/checktoken`
pub async fn checktoken(body: String) -> Response {
    let refresh = form_field(&body, "refreshToken");
    debug!(present = !refresh.is_empty(), "token refresh");
    Envelope::success(&refresh).into_response()
}
