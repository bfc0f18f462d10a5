//! Probabilistic VPN/VPS/proxy classifier.
//!
//! Consulted only when the ban list is inconclusive. The enrichment text is
//! sent to an OpenAI-compatible chat completion endpoint with a fixed
//! instruction asking for a single JSON verdict object.
//!
//! # Failure Policy
//!
//! Every failure (no credentials, budget exhausted, timeout, HTTP error,
//! missing or unparseable reply) is returned as a [`ClassifierError`]. The
//! reputation service treats all of them as *unavailable* and fails open.
//! One attempt per request: no retry, no fallback to another credential.
//!
//! # Credentials
//!
//! A [`CredentialSource`] hands out one key per call. [`RandomCredentials`]
//! picks uniformly at random and keeps no state about failures.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovRateLimiter};
use nonzero_ext::nonzero;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::security::Secret;

/// Fixed system instruction sent with every classification.
const INSTRUCTION: &str = "You are a security checker that classifies IP address metadata. \
Respond ONLY with a single JSON object of this exact shape and nothing else: \
{\"is_vpn\": boolean, \"is_vps\": boolean, \"is_proxy\": boolean, \"confidence\": integer 0-100}. \
is_vps means the address belongs to a hosting, cloud or datacenter network. \
The following patterns are already banned networks, use them as examples: ";

/// Graded classifier verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub is_vpn: bool,
    pub is_vps: bool,
    pub is_proxy: bool,
    /// Informational only; never gates the decision.
    pub confidence: u8,
}

impl Verdict {
    /// True when any of the VPN/VPS/proxy flags is set.
    pub fn flagged(&self) -> bool {
        self.is_vpn || self.is_vps || self.is_proxy
    }
}

/// Something that can grade enrichment text.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `subject` (uppercased enrichment text). `ban_context` is the
    /// active ban list, passed along as examples.
    async fn classify(&self, subject: &str, ban_context: &str) -> Result<Verdict, ClassifierError>;
}

/// Hands out one credential per classification call.
pub trait CredentialSource: Send + Sync {
    fn next(&self) -> Option<Secret>;
}

/// Uniform random choice over a static pool.
#[derive(Debug, Clone, Default)]
pub struct RandomCredentials {
    keys: Vec<Secret>,
}

impl RandomCredentials {
    pub fn new(keys: Vec<Secret>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl CredentialSource for RandomCredentials {
    fn next(&self) -> Option<Secret> {
        if self.keys.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.keys.len());
        debug!(credential = index, "classifier credential selected");
        Some(self.keys[index].clone())
    }
}

/// Classifier used when `[classifier].enabled = false`.
#[derive(Debug, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _subject: &str, _ban_context: &str) -> Result<Verdict, ClassifierError> {
        Err(ClassifierError::Disabled)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completion backed classifier.
pub struct ChatClassifier {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
    credentials: Arc<dyn CredentialSource>,
    budget: DefaultDirectRateLimiter,
}

impl ChatClassifier {
    /// Build a classifier from configuration and a credential source.
    pub fn new(config: &ClassifierConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("loginurl-gate/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let rate = NonZeroU32::new(config.max_calls_per_second).unwrap_or(nonzero!(20u32));

        Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout,
            credentials,
            budget: GovRateLimiter::direct(Quota::per_second(rate)),
        }
    }

    async fn call(
        &self,
        key: &Secret,
        subject: &str,
        ban_context: &str,
    ) -> Result<Verdict, ClassifierError> {
        let system = format!("{}\n{}", INSTRUCTION, ban_context);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: subject,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(ClassifierError::EmptyReply)?;

        parse_verdict(&content)
    }
}

#[async_trait]
impl Classifier for ChatClassifier {
    async fn classify(&self, subject: &str, ban_context: &str) -> Result<Verdict, ClassifierError> {
        if self.budget.check().is_err() {
            return Err(ClassifierError::Throttled);
        }
        let key = self.credentials.next().ok_or(ClassifierError::NoCredentials)?;

        match tokio::time::timeout(self.timeout, self.call(&key, subject, ban_context)).await {
            Ok(Err(ClassifierError::Request(e))) if e.is_timeout() => Err(ClassifierError::Timeout),
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout),
        }
    }
}

/// Verdict as written by the model. `presentence` is accepted because
/// earlier prompts used that key for the confidence score.
#[derive(Deserialize)]
struct RawVerdict {
    is_vpn: bool,
    is_vps: bool,
    is_proxy: bool,
    #[serde(default, alias = "presentence", alias = "percentage")]
    confidence: Option<f64>,
}

/// Extract a verdict object from model output.
///
/// Tolerates surrounding prose or Markdown fences by taking the outermost
/// `{ ... }` span. All three flags are required.
pub fn parse_verdict(content: &str) -> Result<Verdict, ClassifierError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => return Err(ClassifierError::Parse("no JSON object in reply".to_string())),
    };

    let raw: RawVerdict =
        serde_json::from_str(json).map_err(|e| ClassifierError::Parse(e.to_string()))?;

    Ok(Verdict {
        is_vpn: raw.is_vpn,
        is_vps: raw.is_vps,
        is_proxy: raw.is_proxy,
        confidence: raw.confidence.map(|c| c.clamp(0.0, 100.0) as u8).unwrap_or(0),
    })
}
