//! Security module for the gateway.
//!
//! Provides the admission checks behind the dispatcher:
//! - **Reputation**: allow-cache, enrichment, ban list and classifier fallback
//! - **Rate Limiting**: fixed-window per-IP request quota
//! - **Sessions**: HMAC-SHA256 signed timestamps for the login hand-off
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       Security Module                          │
//! ├──────────────┬──────────┬────────────┬────────────┬────────────┤
//! │  Reputation  │   Geo    │  Ban List  │ Classifier │ Rate Limit │
//! │  AllowCache  │ MaxMind  │   Regex    │ Chat API   │  DashMap   │
//! │  Local/Remote│ ASN/City │  SIGHUP    │  Governor  │  60s / 10  │
//! └──────────────┴──────────┴────────────┴────────────┴────────────┘
//! ```

pub mod ban_list;
pub mod classifier;
pub mod geo;
pub mod rate_limit;
pub mod reputation;
pub mod secret;
pub mod session;

pub use ban_list::BanList;
pub use classifier::{
    ChatClassifier, Classifier, CredentialSource, DisabledClassifier, RandomCredentials, Verdict,
};
pub use geo::{Enricher, Enrichment, GeoEnricher};
pub use rate_limit::{Admission, RateLimiter};
pub use reputation::{
    AllowCache, Assessment, Decision, LocalAssessor, RemoteAssessor, ReputationBackend,
    ReputationService, ReputationStats, VerdictSource,
};
pub use secret::{Secret, is_weak_secret};
