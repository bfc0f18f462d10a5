//! loginurl-gate - access-control gateway for the game login URL.
//!
//! Decides per request whether a client may reach the login hand-off routes:
//! IP reputation (ban patterns over geo/ASN enrichment, with a classifier
//! fallback), a per-IP fixed-window quota, and transparent prefix proxying.

pub mod app;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod maintenance;
pub mod metrics;
pub mod security;

pub use app::App;
pub use config::Config;
