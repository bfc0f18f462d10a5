//! Component assembly.
//!
//! Builds every shared component once from [`Config`] and hands out
//! references. Nothing here is a global: tests build as many isolated
//! instances as they like.

use axum::Router;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, ReputationMode};
use crate::error::StartupError;
use crate::gateway::{Dispatcher, Forwarder, Handoff};
use crate::http::{self, GateState};
use crate::security::{
    AllowCache, BanList, ChatClassifier, Classifier, DisabledClassifier, GeoEnricher,
    LocalAssessor, RandomCredentials, RateLimiter, RemoteAssessor, ReputationBackend,
    ReputationService,
};

/// All long-lived gateway components.
pub struct App {
    pub allow_cache: Arc<AllowCache>,
    pub limiter: Arc<RateLimiter>,
    pub reputation: Arc<ReputationService>,
    pub dispatcher: Arc<Dispatcher>,
    pub forwarder: Arc<Forwarder>,
    pub handoff: Arc<Handoff>,
    /// Present when a ban list is configured (local mode or internal API).
    pub ban_list: Option<Arc<BanList>>,
    pub local: Option<Arc<LocalAssessor>>,
    pub reset_interval: Duration,
}

impl App {
    /// Build from a validated configuration.
    pub fn build(config: &Config) -> Result<Self, StartupError> {
        let (ban_list, local) = match config.reputation.ban_list_path.as_deref() {
            Some(path) => {
                let (bans, assessor) = build_local(config, path)?;
                (Some(bans), Some(assessor))
            }
            None => (None, None),
        };

        let backend: Arc<dyn ReputationBackend> = match config.reputation.mode {
            ReputationMode::Local => match local {
                Some(ref local) => Arc::clone(local) as Arc<dyn ReputationBackend>,
                None => return Err(StartupError::NoBanList),
            },
            ReputationMode::Remote => {
                let url = config
                    .reputation
                    .remote_url
                    .as_deref()
                    .ok_or_else(|| StartupError::RemoteUrl("not set".to_string()))?;
                let timeout = Duration::from_millis(config.reputation.remote_timeout_ms);
                info!(url = %url, timeout_ms = config.reputation.remote_timeout_ms, "remote reputation mode");
                Arc::new(RemoteAssessor::new(url, timeout).map_err(StartupError::RemoteUrl)?)
            }
        };

        let mut app = Self::with_backend(config, backend)?;
        app.ban_list = ban_list;
        app.local = local;
        Ok(app)
    }

    /// Build with an explicit reputation backend in place of the configured one.
    pub fn with_backend(
        config: &Config,
        backend: Arc<dyn ReputationBackend>,
    ) -> Result<Self, StartupError> {
        let allow_cache = Arc::new(AllowCache::new());
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let reputation = Arc::new(ReputationService::new(backend, Arc::clone(&allow_cache)));
        let dispatcher = Arc::new(Dispatcher::new(
            &config.proxy,
            Arc::clone(&reputation),
            Arc::clone(&limiter),
        ));

        Ok(Self {
            allow_cache,
            limiter,
            reputation,
            dispatcher,
            forwarder: Arc::new(Forwarder::new(&config.proxy)?),
            handoff: Arc::new(Handoff::new(
                config.server.app_name.clone(),
                config.session.clone(),
                config.merchant.clone(),
            )),
            ban_list: None,
            local: None,
            reset_interval: Duration::from_secs(config.reputation.reset_interval_secs),
        })
    }

    /// Router for the public listener.
    pub fn public_router(&self) -> Router {
        let gate = Arc::new(GateState {
            dispatcher: Arc::clone(&self.dispatcher),
            forwarder: Arc::clone(&self.forwarder),
        });
        http::public_router(gate, Arc::clone(&self.handoff))
    }

    /// Router for the internal listener, when a local assessor exists.
    pub fn api_router(&self) -> Option<Router> {
        self.local.as_ref().map(|local| http::api_router(Arc::clone(local)))
    }
}

fn build_local(
    config: &Config,
    ban_list_path: &Path,
) -> Result<(Arc<BanList>, Arc<LocalAssessor>), StartupError> {
    let rep = &config.reputation;
    let enricher = GeoEnricher::open(rep.asn_db.as_deref(), rep.city_db.as_deref(), rep.country_db.as_deref())?;
    let bans = Arc::new(BanList::open(ban_list_path)?);

    let classifier: Arc<dyn Classifier> = if config.classifier.enabled {
        let pool = config.classifier.credential_pool();
        if pool.is_empty() {
            warn!(
                env = %config.classifier.api_keys_env,
                "classifier enabled with an empty credential pool - every classification will fail open"
            );
        } else {
            info!(credentials = pool.len(), model = %config.classifier.model, "classifier enabled");
        }
        Arc::new(ChatClassifier::new(
            &config.classifier,
            Arc::new(RandomCredentials::new(pool)),
        ))
    } else {
        info!("classifier disabled - only the ban list blocks traffic");
        Arc::new(DisabledClassifier)
    };

    let assessor = Arc::new(LocalAssessor::new(
        Arc::new(enricher),
        Arc::clone(&bans),
        classifier,
    ));
    Ok((bans, assessor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(extra: &str, ban_list: &Path) -> Config {
        Config::from_toml(&format!(
            r#"
[server]
address = "127.0.0.1:3000"

[reputation]
ban_list_path = "{}"
{}
"#,
            ban_list.display(),
            extra
        ))
        .unwrap()
    }

    #[test]
    fn test_build_local() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hosting provider x").unwrap();

        let app = App::build(&config("", file.path())).unwrap();
        assert!(app.local.is_some());
        assert_eq!(app.ban_list.as_ref().unwrap().snapshot().len(), 1);
        assert!(app.api_router().is_some());
        assert_eq!(app.reset_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_build_fails_without_ban_list_file() {
        let result = App::build(&config("", Path::new("/nonexistent/banned.txt")));
        assert!(matches!(result, Err(StartupError::BanList(_))));
    }

    #[test]
    fn test_build_remote_without_ban_list() {
        let config = Config::from_toml(
            r#"
[server]
address = "127.0.0.1:3000"

[reputation]
mode = "remote"
remote_url = "http://127.0.0.1:8080"
"#,
        )
        .unwrap();
        let app = App::build(&config).unwrap();
        assert!(app.local.is_none());
        assert!(app.api_router().is_none());
    }

    #[test]
    fn test_build_remote() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let app = App::build(&config(
            "mode = \"remote\"\nremote_url = \"http://127.0.0.1:8080\"",
            file.path(),
        ))
        .unwrap();
        // The local assessor still backs /check-ip.
        assert!(app.local.is_some());
    }
}
