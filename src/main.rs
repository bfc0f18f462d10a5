//! loginurl-gate - access-control gateway for the game login URL.
//!
//! Usage: `loginurl-gate [config.toml]`

use loginurl_gate::config::{self, Config};
use loginurl_gate::security::{BanList, is_weak_secret};
use loginurl_gate::{App, http, maintenance, metrics};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOGINURL_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {}",
            errors.len(),
            config_path
        ));
    }

    info!(
        address = %config.server.address,
        app_name = %config.server.app_name,
        mode = ?config.reputation.mode,
        "Starting loginurl-gate"
    );

    // SECURITY: Refuse to start with a default/weak session secret.
    // Anyone who knows the secret can mint hand-off sessions.
    if is_weak_secret(&config.session.secret) {
        if std::env::var("LOGINURL_ALLOW_INSECURE_SECRET").is_ok() {
            warn!("INSECURE: Running with weak session secret (allowed via LOGINURL_ALLOW_INSECURE_SECRET)");
        } else {
            error!("FATAL: Insecure session secret detected!");
            error!("  The session secret signs the login hand-off cookie.");
            error!("  To fix, set a strong secret in config.toml:");
            error!("    [session]");
            error!("    secret = \"<random-32-char-string>\"");
            error!("  Generate a secure secret with:");
            error!("    openssl rand -hex 32");
            error!("  For testing only, set LOGINURL_ALLOW_INSECURE_SECRET=1 to bypass this check.");
            return Err(anyhow::anyhow!(
                "Refusing to start with insecure session secret. See error messages above."
            ));
        }
    }
    if config.session.max_age_secs == 0 {
        warn!("session.max_age_secs = 0 disables token expiry - NOT RECOMMENDED");
    }

    metrics::init();
    info!("Metrics initialized");

    let app = App::build(&config).map_err(|e| {
        error!(error = %e, "Failed to build gateway");
        e
    })?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let reset_task = maintenance::spawn_reset_task(
        Arc::clone(&app.allow_cache),
        Arc::clone(&app.limiter),
        app.reset_interval,
        &shutdown_tx,
    );
    info!(interval_secs = app.reset_interval.as_secs(), "Reset task started");

    if let Some(ref bans) = app.ban_list {
        spawn_reload_task(Arc::clone(bans), &shutdown_tx);
    }
    spawn_signal_task(shutdown_tx.clone());

    // Internal API listener is optional.
    let api_task = match (config.api.as_ref(), app.api_router()) {
        (Some(api), Some(router)) => {
            let shutdown_tx = shutdown_tx.clone();
            let address = api.address;
            Some(tokio::spawn(async move {
                if let Err(e) = http::serve("api", address, router, &shutdown_tx).await {
                    error!(error = %e, "API listener failed");
                }
            }))
        }
        _ => {
            info!("Internal API disabled");
            None
        }
    };

    let served = http::serve("public", config.server.address, app.public_router(), &shutdown_tx).await;
    // A public listener failure takes everything down.
    let _ = shutdown_tx.send(());

    if let Some(task) = api_task {
        let _ = task.await;
    }
    let _ = reset_task.await;

    served?;
    info!("Shutdown complete");
    Ok(())
}

/// Broadcast shutdown on Ctrl-C or SIGTERM.
fn spawn_signal_task(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });
}

/// Re-read the ban list on SIGHUP.
#[cfg(unix)]
fn spawn_reload_task(bans: Arc<BanList>, shutdown_tx: &broadcast::Sender<()>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(hup) => hup,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGHUP handler; ban list reload disabled");
                return;
            }
        };
        info!("Ban list reload on SIGHUP enabled");

        loop {
            tokio::select! {
                _ = hup.recv() => {
                    match bans.reload() {
                        Ok(count) => info!(patterns = count, "Ban list reloaded on SIGHUP"),
                        Err(e) => error!(error = %e, "Ban list reload failed; keeping previous patterns"),
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_task(_bans: Arc<BanList>, _shutdown_tx: &broadcast::Sender<()>) {
    info!("Ban list reload on SIGHUP is unavailable on this platform");
}
