//! In-process gateway instances for integration testing.

use axum::Router;
use loginurl_gate::{App, Config};
use std::net::SocketAddr;
use std::sync::Arc;

/// Serve `router` on an ephemeral local port.
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// HTTP client that never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// A running gateway: public listener plus, when available, the API listener.
pub struct TestGateway {
    pub app: Arc<App>,
    pub public: SocketAddr,
    pub api: Option<SocketAddr>,
}

impl TestGateway {
    /// Spawn a gateway around an already built [`App`].
    pub async fn spawn(app: App) -> Self {
        let public = spawn_router(app.public_router()).await;
        let api = match app.api_router() {
            Some(router) => Some(spawn_router(router).await),
            None => None,
        };
        Self {
            app: Arc::new(app),
            public,
            api,
        }
    }

    /// Build from TOML text and spawn.
    pub async fn from_toml(toml: &str) -> Self {
        let config = Config::from_toml(toml).unwrap();
        Self::spawn(App::build(&config).unwrap()).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.public, path)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}{}", self.api.expect("API listener not running"), path)
    }

    /// GET `path` as client `ip`.
    pub async fn get_as(&self, ip: &str, path: &str) -> reqwest::Response {
        client()
            .get(self.url(path))
            .header("x-real-ip", ip)
            .send()
            .await
            .unwrap()
    }
}

/// Minimal config text for a gateway with the given extra sections.
#[allow(dead_code)]
pub fn config_text(ban_list: &std::path::Path, extra: &str) -> String {
    format!(
        r#"
[server]
address = "127.0.0.1:0"
app_name = "TestGate"

[reputation]
ban_list_path = "{}"

[session]
secret = "integration-test-secret-0123456789"

[[merchant]]
name = "shop"
api_key = "shop-key"

{}
"#,
        ban_list.display(),
        extra
    )
}
