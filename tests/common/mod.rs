use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use serde_json::json;

/// In-process stand-in for the platform's API/frontend, bound to an
/// unused port for isolation.
pub struct StubPlatform {
    pub base_url: String,
}

pub async fn spawn_stub() -> Result<StubPlatform> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;

    let app = axum::Router::new()
        .route("/", get(|| async { "plataforma" }))
        .route(
            "/health",
            get(|| async { Json(json!({"status": "ok", "database": "ok"})) }),
        )
        .route(
            "/degraded",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance") }),
        )
        .route(
            "/api/cache/clear",
            post(|| async { Json(json!({"cleared": 12})) }),
        );

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind stub listener")?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });

    let stub = StubPlatform {
        base_url: format!("http://127.0.0.1:{}", port),
    };
    stub.wait_ready(Duration::from_secs(5)).await?;
    Ok(stub)
}

impl StubPlatform {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = client.get(self.url("/health")).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("stub did not become ready on {} within {:?}", self.base_url, timeout)
    }
}
