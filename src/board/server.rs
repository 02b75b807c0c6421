use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::db::{BoardDb, DbHandle};
use super::ws;
use crate::config::RoadmapToml;

/// Configuration for the board server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl From<&RoadmapToml> for ServerConfig {
    fn from(config: &RoadmapToml) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            dev_mode: config.server.dev_mode,
        }
    }
}

/// Build the full application router with API and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Open the configured database, creating its directory if needed.
pub fn open_database(config: &RoadmapToml) -> Result<BoardDb> {
    let db_path = &config.storage.db_path;
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = BoardDb::open_with_timeout(db_path, config.storage.busy_timeout())
        .with_context(|| format!("Failed to open board database at {}", db_path.display()))?;
    Ok(db.with_merge_policy(config.merge))
}

/// Start the board server and run until Ctrl+C.
pub async fn start_server(config: &RoadmapToml) -> Result<()> {
    let server = ServerConfig::from(config);
    let db = open_database(config)?;
    let (ws_tx, _rx) = broadcast::channel::<String>(256);

    let state = Arc::new(AppState {
        db: DbHandle::with_retry(db, config.storage.retry_policy()),
        ws_tx,
    });

    let mut app = build_router(state);
    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        %local_addr,
        db_path = %config.storage.db_path.display(),
        dev_mode = server.dev_mode,
        "roadmap board server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; shutting down");
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let db = BoardDb::new_in_memory().unwrap();
        let (ws_tx, _) = broadcast::channel(16);
        let state = Arc::new(AppState {
            db: DbHandle::new(db),
            ws_tx,
        });
        build_router(state)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = test_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = test_router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let req = Request::builder()
            .uri("/some/client/route")
            .body(Body::empty())
            .unwrap();
        let resp = test_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_create_project_via_full_router() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/projects")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({"name": "server-test"}).to_string()))
            .unwrap();
        let resp = test_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let project: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(project["name"], "server-test");
    }

    #[test]
    fn test_server_config_from_toml() {
        let mut toml = RoadmapToml::default();
        toml.server.port = 4000;
        toml.server.dev_mode = true;
        let config = ServerConfig::from(&toml);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert!(config.dev_mode);
    }

    #[test]
    fn test_open_database_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut toml = RoadmapToml::default();
        toml.storage.db_path = dir.path().join("nested/dir/roadmap.db");
        toml.merge.allow_duplicate_target = true;
        let db = open_database(&toml).unwrap();
        assert!(toml.storage.db_path.exists());
        assert!(db.merge_policy().allow_duplicate_target);
    }
}
