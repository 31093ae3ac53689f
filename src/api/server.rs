//! HTTP server for the Learou web interface

use super::gate::HeaderIdentity;
use super::handlers::{features_handler, home_handler, kind_router};
use super::notices::NoticeBoard;
use super::render::{JsonRenderer, Renderer};
use super::session::session_middleware;
use crate::crud::Controllers;
use crate::error::Result;
use crate::registry::Registry;
use crate::storage::Repository;
use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
    /// Header carrying the authenticated user name
    pub user_header: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 8000).into(),
            user_header: super::gate::DEFAULT_USER_HEADER.to_string(),
        }
    }
}

/// Shared request state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub controllers: Arc<Controllers>,
    pub repo: Arc<dyn Repository>,
    pub identity: Arc<HeaderIdentity>,
    pub renderer: Arc<dyn Renderer>,
    pub notices: NoticeBoard,
    pub instance_id: String,
}

impl AppState {
    /// Bind controllers for every registered kind
    ///
    /// Fails with a configuration error before any request is served.
    pub fn new(
        registry: Arc<Registry>,
        repo: Arc<dyn Repository>,
        identity: HeaderIdentity,
    ) -> Result<Self> {
        let controllers = Controllers::from_registry(registry.clone(), repo.clone())?;
        Ok(Self {
            registry,
            controllers: Arc::new(controllers),
            repo,
            identity: Arc::new(identity),
            renderer: Arc::new(JsonRenderer),
            notices: NoticeBoard::new(),
            instance_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
        })
    }
}

/// Build router
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(home_handler))
        .route("/features", get(features_handler))
        .route("/health", get(health_handler));

    for controller in state.controllers.iter() {
        debug!("Mounting routes for {}", controller.kind().slug);
        router = router.merge(kind_router(&state, controller.clone()));
    }

    router
        .with_state(state)
        .layer(middleware::from_fn(session_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create new API server
    pub fn new(
        config: ApiServerConfig,
        registry: Arc<Registry>,
        repo: Arc<dyn Repository>,
    ) -> Result<Self> {
        let identity = HeaderIdentity::new(&config.user_header)?;
        let state = AppState::new(registry, repo, identity)?;
        Ok(Self { config, state })
    }

    /// Get instance ID
    pub fn instance_id(&self) -> &str {
        &self.state.instance_id
    }

    /// Start serving with dynamic port allocation
    ///
    /// Tries the configured address first, then attempts alternative ports
    /// if the primary port is unavailable. Stops on ctrl-c.
    pub async fn serve(self) -> anyhow::Result<()> {
        let router = build_router(self.state.clone());

        let base_port = self.config.addr.port();
        for offset in 0..=10u16 {
            let addr = SocketAddr::new(self.config.addr.ip(), base_port.saturating_add(offset));

            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!(
                        "Learou server [{}] listening on http://{}",
                        self.state.instance_id, addr
                    );
                    axum::serve(listener, router)
                        .with_graceful_shutdown(shutdown_signal())
                        .await?;
                    info!("Learou server stopped");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    debug!("Port {} in use, trying alternative ports...", addr.port());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow::anyhow!(
            "All ports ({}-{}) are in use. Pass --addr to pick another address.",
            base_port,
            base_port.saturating_add(10)
        ))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance_id: String,
    pub kinds: usize,
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    // One cheap query proves the store is reachable
    if let Some(kind) = state.registry.kinds().next() {
        state.repo.count(kind).await?;
    }
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.clone(),
        kinds: state.registry.len(),
    }))
}
