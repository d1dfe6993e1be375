//! IVR navigator server library logic.

pub mod api;
pub mod api_ws;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use ivr_dialogue::{NavigationEngine, SchedulerConfig};
use ivr_voice::VoiceService;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Maximum accepted HTTP request body (64 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Menu tree, resolver, guard and formatter shared by every session.
    pub engine: Arc<NavigationEngine>,
    /// Turn timing applied to each new session.
    pub scheduler: SchedulerConfig,
    /// LiveKit room and token management.
    pub voice: Arc<VoiceService>,
    /// Cancelled on shutdown. Each session runs under a child token.
    pub shutdown: CancellationToken,
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/menu", get(api::get_menu_handler))
        .route("/api/resolve", post(api::resolve_handler))
        .route("/api/metrics", get(api::get_metrics_handler))
        .route("/api/voice/join", post(api::join_voice_handler))
        .route("/ws/session", get(api_ws::ws_session_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
