//! IVR navigator server binary.
//!
//! Loads and validates the menu, then serves the HTTP API and caller
//! WebSocket sessions with structured logging and graceful shutdown on
//! SIGTERM/SIGINT.

use ivr_dialogue::NavigationEngine;
use ivr_menu::MenuTree;
use ivr_observe::MetricsCollector;
use ivr_server::{app, config, AppState};
use ivr_voice::VoiceService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("IVR_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration: the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // A menu that fails validation is fatal.
    let tree = match &config.menu.path {
        Some(path) => MenuTree::from_path(path),
        None => ivr_menu::bundled(),
    }
    .expect("failed to load menu definition, check menu.path in config");

    tracing::info!(
        version = tree.version(),
        nodes = tree.nodes().count(),
        source = config.menu.path.as_deref().unwrap_or("<bundled>"),
        "menu loaded"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let engine = NavigationEngine::new(
        Arc::new(tree),
        config.dialogue.engine.clone(),
        metrics.clone(),
    )
    .expect("failed to build navigation engine");

    let voice = VoiceService::new(config.livekit.clone());
    if voice.is_enabled() {
        tracing::info!(url = voice.public_url(), "livekit voice transport enabled");
    } else {
        tracing::info!("livekit not configured, voice join disabled");
    }

    let shutdown = CancellationToken::new();
    let state = AppState {
        engine: Arc::new(engine),
        scheduler: config.dialogue.scheduler.clone(),
        voice: Arc::new(voice),
        shutdown: shutdown.clone(),
    };

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting ivr navigator server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("server error");

    metrics.log_summary("shutdown");
    tracing::info!("ivr navigator server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal, then cancels every
/// running session.
async fn shutdown_signal(sessions: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }

    sessions.cancel();
}
