#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # ptyd
//!
//! A PTY session engine exposed over HTTP, WebSocket, and SSE: spawns and
//! multiplexes interactive shell/agent sessions, classifies their output into
//! typed events, and tracks foreground-process identity — all protected by a
//! pre-shared API key.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ptyd::{activity::ActivityLog, auth::ApiKey, config::Config, routes, sessions, state::AppState, ws};

/// A PTY session engine exposed over HTTP, WebSocket, and SSE.
#[derive(Parser)]
#[command(name = "ptyd", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    run_server(cli.config.as_deref()).await;
}

/// ptyd terminates no TLS of its own. A non-loopback `listen` address must
/// sit behind a TLS-terminating reverse proxy; refuse to start otherwise.
/// `PTYD_ALLOW_INSECURE_REMOTE=1` overrides this for setups where the proxy
/// already lives on the same host.
fn refuse_insecure_remote_bind(listen: &str) {
    let is_loopback = listen
        .parse::<std::net::SocketAddr>()
        .map(|addr| addr.ip().is_loopback())
        .unwrap_or(false);

    if is_loopback {
        return;
    }

    let overridden = std::env::var("PTYD_ALLOW_INSECURE_REMOTE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if overridden {
        warn!("listening on non-loopback address {listen} with no TLS of its own (PTYD_ALLOW_INSECURE_REMOTE set) — put a TLS-terminating proxy in front of this");
        return;
    }

    panic!(
        "refusing to bind non-loopback address {listen}: ptyd does not terminate TLS itself. \
         Put it behind a TLS-terminating reverse proxy, bind to loopback instead, or set \
         PTYD_ALLOW_INSECURE_REMOTE=1 to override."
    );
}

#[allow(clippy::too_many_lines)]
async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("ptyd v{} starting", env!("CARGO_PKG_VERSION"));
    info!("listening on {}", config.server.listen);

    if config.auth.api_key == "change-me" {
        warn!("using default API key — set PTYD_API_KEY or update config");
    }

    let session_manager = sessions::SessionManager::new(
        config.server.max_sessions,
        config.server.session_buffer_size_kib * 1024,
        Duration::from_millis(config.server.close_grace_ms),
        Duration::from_millis(config.server.idle_flush_ms),
    );

    let (session_events, _) = broadcast::channel(256);
    let activity_log = Arc::new(ActivityLog::new(200, session_events.clone()));

    let state = AppState {
        config: Arc::new(config),
        start_time: Instant::now(),
        session_manager,
        session_events,
        activity_log,
        sse_connections: Arc::new(AtomicU32::new(0)),
    };

    let public_routes = Router::new().route("/api/health", get(routes::health::health));

    let authed_routes = Router::new()
        .route(
            "/api/sessions",
            get(routes::sessions::list_sessions).post(routes::sessions::create_session),
        )
        .route(
            "/api/sessions/{id}",
            delete(routes::sessions::close_session),
        )
        .route(
            "/api/sessions/{id}/write",
            post(routes::sessions::write_session),
        )
        .route(
            "/api/sessions/{id}/resize",
            post(routes::sessions::resize_session),
        )
        .route(
            "/api/sessions/{id}/pause",
            post(routes::sessions::pause_session),
        )
        .route(
            "/api/sessions/{id}/resume",
            post(routes::sessions::resume_session),
        )
        .route(
            "/api/sessions/{id}/signal",
            post(routes::sessions::signal_session),
        )
        .route(
            "/api/sessions/{id}/foreground",
            get(routes::sessions::foreground_session),
        )
        .route(
            "/api/sessions/{id}/snapshot",
            get(routes::sessions::snapshot_session),
        )
        .route("/api/shells", get(routes::shells::list_shells))
        .route("/api/events", get(routes::events::event_stream))
        .layer(middleware::from_fn(ptyd::auth::require_api_key));

    let ws_route = Router::new().route("/api/ws", get(ws::ws_upgrade));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ]);

    let app = Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .merge(ws_route)
        .layer(Extension(ApiKey(state.config.auth.api_key.clone())))
        .with_state(state.clone());

    let app = app.layer(cors).layer(TraceLayer::new_for_http());

    refuse_insecure_remote_bind(&state.config.server.listen);

    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .expect("failed to bind");

    info!("server ready");

    // Periodic sweep: reap exited sessions, refresh foreground-process names.
    let mgr = state.session_manager.clone();
    let sweep_tx = state.session_events.clone();
    let poll_interval = state.config.process_inspector.poll_interval_ms;
    let sweep_task = tokio::spawn(async move {
        let mut sweep_interval = tokio::time::interval(Duration::from_secs(5));
        let mut foreground_interval = tokio::time::interval(Duration::from_millis(poll_interval));
        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    let events = mgr.sweep().await;
                    for sessions::SweepEvent::Reaped(session_id, code) in events {
                        let _ = sweep_tx.send(serde_json::json!({
                            "type": "session.exited",
                            "session_id": session_id,
                            "exit_code": code,
                        }));
                    }
                }
                _ = foreground_interval.tick() => {
                    mgr.refresh_foreground().await;
                }
            }
        }
    });

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("server error");

    info!("shutting down...");
    sweep_task.abort();
    state.session_manager.kill_all().await;
    info!("goodbye");
}
