//! Autorun server
//!
//! REST + SSE front end for the batch orchestrator.

mod config;
mod routes;
mod state;

use std::net::SocketAddr;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "autorun_server=debug,batch_runner=debug,git_worktree=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(
        "Using data directory {:?} with agent {}",
        config.data_dir,
        config.agent_type.as_str()
    );

    let port = config.port;
    let enable_cors = config.enable_cors;
    let app_state = AppState::new(config);
    let orchestrator = app_state.orchestrator().clone();

    let mut app = Router::new()
        .merge(routes::health::router())
        .merge(routes::sessions::router())
        .merge(routes::batch::router())
        .with_state(app_state);

    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    let app = app.layer(TraceLayer::new_for_http());

    // Bind to 0.0.0.0 for localhost/127.0.0.1 compatibility
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Autorun API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
        .expect("Server error");

    orchestrator.shutdown().await;
}
