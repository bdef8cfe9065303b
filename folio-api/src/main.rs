//! Folio Real-Time API Server
//!
//! Serves the `/ws` market data channel and the HTTP endpoints the rest of
//! the application uses to inspect it and push notifications through it.

mod config;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, Method},
    Router,
};
use folio_services::{
    BroadcasterConfig, ConnectionRegistry, MarketBroadcaster, SimulatedMarketFeed,
    WebSocketState,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ServerConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ws_state: Arc<WebSocketState>,
    pub broadcaster: Arc<MarketBroadcaster>,
}

impl AppState {
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.ws_state.registry
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,folio_api=debug,folio_services=debug")
        }))
        .init();

    info!("Starting Folio real-time API");

    let config = ServerConfig::from_env()?;
    info!(
        "Configuration loaded: port {}, tick every {}ms, outbound buffer {}",
        config.port,
        config.tick_interval.as_millis(),
        config.outbound_buffer
    );

    let registry = Arc::new(ConnectionRegistry::new());
    let ws_state = Arc::new(
        WebSocketState::new(Arc::clone(&registry)).with_outbound_buffer(config.outbound_buffer),
    );

    let broadcaster = Arc::new(MarketBroadcaster::new(
        Arc::new(SimulatedMarketFeed::new()),
        registry,
        BroadcasterConfig {
            tick_interval: config.tick_interval,
        },
    ));

    let shutdown = CancellationToken::new();
    let broadcaster_handle = Arc::clone(&broadcaster).spawn(shutdown.clone());

    let state = AppState {
        ws_state,
        broadcaster,
    };
    let app = build_router(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Covers the server exiting on its own as well as the signal path
    shutdown.cancel();
    if let Err(e) = broadcaster_handle.await {
        error!("Market broadcaster task failed: {}", e);
    }

    info!("Folio real-time API stopped");
    Ok(())
}

/// Build the router with CORS and request tracing
fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let origin = match &config.cors_allow_origin {
        Some(origin) => AllowOrigin::exact(origin.clone()),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Resolve on Ctrl+C or SIGTERM and cancel `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
        () = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    test_state_with_source(Arc::new(SimulatedMarketFeed::new()))
}

#[cfg(test)]
pub(crate) fn test_state_with_source(
    source: Arc<dyn folio_services::MarketDataSource>,
) -> AppState {
    let registry = Arc::new(ConnectionRegistry::new());
    AppState {
        ws_state: Arc::new(WebSocketState::new(Arc::clone(&registry))),
        broadcaster: Arc::new(MarketBroadcaster::new(
            source,
            registry,
            BroadcasterConfig::default(),
        )),
    }
}
