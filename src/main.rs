use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use partyreel::{
    api,
    auth::AuthConfig,
    config::ServerConfig,
    state::{spawn_reel_ticker, AppState},
    store::{GameStore, LocalStore},
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "partyreel=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting partyreel...");

    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();

    let store: Arc<dyn GameStore> = match &config.data_file {
        Some(path) => match LocalStore::open(path).await {
            Ok(store) => {
                tracing::info!("Using data file {}", path.display());
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!("Failed to open data file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATA_FILE is empty, game data lives in memory only");
            Arc::new(LocalStore::in_memory())
        }
    };

    let state = Arc::new(AppState::new(store, config.game.clone(), auth));
    let ticker = spawn_reel_ticker(state.clone());

    let app = api::router(state, &config.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    ticker.stop();
    tracing::info!("Shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
