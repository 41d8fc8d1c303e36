//! Office Docs Server
//!
//! JSON-RPC document conversion service backed by an OpenOffice/LibreOffice
//! compatible engine, with chunked uploads spooled on local disk.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use office_docs_server::config::Config;
use office_docs_server::connection::RetryPolicy;
use office_docs_server::service::OfficeService;
use office_docs_server::spool::Spool;
use office_docs_server::state::AppState;
use office_docs_server::{auth, engine, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "office_docs_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    // Refuse to start on bad settings; defaults would silently disable auth
    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting Office Docs Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Spool directory: {}", config.spool.dir.display());
    tracing::info!("Engine: {:?} at {}", config.engine.kind, config.engine.base_url());

    let spool = Spool::new(config.spool.dir.clone());
    spool
        .ensure_dir()
        .await
        .with_context(|| format!("Failed to create spool directory {}", config.spool.dir.display()))?;

    let connector = engine::connector_from_config(&config.engine)
        .context("Failed to initialize engine connector")?;
    let policy = RetryPolicy {
        attempts: config.engine.connect_attempts,
        delay: config.engine.retry_delay(),
    };
    let service = OfficeService::new(spool, auth::from_config(&config.auth), connector, policy).await;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid SERVER_HOST/SERVER_PORT")?;
    let app_state = AppState::new(config, service);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::app(app_state).layer(cors);

    // Start server with graceful shutdown
    tracing::info!("Office Docs Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
