use std::net::SocketAddr;

use satring::{
    api::create_router,
    api::middleware::init_tracing,
    config::{Config, TEST_MODE_KEY},
    db::{create_pool, run_migrations, seed_categories},
    services::{DomainVerifier, PaymentsClient},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    tracing::info!("Starting satring v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Refuse to run without an explicit root key. Operators must set a real
    // key for production or "test-mode" to disable payment gates.
    if config.auth.root_key.is_empty() {
        anyhow::bail!(
            "AUTH_ROOT_KEY is not set. Set it to a secure random key for production, \
             or 'test-mode' to explicitly disable payment gates for development."
        );
    }
    if config.auth.root_key == TEST_MODE_KEY {
        tracing::warn!("AUTH_ROOT_KEY is 'test-mode' — payment gates are bypassed.");
    }

    tracing::info!("Configuration loaded successfully");

    // Create database connection pool and apply schema
    let db_pool = create_pool(&config.database).await?;
    run_migrations(&db_pool).await?;
    seed_categories(&db_pool).await?;

    // Outbound clients
    let payments = PaymentsClient::new(&config.payments);
    let domain_verifier = DomainVerifier::new();

    // Create application state and router
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, db_pool, payments, domain_verifier);
    let app = create_router(state);

    tracing::info!("Server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
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
