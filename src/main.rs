//! Circulation Server - campus library loans, inventory and fines
//!
//! REST API front of the circulation core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use circulation_server::{
    api,
    config::{AppConfig, DatabaseConfig, LoggingConfig, StorageBackend},
    repository::{memory::Seed, CirculationStore, MemoryStore, PgStore, Repository},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Circulation Server v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config.database).await?;
    let repository = Repository::new(store, config.circulation.store_timeout());
    let services = Services::new(repository, &config.circulation);

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("circulation_server={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn open_store(database: &DatabaseConfig) -> anyhow::Result<Arc<dyn CirculationStore>> {
    match database.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .min_connections(database.min_connections)
                .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
                .connect(&database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Database migrations completed");
            Ok(Arc::new(PgStore::new(pool)))
        }
        StorageBackend::Memory => {
            let store = MemoryStore::new();
            if let Some(path) = &database.seed_file {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read seed file {}", path))?;
                let seed: Seed = serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid seed file {}", path))?;
                store.seed(seed).await?;
            } else {
                tracing::warn!("Memory store started empty");
            }
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
