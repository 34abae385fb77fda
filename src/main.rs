use std::sync::Arc;

use actix_web::{App, HttpServer};
use anyhow::Context;
use fiscalpay::config::{Config, LogFormat};
use fiscalpay::fiscal::FiscalSweeper;
use fiscalpay::middleware::RequestId;
use fiscalpay::startup::{build_adapters, configure_app, AppState, Stores};
use fiscalpay::storage::InMemoryStore;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fiscalpay=debug,actix_web=info".into());
    match config.app.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    config.validate().context("Configuration validation failed")?;

    tracing::info!(
        env = %config.app.env,
        fiscal = %config.fiscal.environment,
        bind = %config.server.bind_address(),
        "Starting fiscalpay"
    );

    let stores = match &config.database.url {
        Some(url) => {
            let pool = config
                .database
                .create_pool(url)
                .await
                .context("Failed to create database pool")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;

            tracing::info!(
                max_connections = config.database.max_connections,
                "Database pool initialized"
            );
            Stores::mysql(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Stores::in_memory(Arc::new(InMemoryStore::new()))
        }
    };

    let (fiscal_gateway, payment_gateways) =
        build_adapters(&config).context("Failed to build adapters")?;
    let state = AppState::new(stores, fiscal_gateway, payment_gateways);

    if let Some(period) = config.fiscal.sweep_interval {
        let sweeper = Arc::new(FiscalSweeper::new(
            state.fiscal.clone(),
            state.stores.invoices.clone(),
            period,
        ));
        tokio::spawn(sweeper.start());
    }

    // Start HTTP server
    let bind_address = config.server.bind_address();
    let server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(RequestId)
            .wrap(TracingLogger::default())
            .configure(move |cfg| configure_app(cfg, &state))
    })
    .workers(config.server.workers)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await?;
    Ok(())
}
