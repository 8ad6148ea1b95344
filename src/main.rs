use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tera::Tera;
use tokio::net::TcpListener;

use confhub::api;
use confhub::build_router;
use confhub::config::AppConfig;
use confhub::handler::logging::init_logging;
use confhub::services::naboopay::{NabooPayClient, PaymentGateway};
use confhub::views::register_filters;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Initialize tracing
    init_logging(config.log_level);

    // Initialize health check
    api::health::init_health_check();

    // Database
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let gateway: Arc<dyn PaymentGateway> = Arc::new(NabooPayClient::new(&config.naboopay)?);

    let mut tera = Tera::new(&config.templates_glob()).context("failed to load templates")?;
    register_filters(&mut tera);

    let bind_addr = config.bind_addr.clone();
    let app = build_router(pool, Arc::new(config), tera, gateway);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("confhub server starting on http://{}", bind_addr);
    tracing::info!("  • Health: /api/health, /api/health/ready, /api/health/live");
    tracing::info!("  • Site: /, /schedule, /speakers, /exhibitors, /tickets, /blog");
    tracing::info!("  • Desk: /checkin   Back-office: /admin");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
