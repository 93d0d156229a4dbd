use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use newsletter_recs::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache, MemoryStore, PgStore},
    routes::create_router,
    services::{Engine, Stores},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let stores = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            tracing::info!("Using PostgreSQL stores");
            Stores::shared(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            Stores::shared(MemoryStore::new())
        }
    };

    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url)?;
            let (cache, writer) = Cache::new(client, config.store_timeout()).await;
            (Some(cache), Some(writer))
        }
        None => (None, None),
    };

    let engine = Engine::new(stores, cache, &config);
    let jobs = engine.spawn_background_jobs(
        Duration::from_secs(config.retrain_interval_secs),
        Duration::from_secs(config.insights_interval_secs),
    );

    let app = create_router(AppState::new(engine));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for job in jobs {
        job.abort();
    }
    if let Some(writer) = cache_writer {
        writer.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
