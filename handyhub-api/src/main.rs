use handyhub_api::{app, AppState, StateOptions};
use handyhub_core::Repositories;
use handyhub_store::{Config, DbClient, LocalObjectStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handyhub_api=debug,handyhub_core=info,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting HandyHub API on port {}", config.server.port);

    let repos = match config.database.url.as_deref() {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections).await?;
            db.migrate().await?;
            db.repositories()
        }
        None => {
            tracing::warn!("No database configured, using the in-memory store");
            Repositories::in_memory()
        }
    };

    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(RedisClient::new(url).await?)),
        None => {
            tracing::info!("No Redis configured, rate limiting disabled");
            None
        }
    };

    let objects = Arc::new(LocalObjectStore::new(
        &config.storage.root,
        config.storage.public_base_url.clone(),
    ));
    let media_root = objects.root().to_path_buf();

    let state = AppState::new(repos, objects, redis, StateOptions::from_config(&config)?);
    let app = app(state).nest_service("/media", ServeDir::new(media_root));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
