use std::sync::Arc;

use anyhow::Context;
use story_paths::app::{build_router, AppState};
use story_paths::config::ServerConfig;
use story_paths::db::repository::{MongoStoryRepository, StoryRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "story_paths=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting story paths server...");

    let config = ServerConfig::from_env()?;

    // Connect to MongoDB
    let mongo_uri = config.mongodb_uri()?;
    let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
        .await
        .context("Failed to connect to MongoDB")?;
    let mongo_db = mongo_client.database(&config.database);
    let story_repo: Arc<dyn StoryRepository> = Arc::new(MongoStoryRepository::new(&mongo_db));

    // The URI may carry credentials, so only the database name is logged.
    tracing::info!("Connected to MongoDB database '{}'", config.database);

    let app = build_router(AppState { story_repo }, &config.allowed_origins);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!("Story paths server is running on port: {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, closing MongoDB client");
    mongo_client.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}
