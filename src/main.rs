use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use itook_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_redis_client, CacheWriterHandle, RedisResultCache},
    governor::{Clock, Governor, InMemoryResultCache, ResultCache, TokioClock},
    services::GeminiProvider,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "itook_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let policy = config.governor_policy()?;

    let provider = GeminiProvider::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
        config.gemini_model.clone(),
        config.gemini_stream,
        config.gemini_timeout(),
    )?;

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);

    let (cache, writer_handle): (Arc<dyn ResultCache>, Option<CacheWriterHandle>) =
        match &config.redis_url {
            Some(redis_url) => {
                let client = create_redis_client(redis_url)?;
                let (cache, handle) = RedisResultCache::new(client);
                (Arc::new(cache) as Arc<dyn ResultCache>, Some(handle))
            }
            None => (
                Arc::new(InMemoryResultCache::with_max_entries(
                    clock.clone(),
                    config.cache_max_entries,
                )),
                None,
            ),
        };

    let governor = Governor::new(Arc::new(provider), cache, clock, policy);
    let app = create_router(AppState::new(governor));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, model = %config.gemini_model, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = writer_handle {
        handle.shutdown().await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
