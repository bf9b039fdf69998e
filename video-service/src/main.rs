mod cdn;
mod config;
mod db;
mod error;
mod feed;
mod model;
mod rate_limit;
mod reconcile;
mod routes;
mod upload;

#[cfg(test)]
mod testing;

use std::future::IntoFuture;
use std::sync::Arc;

use auth_check::{AuthServiceResolver, SessionResolver};
use tracing_subscriber::EnvFilter;

use cdn::{BunnyClient, MediaCdn};
use config::Config;
use db::{PgVideoStore, VideoStore};
use feed::FeedCache;
use rate_limit::FixedWindowLimiter;
use routes::AppState;
use upload::UploadOrchestrator;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .pretty()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    let cdn: Arc<dyn MediaCdn> = Arc::new(BunnyClient::new(config.bunny.clone()));
    let store: Arc<dyn VideoStore> = Arc::new(PgVideoStore::new(&config.database_url));
    let sessions: Arc<dyn SessionResolver> = Arc::new(AuthServiceResolver::new(&config.auth_service_url));
    let feed_cache = Arc::new(FeedCache::new());

    let uploads = UploadOrchestrator::new(
        cdn.clone(),
        store.clone(),
        Arc::new(FixedWindowLimiter::new(config.upload_rate_limit_max, config.upload_rate_limit_window)),
        feed_cache.clone(),
        config.bunny.clone(),
    );

    let app = routes::router(
        AppState {
            uploads: Arc::new(uploads),
            store: store.clone(),
            feed_cache,
        },
        sessions,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await
        .expect("Failed to bind TCP listener");
    tracing::info!("Video service listening on {}", config.bind_address);

    let reconcile_task = reconcile::reconcile_loop(store, cdn, config.reconcile_interval, config.intent_grace);

    tokio::select! {
        _ = reconcile_task => {},
        result = axum::serve(listener, app).into_future() => {
            if let Err(err) = result {
                tracing::error!("Server error: {}", err);
            }
        }
    }
}
