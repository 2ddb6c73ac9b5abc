use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod routes;
mod utils;
mod weather;

use config::Config;
use routes::{create_router, AppState};
use weather::{aggregate::Aggregator, cache::CacheStore, openweather::OpenWeatherClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_aggregator_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let weather_client = Arc::new(OpenWeatherClient::new(config.clone())?);

    let cache = CacheStore::from_config(&config);
    tracing::info!(
        "Caching responses in {} for {}s",
        cache.dir().display(),
        cache.ttl().as_secs()
    );
    let aggregator = Arc::new(Aggregator::new(weather_client.clone(), cache));

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        aggregator,
        weather_client,
    };

    let app: Router = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
