use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use halftone_ratings_client::RatingsClient;
use halftone_server::config::Config;
use halftone_server::repositories::{CatalogRepository, JobRepository};
use halftone_server::routes::{health_router, jobs_router, HealthState, JobsState};
use halftone_server::services::JobService;
use halftone_server::sync::{
    recover_interrupted, ItemEnumerator, JobPubSub, JobStore, SyncScheduler,
};

/// Build the CORS layer based on configuration.
///
/// In production mode CORS requests are rejected unless `CORS_ORIGINS`
/// is set; in development an unset value means permissive CORS.
fn build_cors_layer(config: &Config) -> CorsLayer {
    let is_production = config.is_production();

    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                tracing::info!(
                    "CORS configured with {} allowed origin(s): {:?}",
                    allowed_origins.len(),
                    origins
                );
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
                    .max_age(std::time::Duration::from_secs(3600))
            }
        }
        _ if is_production => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected. Set CORS_ORIGINS to allow cross-origin requests."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "halftone_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting Halftone server on port {}", config.port);

    // Initialize database pool
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database().max_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database().connect_timeout_secs,
        ))
        .connect(&config.database().url)
        .await?;
    tracing::info!("Database connection established");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    let job_store: Arc<dyn JobStore> = Arc::new(JobRepository::new(pool.clone()));
    let catalog = Arc::new(CatalogRepository::new(pool.clone()));

    // Requeue jobs interrupted by a crash, before the loop starts.
    recover_interrupted(job_store.as_ref()).await?;

    // Ratings service client
    let ratings_config = config.ratings().clone();
    let ratings_client = RatingsClient::with_timeout(
        ratings_config.url.clone(),
        ratings_config.api_key.clone(),
        std::time::Duration::from_secs(ratings_config.timeout_secs),
    )?
    .with_max_retries(ratings_config.max_retries);

    // Job event pub/sub (Redis when available, in-memory otherwise)
    let pubsub = JobPubSub::try_with_redis(&config.redis().connection_url()).await;

    // Spawn the scheduler loop. It drains the queue on startup, so any
    // recovered jobs resume without an explicit wake.
    let scheduler = SyncScheduler::new(
        job_store.clone(),
        Arc::new(ratings_client),
        pubsub.clone(),
        config.scheduler_config(),
    )
    .spawn();
    tracing::info!("Rating sync scheduler spawned");

    let job_service = JobService::new(
        job_store,
        ItemEnumerator::new(catalog),
        scheduler,
        pubsub,
    );

    let jobs_state = JobsState::new(job_service, config.retention_days);
    let health_state = HealthState::new(pool.clone());
    let cors_layer = build_cors_layer(&config);

    // Build the router
    let app = Router::new()
        .route("/", get(root))
        // Nested health routes: /health, /health/live, /health/ready
        .nest("/health", health_router(health_state))
        // Job routes: /jobs, /jobs/:id, /jobs/:id/cancel, /jobs/:id/events, /jobs/cleanup
        .nest("/jobs", jobs_router(jobs_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Welcome to Halftone - Self-hosted Comic Library"
}
