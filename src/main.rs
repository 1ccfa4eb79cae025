mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{queue::JobQueue, storage::R2Client};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing tryon-studio API server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("tryon_jobs_total", "Total try-on jobs submitted");
    metrics::describe_counter!("tryon_jobs_completed", "Total try-on jobs completed");
    metrics::describe_counter!("tryon_jobs_failed", "Total try-on jobs that failed");
    metrics::describe_counter!("credits_reserved_total", "Credits placed on hold");
    metrics::describe_counter!("credits_committed_total", "Reservations committed");
    metrics::describe_counter!("credits_rolled_back_total", "Reservations rolled back");
    metrics::describe_histogram!(
        "generation_seconds",
        "Time spent in upstream image generation per job"
    );
    metrics::describe_gauge!(
        "tryon_queue_depth",
        "Current number of pending jobs in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize R2 storage client
    tracing::info!("Initializing R2 storage client");
    let r2_client = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        &config.asset_public_base_url,
    )
    .expect("Failed to initialize R2 client");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Create shared application state
    let state = AppState::new(db_pool, r2_client, queue);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/tryon", post(routes::tryon::submit_tryon))
        .route("/api/v1/tryon/{job_id}", get(routes::tryon::get_job_status))
        .route(
            "/api/v1/tryon/{job_id}/remix",
            post(routes::tryon::submit_remix),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(25 * 1024 * 1024)); // 25 MB: person + garments

    tracing::info!("Starting tryon-studio on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
