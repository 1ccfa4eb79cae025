use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use tryon_studio::{
    config::AppConfig,
    db::{self, balances::PgBalanceStore, jobs::PgJobStore},
    services::{
        generation::GenerationClient,
        ledger::CreditLedger,
        orchestrator::JobOrchestrator,
        queue::{JobQueue, QueuedJob},
        retry::RetryPolicy,
        storage::R2Client,
        synthesis::GeminiClient,
    },
};

/// Infrastructure-level requeues per queue entry. Business failures are
/// terminal on the job itself and never come back here.
const MAX_REQUEUE_ATTEMPTS: u32 = 3;
const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting try-on generation worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let r2_client = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        &config.asset_public_base_url,
    )
    .expect("Failed to initialize R2 client");

    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let synthesizer = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone());
    let generation = GenerationClient::new(
        Arc::new(synthesizer),
        RetryPolicy::rate_limit_default(),
        Duration::from_secs(config.generation_timeout_secs),
    );

    let ledger = CreditLedger::new(Arc::new(PgBalanceStore::new(db_pool.clone())));

    let orchestrator = JobOrchestrator::new(
        Arc::new(PgJobStore::new(db_pool.clone())),
        ledger,
        generation,
        Arc::new(r2_client),
        config.generation_cost_credits,
    );

    tracing::info!("Worker ready, starting job processing loop");

    // Main processing loop
    loop {
        match process_next_job(&queue, &orchestrator).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error touching the queue, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(
    queue: &JobQueue,
    orchestrator: &JobOrchestrator,
) -> Result<bool, Box<dyn std::error::Error>> {
    let entry: QueuedJob = match queue.dequeue().await? {
        Some(j) => j,
        None => return Ok(false), // No job available
    };

    tracing::info!(
        job_id = %entry.job_id,
        tenant_id = %entry.tenant_id,
        attempts = entry.attempts,
        "Picked up try-on job"
    );

    match orchestrator.run(entry.job_id).await {
        Ok(job) => {
            queue.complete(&entry).await?;
            tracing::info!(
                job_id = %job.id,
                status = %job.status,
                "Job reached terminal state"
            );
        }
        Err(e) => {
            // The job could not be finalized (store or ledger unreachable);
            // the queue entry is retried a bounded number of times.
            tracing::error!(job_id = %entry.job_id, error = %e, "Job processing errored");

            if entry.attempts + 1 >= MAX_REQUEUE_ATTEMPTS {
                queue.complete(&entry).await?;
                tracing::error!(
                    job_id = %entry.job_id,
                    attempts = entry.attempts + 1,
                    "Dropping queue entry after repeated infrastructure errors"
                );
            } else {
                queue.requeue(&entry).await?;
                tracing::info!(
                    job_id = %entry.job_id,
                    attempts = entry.attempts + 1,
                    "Queue entry re-queued"
                );
            }
        }
    }

    Ok(true)
}
