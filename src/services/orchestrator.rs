//! Job orchestrator: drives one try-on job from pickup to a terminal state.
//!
//! Step order is fixed: validate, reserve credits, resolve scenario, fetch
//! inputs, generate, persist the asset, commit the reservation. Any failure
//! short-circuits to FAILED, and when a reservation is held the rollback is
//! issued before the FAILED status is persisted. The reservation id lives in
//! this call's own scope and is never re-derived from stored context.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::job::{ErrorDetail, InvalidTransition, JobKind, JobStatus, ReasonCode, TryOnJob};
use crate::models::scenario::ScenarioProfile;
use crate::services::generation::{GenerationClient, GenerationError};
use crate::services::ledger::{CreditLedger, LedgerError};
use crate::services::scenario;
use crate::services::storage::{BlobStore, StorageError};
use crate::services::synthesis::{InputImage, SynthesisRequest};

#[derive(Debug, thiserror::Error)]
#[error("job store failure: {0}")]
pub struct JobStoreError(pub String);

/// Document-store seam for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: Uuid) -> Result<Option<TryOnJob>, JobStoreError>;
    async fn put(&self, job: &TryOnJob) -> Result<(), JobStoreError>;
}

/// Business failure of a pipeline step; maps onto the job's reason code.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("asset storage failed: {0}")]
    Asset(#[from] StorageError),

    #[error(transparent)]
    JobPersistence(#[from] JobStoreError),
}

impl PipelineError {
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            PipelineError::Validation(_) => ReasonCode::ValidationError,
            PipelineError::Ledger(e) if e.is_insufficient_funds() => ReasonCode::InsufficientFunds,
            PipelineError::Ledger(_) => ReasonCode::PersistenceError,
            PipelineError::Generation(_) => ReasonCode::GenerationFailed,
            PipelineError::Asset(_) => ReasonCode::PersistenceError,
            PipelineError::JobPersistence(_) => ReasonCode::PersistenceError,
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail::new(self.reason_code(), self.to_string())
    }
}

/// Infrastructure failure that prevented the job from reaching a terminal
/// state; the worker re-queues these a bounded number of times.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error("ledger unavailable during failure handling: {0}")]
    LedgerUnavailable(LedgerError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

pub struct JobOrchestrator {
    jobs: Arc<dyn JobStore>,
    ledger: CreditLedger,
    generation: GenerationClient,
    assets: Arc<dyn BlobStore>,
    cost_per_generation: i64,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ledger: CreditLedger,
        generation: GenerationClient,
        assets: Arc<dyn BlobStore>,
        cost_per_generation: i64,
    ) -> Self {
        Self {
            jobs,
            ledger,
            generation,
            assets,
            cost_per_generation,
        }
    }

    /// Drive one dequeued job to a terminal state. Errors mean the job could
    /// not be finalized (store unreachable) and the queue entry should be
    /// retried; business failures come back as a FAILED job, not an error.
    pub async fn run(&self, job_id: Uuid) -> Result<TryOnJob, OrchestratorError> {
        let mut job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound(job_id))?;

        match job.status {
            JobStatus::Pending => {}
            JobStatus::Processing => {
                // Re-delivered after a crash or failed finalization mid-run.
                // The queue is single-delivery, so this entry is ours: finish
                // the FAILED transition it was owed, rollback included.
                tracing::warn!(%job_id, "resuming interrupted job, failing it");
                return self
                    .resolve_failure(
                        job,
                        ErrorDetail::new(
                            ReasonCode::PersistenceError,
                            "processing was interrupted before completion",
                        ),
                    )
                    .await;
            }
            JobStatus::Completed | JobStatus::Failed => {
                tracing::warn!(%job_id, status = %job.status, "job already terminal, skipping");
                return Ok(job);
            }
        }

        job.begin_processing(Utc::now())?;
        self.jobs.put(&job).await?;
        tracing::info!(
            %job_id,
            tenant_id = %job.tenant_id,
            kind = %job.kind,
            "processing try-on job"
        );

        match self.execute(&mut job).await {
            Ok(asset_url) => {
                job.complete(asset_url, Utc::now())?;
                self.jobs.put(&job).await?;
                metrics::counter!("tryon_jobs_completed").increment(1);
                tracing::info!(%job_id, "job completed");
                Ok(job)
            }
            Err(err) => {
                tracing::warn!(%job_id, error = %err, "job failed");
                self.resolve_failure(job, err.detail()).await
            }
        }
    }

    /// The sequenced pipeline. Returns the public URL of the stored asset.
    async fn execute(&self, job: &mut TryOnJob) -> Result<String, PipelineError> {
        validate_inputs(job)?;

        // Funds are secured before any generation compute is spent.
        let reservation = self
            .ledger
            .reserve(&job.tenant_id, Some(&job.customer_id), self.cost_per_generation)
            .await?;
        job.reservation_id = Some(reservation.id);
        self.jobs.put(job).await?;

        let profile = match job.kind {
            JobKind::Fresh => scenario::resolve(&job.product_tags),
            JobKind::Remix => {
                scenario::resolve_random_within(scenario::resolve(&job.product_tags).category)
            }
        };

        let images = self.fetch_inputs(job).await?;
        let request = build_request(job.kind, profile, images);

        let started = Instant::now();
        let image = self.generation.generate(request).await?;
        metrics::histogram!("generation_seconds").record(started.elapsed().as_secs_f64());

        let key = format!(
            "tenants/{}/results/{}.{}",
            job.tenant_id,
            job.id,
            extension_for_mime(&image.mime_type)
        );
        let asset_url = self
            .assets
            .put_object(&key, &image.bytes, &image.mime_type)
            .await?;

        // The artifact is durable; only now is the spend finalized.
        self.ledger.commit(reservation.id).await?;

        Ok(asset_url)
    }

    /// Single exit for every failure after pickup: rollback any held
    /// reservation, then persist FAILED. Credits must be restored before the
    /// FAILED status becomes visible.
    async fn resolve_failure(
        &self,
        mut job: TryOnJob,
        detail: ErrorDetail,
    ) -> Result<TryOnJob, OrchestratorError> {
        if let Some(reservation_id) = job.reservation_id {
            match self.ledger.rollback(reservation_id).await {
                Ok(()) => {}
                Err(LedgerError::ReservationNotFound(_)) => {
                    tracing::warn!(%reservation_id, "reservation missing during rollback");
                }
                Err(e) => return Err(OrchestratorError::LedgerUnavailable(e)),
            }
        }

        job.fail(detail, Utc::now())?;
        self.jobs.put(&job).await?;
        metrics::counter!("tryon_jobs_failed").increment(1);
        Ok(job)
    }

    /// Download the input photos this job kind uses: a fresh job applies the
    /// subject plus the first garment, a remix applies every garment.
    async fn fetch_inputs(&self, job: &TryOnJob) -> Result<Vec<InputImage>, PipelineError> {
        let selected: Vec<&String> = match job.kind {
            JobKind::Fresh => job.input_refs.iter().take(2).collect(),
            JobKind::Remix => job.input_refs.iter().collect(),
        };

        let mut images = Vec::with_capacity(selected.len());
        for key in selected {
            let bytes = self.assets.get_object(key).await?;
            images.push(InputImage {
                bytes,
                mime_type: mime_for_ref(key).to_string(),
            });
        }
        Ok(images)
    }
}

fn validate_inputs(job: &TryOnJob) -> Result<(), PipelineError> {
    if job.input_refs.len() < 2 {
        return Err(PipelineError::Validation(
            "a subject photo and at least one garment photo are required".to_string(),
        ));
    }
    if job.input_refs.len() > 4 {
        return Err(PipelineError::Validation(
            "at most one subject and three garment photos are accepted".to_string(),
        ));
    }
    if job.input_refs.iter().any(|r| r.trim().is_empty()) {
        return Err(PipelineError::Validation(
            "input references must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn build_request(kind: JobKind, profile: &ScenarioProfile, images: Vec<InputImage>) -> SynthesisRequest {
    let garments = images.len().saturating_sub(1);
    let prompt = match kind {
        JobKind::Fresh => format!(
            "Photorealistic virtual try-on. Dress the person from the first photo in the \
             garment from the following photo, preserving the person's identity, body \
             shape and pose exactly. Scene: {}.",
            profile.lighting_prompt
        ),
        JobKind::Remix => format!(
            "Photorealistic virtual try-on remix. Dress the person from the first photo in \
             all {} garments from the following photos, layered naturally together. \
             Compose a new, natural pose different from the original photo. Scene: {}.",
            garments, profile.lighting_prompt
        ),
    };

    SynthesisRequest {
        prompt,
        images,
        aspect_ratio: "3:4".to_string(),
        negative_prompt: Some(
            "distorted anatomy, extra limbs, altered face, text, watermark, logo artifacts"
                .to_string(),
        ),
    }
}

fn mime_for_ref(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}
