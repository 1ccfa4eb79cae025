use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a try-on generation job in the async pipeline.
///
/// `Completed` and `Failed` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Whether a job is a fresh generation or a remix of a prior composition.
///
/// Decided at construction time: a remix applies every garment reference,
/// draws its background at random within the resolved category, and asks the
/// upstream model for a new pose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    Fresh,
    Remix,
}

/// Machine-readable failure classification surfaced on failed jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    ValidationError,
    InsufficientFunds,
    GenerationFailed,
    PersistenceError,
}

/// Reason code plus human-readable message attached to a FAILED job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub reason_code: ReasonCode,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(reason_code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason_code,
            message: message.into(),
        }
    }
}

/// Attempted a job status transition the state machine does not allow.
#[derive(Debug, thiserror::Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A single try-on generation request, tracked through a terminal state.
///
/// `input_refs` holds blob-store keys: the first entry is the subject photo,
/// the remainder are garment photos. Rows are never deleted; terminal jobs
/// are retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryOnJob {
    pub id: Uuid,
    pub tenant_id: String,
    pub customer_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub input_refs: Vec<String>,
    pub product_tags: Vec<String>,
    pub reservation_id: Option<Uuid>,
    pub result_asset_url: Option<String>,
    pub error: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryOnJob {
    pub fn new(
        tenant_id: impl Into<String>,
        customer_id: impl Into<String>,
        kind: JobKind,
        input_refs: Vec<String>,
        product_tags: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            customer_id: customer_id.into(),
            kind,
            status: JobStatus::Pending,
            input_refs,
            product_tags,
            reservation_id: None,
            result_asset_url: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Pending -> Processing. Stamps `started_at`.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.guard(JobStatus::Pending, JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        Ok(())
    }

    /// Processing -> Completed. The result URL is immutable once set.
    pub fn complete(
        &mut self,
        result_asset_url: String,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.guard(JobStatus::Processing, JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.result_asset_url = Some(result_asset_url);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Processing -> Failed with the originating reason attached.
    pub fn fail(&mut self, detail: ErrorDetail, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.guard(JobStatus::Processing, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error = Some(detail);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    fn guard(&self, from: JobStatus, to: JobStatus) -> Result<(), InvalidTransition> {
        if self.status != from {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
