use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::{ErrorDetail, JobKind, JobStatus};

/// Metadata portion of a try-on submission (text fields of the multipart
/// request; the images arrive as separate parts).
#[derive(Debug, Default, Deserialize, Validate)]
pub struct TryOnRequestMeta {
    #[garde(length(min = 1, max = 128))]
    pub tenant_id: String,

    #[garde(length(min = 1, max = 128))]
    pub customer_id: String,

    /// Comma-separated product tags, e.g. "vestido, festa, longo".
    #[garde(skip)]
    pub product_tags: Option<String>,
}

impl TryOnRequestMeta {
    pub fn tags(&self) -> Vec<String> {
        self.product_tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Response after submitting a try-on request.
#[derive(Debug, Serialize, Deserialize)]
pub struct TryOnResponse {
    pub job_id: uuid::Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: uuid::Uuid,
    pub status: JobStatus,
    pub kind: JobKind,
    pub result_asset_url: Option<String>,
    pub error: Option<ErrorDetail>,
}
