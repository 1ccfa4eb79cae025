use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use crate::services::retry::{with_retry, RetryPolicy};
use crate::services::synthesis::{ImageSynthesizer, SynthesisError, SynthesisRequest};

/// Decoded image bytes ready for the asset store.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Rate-limit retries exhausted; terminal from the orchestrator's view.
    #[error("upstream rate limit persisted across {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    #[error("generation attempt exceeded {0:?}")]
    TimedOut(Duration),

    #[error("generation failed: {0}")]
    Upstream(SynthesisError),

    #[error("upstream image payload was not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

enum AttemptError {
    Synthesis(SynthesisError),
    TimedOut,
}

/// Wraps the synthesis capability with a per-attempt timeout and the
/// retry-on-rate-limit policy. Non-rate-limit errors (including timeouts)
/// fail fast.
pub struct GenerationClient {
    synthesizer: Arc<dyn ImageSynthesizer>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl GenerationClient {
    pub fn new(
        synthesizer: Arc<dyn ImageSynthesizer>,
        policy: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            policy,
            attempt_timeout,
        }
    }

    pub async fn generate(&self, request: SynthesisRequest) -> Result<GeneratedImage, GenerationError> {
        let attempts = self.policy.max_attempts();

        let outcome = with_retry(
            &self.policy,
            |e: &AttemptError| matches!(e, AttemptError::Synthesis(s) if s.is_rate_limited()),
            |attempt| {
                let synthesizer = self.synthesizer.clone();
                let request = request.clone();
                let timeout = self.attempt_timeout;
                async move {
                    if attempt > 0 {
                        tracing::info!(attempt, "retrying generation after rate limit");
                    }
                    match tokio::time::timeout(timeout, synthesizer.synthesize(&request)).await {
                        Ok(Ok(image)) => Ok(image),
                        Ok(Err(e)) => Err(AttemptError::Synthesis(e)),
                        Err(_) => Err(AttemptError::TimedOut),
                    }
                }
            },
        )
        .await;

        match outcome {
            Ok(image) => {
                let bytes = base64::engine::general_purpose::STANDARD.decode(image.base64_data.as_bytes())?;
                Ok(GeneratedImage {
                    bytes,
                    mime_type: image.mime_type,
                })
            }
            Err(AttemptError::Synthesis(s)) if s.is_rate_limited() => {
                Err(GenerationError::RetriesExhausted { attempts })
            }
            Err(AttemptError::Synthesis(s)) => Err(GenerationError::Upstream(s)),
            Err(AttemptError::TimedOut) => Err(GenerationError::TimedOut(self.attempt_timeout)),
        }
    }
}
