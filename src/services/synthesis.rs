use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

/// One input image handed to the synthesis capability. The first image of a
/// request is the subject photo, the remainder are garments.
#[derive(Debug, Clone)]
pub struct InputImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A single synthesis call: prompt, ordered input images and framing options.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub prompt: String,
    pub images: Vec<InputImage>,
    pub aspect_ratio: String,
    pub negative_prompt: Option<String>,
}

/// Inline image payload returned by the upstream model.
#[derive(Debug, Clone)]
pub struct SynthesizedImage {
    pub base64_data: String,
    pub mime_type: String,
}

/// The two-way split the pipeline depends on: `RateLimited` is the only
/// retryable variant, everything else fails fast.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("upstream rate limit")]
    RateLimited,

    #[error("upstream rejected request ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream response carried no image payload")]
    MissingImage,
}

impl SynthesisError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SynthesisError::RateLimited)
    }
}

/// Black-box image synthesis capability.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedImage, SynthesisError>;
}

/// Client for the Gemini image generation API.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }
}

#[async_trait]
impl ImageSynthesizer for GeminiClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedImage, SynthesisError> {
        let mut parts = Vec::with_capacity(request.images.len() + 1);

        // Negative guidance rides in the text prompt; the API has no
        // dedicated field for it.
        let prompt = match &request.negative_prompt {
            Some(negative) => format!("{}\n\nAvoid: {}", request.prompt, negative),
            None => request.prompt.clone(),
        };
        parts.push(serde_json::json!({ "text": prompt }));

        for image in &request.images {
            parts.push(serde_json::json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(&image.bytes),
                }
            }));
        }

        let body = serde_json::json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": request.aspect_ratio },
            },
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SynthesisError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;

        parsed
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .find_map(|p| p.inline_data)
            .map(|inline| SynthesizedImage {
                base64_data: inline.data,
                mime_type: inline.mime_type,
            })
            .ok_or(SynthesisError::MissingImage)
    }
}
