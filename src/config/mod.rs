use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// Gemini API key for image generation
    pub gemini_api_key: String,

    /// Gemini model used for try-on composites
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL fronting the bucket, used for returned asset URLs
    pub asset_public_base_url: String,

    /// Credits charged per generation (tenant-facing price, not user input)
    #[serde(default = "default_generation_cost")]
    pub generation_cost_credits: i64,

    /// Per-attempt timeout for upstream generation calls, in seconds
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_generation_cost() -> i64 {
    1
}

fn default_generation_timeout_secs() -> u64 {
    90
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
