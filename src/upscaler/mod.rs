// Remote upscaling: turns validated image bytes into upscaled PNG bytes by
// driving a Replicate prediction to completion and downloading its output.

mod job_pool;
pub mod output;
pub mod replicate;

pub use job_pool::JobPool;
pub use output::resolve_reference;
pub use replicate::{ModelRef, ReplicateClient};

use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::image_codec;

#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Remote service error: {0}")]
    RemoteService(String),

    #[error("Could not extract a download URL from the remote output (shape: {shape})")]
    UnresolvableOutput { shape: String },

    #[error("Downloading the result from {url} failed with status {status}")]
    Download { status: u16, url: String },
}

/// Reasons the remote upscaler cannot be set up at startup.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("REPLICATE_API_TOKEN is not set")]
    MissingToken,

    #[error("REPLICATE_API_TOKEN contains characters that cannot be sent in a header")]
    InvalidToken,

    #[error("Invalid model identifier '{0}', expected owner/name or owner/name:version")]
    InvalidModel(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleFactor {
    X2,
    #[default]
    X4,
    X8,
}

impl ScaleFactor {
    pub const ALLOWED: [u32; 3] = [2, 4, 8];

    pub fn get(self) -> u32 {
        match self {
            ScaleFactor::X2 => 2,
            ScaleFactor::X4 => 4,
            ScaleFactor::X8 => 8,
        }
    }
}

impl TryFrom<u32> for ScaleFactor {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(ScaleFactor::X2),
            4 => Ok(ScaleFactor::X4),
            8 => Ok(ScaleFactor::X8),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpscaleRequest {
    pub image: Vec<u8>,
    pub scale: ScaleFactor,
    pub face_enhance: bool,
}

impl UpscaleRequest {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            scale: ScaleFactor::default(),
            face_enhance: true,
        }
    }
}

/// Settings for the remote upscaler, read once at startup.
#[derive(Debug, Clone)]
pub struct UpscalerConfig {
    pub api_token: Option<String>,
    pub model: String,
    pub api_base: String,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
    pub max_concurrent_jobs: usize,
}

impl Default for UpscalerConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            model: replicate::DEFAULT_MODEL.to_string(),
            api_base: replicate::DEFAULT_API_BASE.to_string(),
            job_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(1),
            max_concurrent_jobs: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteUpscaler {
    client: ReplicateClient,
    pool: JobPool,
}

impl RemoteUpscaler {
    pub fn from_config(config: &UpscalerConfig) -> Result<Self, InitError> {
        let api_token = config
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(InitError::MissingToken)?
            .to_string();
        let model: ModelRef = config.model.parse()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let client = ReplicateClient::new(
            http,
            &config.api_base,
            api_token,
            model,
            config.poll_interval,
        )?;
        let pool = JobPool::new(config.max_concurrent_jobs, config.job_timeout);

        Ok(Self { client, pool })
    }

    pub fn model(&self) -> &ModelRef {
        self.client.model()
    }

    /// Encode, submit, resolve, download. Nothing is retried.
    pub async fn upscale(&self, request: UpscaleRequest) -> Result<Vec<u8>, UpscaleError> {
        let UpscaleRequest {
            image,
            scale,
            face_enhance,
        } = request;
        info!(
            "Starting AI upscaling with {}, scale={}, face_enhance={}",
            self.client.model(),
            scale.get(),
            face_enhance
        );

        let data_url = tokio::task::spawn_blocking(move || image_codec::to_data_url(&image))
            .await
            .map_err(|e| UpscaleError::Decode(format!("Image encode task failed: {}", e)))??;

        let input = json!({
            "image": data_url,
            "scale": scale.get(),
            "face_enhance": face_enhance,
        });
        let started = Instant::now();
        let client = self.client.clone();
        let output = self.pool.run(async move { client.run(input).await }).await?;

        let url = resolve_reference(&output).inspect_err(|e| {
            warn!("{}", e);
        })?;

        // The download shares the job's budget.
        let remaining = self.pool.timeout().saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(UpscaleError::RemoteService(format!(
                "Remote job timed out after {}s",
                self.pool.timeout().as_secs()
            )));
        }
        let bytes = self.client.download(&url, remaining).await?;

        info!("AI upscaling completed. Output size: {} bytes", bytes.len());
        Ok(bytes)
    }
}

/// How uploads are processed for the lifetime of the process.
#[derive(Debug, Clone)]
pub enum UpscaleBackend {
    Remote(RemoteUpscaler),
    /// Re-encode to PNG without enhancement.
    Passthrough,
}

impl UpscaleBackend {
    pub fn initialize(config: &UpscalerConfig) -> Self {
        match RemoteUpscaler::from_config(config) {
            Ok(upscaler) => {
                info!("AI upscaler initialized with model {}", upscaler.model());
                UpscaleBackend::Remote(upscaler)
            }
            Err(e) => {
                warn!(
                    "AI upscaler unavailable ({}). Running in fallback mode: images are re-encoded without upscaling.",
                    e
                );
                UpscaleBackend::Passthrough
            }
        }
    }

    pub fn is_ai_available(&self) -> bool {
        matches!(self, UpscaleBackend::Remote(_))
    }

    /// Filename prefix telling callers which path produced the result.
    pub fn output_prefix(&self) -> &'static str {
        match self {
            UpscaleBackend::Remote(_) => "upscaled",
            UpscaleBackend::Passthrough => "fallback",
        }
    }

    pub async fn process(&self, request: UpscaleRequest) -> Result<Vec<u8>, UpscaleError> {
        match self {
            UpscaleBackend::Remote(upscaler) => upscaler.upscale(request).await,
            UpscaleBackend::Passthrough => {
                let image = request.image;
                tokio::task::spawn_blocking(move || image_codec::reencode_as_png(&image))
                    .await
                    .map_err(|e| UpscaleError::Decode(format!("Image encode task failed: {}", e)))?
            }
        }
    }
}
