// Command line / environment configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::gatekeeper::{DEFAULT_MAX_FILE_SIZE_MB, UploadPolicy};
use crate::upscaler::{UpscalerConfig, replicate};

/// Command line arguments for image-upscaler
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "UPSCALER_HOST", default_value = "localhost", num_args = 0..=1, default_missing_value = "*")]
    pub host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "UPSCALER_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum accepted upload size in megabytes.
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value_t = DEFAULT_MAX_FILE_SIZE_MB)]
    pub max_file_size_mb: usize,

    /// Replicate API token. Without it the server runs in fallback mode.
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    pub replicate_api_token: Option<String>,

    /// Replicate model, as owner/name or owner/name:version.
    #[arg(long, env = "AI_UPSCALE_MODEL", default_value = replicate::DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the Replicate HTTP API.
    #[arg(long, env = "REPLICATE_API_BASE", default_value = replicate::DEFAULT_API_BASE)]
    pub replicate_api_base: String,

    /// Time budget in seconds for one remote upscaling job, including polling.
    #[arg(long, env = "UPSCALER_JOB_TIMEOUT_SECS", default_value_t = 180)]
    pub job_timeout_secs: u64,

    /// Delay in milliseconds between prediction status polls.
    #[arg(long, env = "UPSCALER_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Maximum number of remote jobs running at once.
    #[arg(long, env = "UPSCALER_MAX_CONCURRENT_JOBS", default_value_t = 4)]
    pub max_concurrent_jobs: usize,

    /// Directory of static frontend files served at `/`.
    #[arg(long, env = "UPSCALER_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_file_size_mb)
    }

    pub fn upscaler_config(&self) -> UpscalerConfig {
        UpscalerConfig {
            api_token: self.replicate_api_token.clone(),
            model: self.model.clone(),
            api_base: self.replicate_api_base.clone(),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_concurrent_jobs: self.max_concurrent_jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_arguments() {
        let config = AppConfig::try_parse_from([
            "image-upscaler",
            "--host",
            "--port",
            "9000",
            "--max-file-size-mb",
            "12",
            "--replicate-api-token",
            "r8_abc",
            "--model",
            "nightmareai/real-esrgan:f121d640",
            "--job-timeout-secs",
            "30",
            "--poll-interval-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(config.host, "*");
        assert_eq!(config.port, 9000);
        assert_eq!(config.upload_policy().max_bytes(), 12 * 1024 * 1024);

        let upscaler = config.upscaler_config();
        assert_eq!(upscaler.api_token.as_deref(), Some("r8_abc"));
        assert_eq!(upscaler.model, "nightmareai/real-esrgan:f121d640");
        assert_eq!(upscaler.job_timeout, Duration::from_secs(30));
        assert_eq!(upscaler.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_non_numeric_size() {
        assert!(
            AppConfig::try_parse_from(["image-upscaler", "--max-file-size-mb", "five"]).is_err()
        );
    }
}
