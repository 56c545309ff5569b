// API-specific data models for the web server

use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "image-upscaler";

/// Body of `GET /api/health`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub ai_upscaler_available: bool,
}

/// Query parameters for `POST /api/upscale`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpscaleQuery {
    pub scale: Option<u32>,
    pub face_enhance: Option<bool>,
}
