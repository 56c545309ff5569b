// Web server module
// Handles the HTTP API endpoints for uploading and upscaling images

mod app;
mod error;
mod extract_request_data;
mod handlers;
mod listeners;
mod models;

pub use app::create_app;
pub use listeners::create_listener;

use crate::gatekeeper::UploadPolicy;
use crate::upscaler::UpscaleBackend;
use std::path::PathBuf;
use std::sync::Arc;

// Room for multipart boundaries and part headers on top of the upload ceiling
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub policy: UploadPolicy,
    pub backend: Arc<UpscaleBackend>,
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(policy: UploadPolicy, backend: UpscaleBackend) -> Self {
        Self {
            policy,
            backend: Arc::new(backend),
            static_dir: None,
        }
    }

    pub fn with_static_dir(mut self, static_dir: Option<PathBuf>) -> Self {
        self.static_dir = static_dir;
        self
    }
}
