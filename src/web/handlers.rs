// API handlers for the web server

use super::{
    AppState,
    error::ApiError,
    extract_request_data::extract_upload,
    models::{HealthResponse, SERVICE_NAME, UpscaleQuery},
};
use crate::gatekeeper::UploadRejection;
use crate::upscaler::{ScaleFactor, UpscaleRequest};
use axum::{
    Json,
    extract::{
        Multipart, Query, State, multipart::MultipartRejection, rejection::QueryRejection,
    },
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_FILENAME: &str = "image";

// --- GET /api/health ---
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        ai_upscaler_available: state.backend.is_ai_available(),
    })
}

// --- POST /api/upscale?scale=N&face_enhance=B ---
// Validates the uploaded image and returns the upscaled result as PNG
pub async fn upscale_image(
    State(state): State<AppState>,
    query: Result<Query<UpscaleQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let scale = match params.scale {
        Some(value) => ScaleFactor::try_from(value).map_err(|invalid| {
            ApiError::BadRequest(format!(
                "Invalid scale parameter {}: must be one of {:?}",
                invalid,
                ScaleFactor::ALLOWED
            ))
        })?,
        None => ScaleFactor::default(),
    };
    let face_enhance = params.face_enhance.unwrap_or(true);

    let request_id = Uuid::new_v4();

    let multipart = multipart.map_err(|rejection| {
        debug!("Request {} carried no multipart body: {}", request_id, rejection);
        UploadRejection::MissingInput
    })?;
    let upload = extract_upload(multipart, &state.policy).await?;
    info!(
        "Received upload request {}: filename={:?}, content_type={:?}",
        request_id,
        upload.as_ref().and_then(|u| u.filename.as_deref()),
        upload.as_ref().and_then(|u| u.content_type.as_deref()),
    );

    let validated = state.policy.admit(upload)?;
    info!(
        "Processing image for request {}: {} bytes",
        request_id,
        validated.data.len()
    );

    let request = UpscaleRequest {
        scale,
        face_enhance,
        ..UpscaleRequest::new(validated.data)
    };
    let png = state.backend.process(request).await?;

    let filename = format!(
        "{}_{}.png",
        state.backend.output_prefix(),
        sanitize_filename(validated.filename.as_deref())
    );
    info!(
        "Request {} completed: {} ({} bytes)",
        request_id,
        filename,
        png.len()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        png,
    )
        .into_response())
}

/// Keeps the client's filename usable inside a header value.
fn sanitize_filename(filename: Option<&str>) -> String {
    let sanitized: String = filename
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}
