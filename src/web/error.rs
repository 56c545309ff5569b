// Error responses for the HTTP API. Every failure is rendered as
// `{"detail": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use crate::gatekeeper::UploadRejection;
use crate::upscaler::UpscaleError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Upload(UploadRejection),
    Processing(UpscaleError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Upload(rejection) => {
                warn!("Upload rejected: {}", rejection);
                (StatusCode::BAD_REQUEST, rejection.to_string())
            }
            Self::Processing(err) => {
                error!("Error processing image: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error processing image: {}", err),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<UploadRejection> for ApiError {
    fn from(rejection: UploadRejection) -> Self {
        Self::Upload(rejection)
    }
}

impl From<UpscaleError> for ApiError {
    fn from(err: UpscaleError) -> Self {
        Self::Processing(err)
    }
}
