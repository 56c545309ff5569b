use axum::{extract::Multipart, http::StatusCode};
use tracing::{debug, warn};

use super::error::ApiError;
use crate::gatekeeper::{UploadPolicy, UploadRejection, UploadedImage};

pub const IMAGE_FIELD: &str = "image";

/// Reads the `image` field of a multipart request into memory.
///
/// Returns `Ok(None)` when the field is absent. Reading stops once the body
/// exceeds the policy's ceiling, so the returned buffer is at most one chunk
/// past the limit. If the body limit layer cuts the stream short, the declared
/// type is still checked first so that an unsupported type wins over size.
pub async fn extract_upload(
    mut multipart: Multipart,
    policy: &UploadPolicy,
) -> Result<Option<UploadedImage>, ApiError> {
    let mut upload: Option<UploadedImage> = None;
    let mut ignored_fields = 0;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::from(oversize(policy))
        } else {
            ApiError::BadRequest(format!("Failed to process multipart field: {}", e.body_text()))
        }
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            let field_name = field.name().unwrap_or("unnamed").to_string();
            debug!("Ignoring multipart field: {}", field_name);
            ignored_fields += 1;
            continue;
        }

        if upload.is_some() {
            warn!("Multiple '{}' fields found in multipart request, using the last one", IMAGE_FIELD);
        }

        let content_type = field.content_type().map(str::to_string);
        let filename = field.file_name().map(str::to_string);
        debug!(
            "Received upload {:?} with content type {:?}",
            filename, content_type
        );

        let mut data = Vec::new();
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    data.extend_from_slice(&chunk);
                    if data.len() > policy.max_bytes() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                    policy.check_media_type(content_type.as_deref())?;
                    return Err(oversize(policy).into());
                }
                Err(e) => {
                    return Err(ApiError::BadRequest(format!(
                        "Failed to read file data: {}",
                        e.body_text()
                    )));
                }
            }
        }

        let oversized = data.len() > policy.max_bytes();
        upload = Some(UploadedImage {
            data,
            content_type,
            filename,
        });
        if oversized {
            // The remainder of the body is never read.
            break;
        }
    }

    if ignored_fields > 0 {
        debug!("Ignored {} non-image fields in multipart request", ignored_fields);
    }

    Ok(upload)
}

fn oversize(policy: &UploadPolicy) -> UploadRejection {
    UploadRejection::PayloadTooLarge {
        limit_mb: policy.max_file_size_mb(),
    }
}
