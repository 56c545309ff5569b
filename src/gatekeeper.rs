// Upload validation performed before any image reaches the remote upscaler.
// Checks run in a fixed order: presence, declared media type, size.

use mime::Mime;

pub const BYTES_PER_MEGABYTE: usize = 1024 * 1024;
pub const DEFAULT_MAX_FILE_SIZE_MB: usize = 5;

/// Declared media types accepted for upload.
pub const ALLOWED_MEDIA_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// A file received from the client, held in memory for the duration of one request.
#[derive(Debug, Clone, Default)]
pub struct UploadedImage {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

/// Upload that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub data: Vec<u8>,
    pub filename: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("No file provided")]
    MissingInput,

    #[error("Unsupported file type. Allowed types: {}", ALLOWED_MEDIA_TYPES.join(", "))]
    UnsupportedType,

    #[error("File exceeds {limit_mb}MB limit")]
    PayloadTooLarge { limit_mb: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    max_file_size_mb: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE_MB)
    }
}

impl UploadPolicy {
    pub fn new(max_file_size_mb: usize) -> Self {
        Self { max_file_size_mb }
    }

    pub fn max_file_size_mb(&self) -> usize {
        self.max_file_size_mb
    }

    pub fn max_bytes(&self) -> usize {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MEGABYTE)
    }

    /// Checks the declared media type. Parameters are ignored and the
    /// comparison is case-insensitive, so `IMAGE/PNG; q=1` is accepted.
    pub fn check_media_type(&self, declared: Option<&str>) -> Result<(), UploadRejection> {
        let essence = declared
            .and_then(|value| value.parse::<Mime>().ok())
            .map(|mime| mime.essence_str().to_ascii_lowercase());

        match essence {
            Some(essence) if ALLOWED_MEDIA_TYPES.contains(&essence.as_str()) => Ok(()),
            _ => Err(UploadRejection::UnsupportedType),
        }
    }

    pub fn check_size(&self, len: usize) -> Result<(), UploadRejection> {
        if len > self.max_bytes() {
            return Err(UploadRejection::PayloadTooLarge {
                limit_mb: self.max_file_size_mb,
            });
        }
        Ok(())
    }

    /// Runs all checks in order and hands back the bytes that may be sent on.
    pub fn admit(&self, upload: Option<UploadedImage>) -> Result<ValidatedUpload, UploadRejection> {
        let upload = upload.ok_or(UploadRejection::MissingInput)?;
        self.check_media_type(upload.content_type.as_deref())?;
        self.check_size(upload.data.len())?;

        Ok(ValidatedUpload {
            data: upload.data,
            filename: upload.filename,
        })
    }
}
