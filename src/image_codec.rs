// Image helpers: format sniffing, data URL encoding for the remote job input,
// and the PNG re-encode used when running without the remote upscaler.

use base64::prelude::{BASE64_STANDARD, Engine as _};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

use crate::upscaler::UpscaleError;

/// Detects the image format from the bytes themselves and makes sure the
/// header can be parsed. The declared content type of the upload is not
/// consulted here.
pub fn detect_format(data: &[u8]) -> Result<ImageFormat, UpscaleError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| UpscaleError::Decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| UpscaleError::Decode("unrecognized image format".to_string()))?;

    let (width, height) = reader.into_dimensions().map_err(|e| {
        UpscaleError::Decode(format!("invalid {:?} header: {}", format, e))
    })?;
    debug!("Detected {:?} image, {}x{}", format, width, height);

    Ok(format)
}

/// Encodes the whole buffer as `data:<mime>;base64,<payload>`.
pub fn to_data_url(data: &[u8]) -> Result<String, UpscaleError> {
    let format = detect_format(data)?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        BASE64_STANDARD.encode(data)
    ))
}

/// Decodes any supported input and writes it back out as PNG, without resizing.
pub fn reencode_as_png(data: &[u8]) -> Result<Vec<u8>, UpscaleError> {
    let dyn_img = image::load_from_memory(data)
        .map_err(|e| UpscaleError::Decode(e.to_string()))?;

    let mut buffer = Cursor::new(Vec::new());
    dyn_img
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| UpscaleError::Decode(format!("PNG encoding failed: {}", e)))?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    pub fn solid(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }
}
