// src/validation.rs
//
// Image input checks. This is the only stage whose failure aborts the
// pipeline: every later stage needs a decoded image.

use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::error::StageError;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Validate and decode the image input. Accepts either a file path or
/// raw bytes; the path wins when both are present.
pub fn validate_image(
    path: Option<&Path>,
    bytes: Option<&[u8]>,
) -> Result<DynamicImage, StageError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(StageError::Validation(format!(
                "image file not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StageError::Validation(format!(
                "unsupported image format: .{}",
                extension
            )));
        }

        let img = image::open(path)
            .map_err(|e| StageError::Validation(format!("corrupt image file: {}", e)))?;
        debug!(
            "validated image {} ({}x{})",
            path.display(),
            img.width(),
            img.height()
        );
        Ok(img)
    } else if let Some(bytes) = bytes {
        let img = image::load_from_memory(bytes)
            .map_err(|e| StageError::Validation(format!("corrupt image data: {}", e)))?;
        debug!("validated in-memory image ({}x{})", img.width(), img.height());
        Ok(img)
    } else {
        Err(StageError::Validation(
            "an image path or raw image bytes is required".to_string(),
        ))
    }
}
