//! Image upload validation and decoding.

use image::{ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// MIME types accepted for uploaded images.
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/jfif"];

/// File extensions accepted by the interactive form.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "png", "jpeg", "jfif"];

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("type {0} not supported")]
    UnsupportedType(String),
    #[error("could not be decoded ({0})")]
    Decode(#[from] image::ImageError),
    #[error("could not be read ({0})")]
    Io(#[from] std::io::Error),
}

/// Check an upload's declared content type against [`ALLOWED_MIME_TYPES`].
///
/// Parameters such as `; charset=...` are ignored and matching is case-insensitive.
pub fn check_mime_type(content_type: Option<&str>) -> Result<(), ImageError> {
    let declared = content_type.unwrap_or("").trim();
    let essence = declared.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else if declared.is_empty() {
        Err(ImageError::UnsupportedType("(none)".to_string()))
    } else {
        Err(ImageError::UnsupportedType(declared.to_string()))
    }
}

/// Check a file name's extension against [`ALLOWED_EXTENSIONS`].
pub fn check_extension(file_name: &str) -> Result<(), ImageError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(ImageError::UnsupportedType(format!(".{ext}"))),
        None => Err(ImageError::UnsupportedType(format!("{file_name:?} (no extension)"))),
    }
}

/// Decode in-memory image bytes into an RGB raster. The format is sniffed
/// from the content, never from a name.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(image.to_rgb8())
}

/// Read and decode an image file into an RGB raster.
pub fn open_image(path: &Path) -> Result<RgbImage, ImageError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.to_rgb8())
}
