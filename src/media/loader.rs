/// Image file loader
///
/// Reads an image file into memory in one suspending read. Oversized files are
/// refused from their metadata, before any bytes are read.
use image::ImageFormat;
use std::path::Path;

use crate::error::{Error, Result, MAX_IMAGE_BYTES};
use crate::state::data::Image;

/// Media type used when neither content nor extension identify the file
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Load an image file for analysis
///
/// # Returns
/// * `Ok(Image)` - bytes, detected media type and file name
/// * `Err(InvalidInput)` - not a regular file, or larger than the upload limit
/// * `Err(Io)` - the file could not be read
pub async fn load_image(path: &Path) -> Result<Image> {
    let metadata = tokio::fs::metadata(path).await?;

    if !metadata.is_file() {
        return Err(Error::invalid(format!("{} is not a file", path.display())));
    }

    if metadata.len() > MAX_IMAGE_BYTES {
        return Err(Error::invalid(format!(
            "{} is {:.1} MiB, limit is {} MiB",
            path.display(),
            metadata.len() as f64 / 1024.0 / 1024.0,
            MAX_IMAGE_BYTES / 1024 / 1024
        )));
    }

    let bytes = tokio::fs::read(path).await?;
    let media_type = detect_media_type(path, &bytes);

    tracing::debug!(
        "📷 Loaded {} ({} bytes, {})",
        path.display(),
        bytes.len(),
        media_type
    );

    let image = Image::new(bytes, media_type);
    Ok(match path.file_name() {
        Some(name) => image.with_file_name(name.to_string_lossy()),
        None => image,
    })
}

/// Detect the media type from magic bytes, falling back to the extension
pub fn detect_media_type(path: &Path, bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok())
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|| UNKNOWN_MEDIA_TYPE.to_string())
}
