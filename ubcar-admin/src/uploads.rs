//! Image upload storage
//!
//! Uploaded images are decoded (anything the `image` crate cannot read is
//! rejected), written under the uploads directory with a random name, and
//! given a PNG thumbnail when larger than [`THUMBNAIL_SIZE`] on either side.

use std::path::Path;

use image::{imageops::FilterType, ImageFormat};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Thumbnail bounding box, in pixels
pub const THUMBNAIL_SIZE: u32 = 150;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file was uploaded")]
    Empty,

    #[error("Upload is not a supported image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Files written for one uploaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub file_name: String,
    /// None when the original already fits the thumbnail box
    pub thumb_file_name: Option<String>,
    pub mime_type: String,
}

/// Decode, store and thumbnail an uploaded image
///
/// Blocking; call from `spawn_blocking` inside the server.
pub fn store_image(uploads_dir: &Path, bytes: &[u8]) -> Result<StoredImage, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }

    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;

    let stem = Uuid::new_v4().simple().to_string();
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    let file_name = format!("{}.{}", stem, extension);

    std::fs::create_dir_all(uploads_dir)?;
    std::fs::write(uploads_dir.join(&file_name), bytes)?;

    let thumb_file_name = if img.width() > THUMBNAIL_SIZE || img.height() > THUMBNAIL_SIZE {
        let thumb_name = format!("{}-thumb.png", stem);
        let thumbnail = img.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
        thumbnail.save_with_format(uploads_dir.join(&thumb_name), ImageFormat::Png)?;
        Some(thumb_name)
    } else {
        None
    };

    debug!(
        file = %file_name,
        thumb = ?thumb_file_name,
        width = img.width(),
        height = img.height(),
        "Stored image upload"
    );

    Ok(StoredImage {
        file_name,
        thumb_file_name,
        mime_type: format.to_mime_type().to_string(),
    })
}

/// Remove an upload and its thumbnail; files already gone are ignored
pub fn remove_stored(uploads_dir: &Path, file_name: &str, thumb_file_name: Option<&str>) {
    for name in std::iter::once(file_name).chain(thumb_file_name) {
        match std::fs::remove_file(uploads_dir.join(name)) {
            Ok(()) => debug!(file = %name, "Removed stored upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %name, "Failed to remove stored upload: {}", e),
        }
    }
}

/// Public URL of a stored upload
pub fn upload_url(file_name: &str) -> String {
    format!("/uploads/{}", file_name)
}
