//! Image decoding shared by every operation that reads a file.
//!
//! The decoder is picked from the file's leading bytes, so a JPEG saved with a
//! `.png` name still loads. The extension is only a fallback when the content
//! is not recognised.

use image::{DynamicImage, ImageError, ImageReader};
use std::path::Path;
use crate::error::{AnnotatorError, Result};

/// Decode the image at `path`, detecting its format from its content.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let read_error = |e: ImageError| AnnotatorError::image_read(path, e);
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| read_error(ImageError::IoError(e)))?
        .decode()
        .map_err(read_error)
}
