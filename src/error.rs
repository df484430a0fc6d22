use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotatorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Missing edited image for region {region}: {}", path.display())]
    MissingRegionAsset { region: String, path: PathBuf },

    #[error("Invalid region {region}: {reason}")]
    InvalidRegion { region: String, reason: String },

    #[error("No image loaded")]
    NoImageLoaded,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl AnnotatorError {
    pub(crate) fn image_read(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::ImageRead {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Same as [`AnnotatorError::write`] for plain filesystem writes.
    pub(crate) fn write_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::write(path, image::ImageError::IoError(source))
    }
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;

// Implement Serialize for Tauri error responses and batch reports
impl serde::Serialize for AnnotatorError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_asset_message_names_region() {
        let err = AnnotatorError::MissingRegionAsset {
            region: "3".to_string(),
            path: PathBuf::from("edited/3.png"),
        };
        let msg = err.to_string();
        assert!(msg.contains("region 3"));
        assert!(msg.contains("3.png"));
    }

    #[test]
    fn test_serializes_as_display_string() {
        let err = AnnotatorError::InvalidConfiguration("kernel size must be at least 1".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Invalid configuration: kernel size must be at least 1\"");
    }
}
