//! Error Handling Module
//!
//! Every failure in the pipeline is fatal: errors bubble up to `main`, which
//! prints the chain and exits non-zero. The variants only exist so the
//! message says which stage broke.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the fine-tuning pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Malformed dataset layout
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model construction or shape error
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failure while rendering a chart
    #[error("Plot error: {0}")]
    Plot(String),

    /// Failure while reading model weights
    #[error("Record error: {0}")]
    Record(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageLoad(PathBuf::new(), err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<burn::record::RecorderError> for Error {
    fn from(err: burn::record::RecorderError) -> Self {
        Error::Record(format!("{:?}", err))
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Map any displayable plotting failure into [`Error::Plot`]
pub(crate) fn plot_err<E: std::fmt::Display>(err: E) -> Error {
    Error::Plot(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Dataset("no class folders".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no class folders");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/train_data/other/ecg_01.png");
        let err = Error::ImageLoad(path, "unexpected EOF".to_string());
        assert!(format!("{}", err).contains("ecg_01.png"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("epochs = = 3");
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }
}
