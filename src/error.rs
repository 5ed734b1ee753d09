use std::path::PathBuf;

use thiserror::Error;

/// Library error type for darkroom operations.
///
/// Only session entry and configuration loading surface errors to the
/// caller; transient rendering conditions (no fresh buffer yet, a stale
/// processing result) are absorbed internally and produce no visual change
/// for the frame.
#[derive(Debug, Error)]
pub enum Error {
    /// The selected image no longer exists on disk.
    #[error("image does not exist: {0}")]
    MissingImage(PathBuf),

    /// The selected image exists but could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Persisted edit history could not be read back.
    #[error("failed to load edit history for {image}: {reason}")]
    History { image: String, reason: String },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}
