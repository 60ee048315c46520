//! Error types for Autorogue

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unusable input directories; fatal before any epoch runs.
    #[error("data source error: {0}")]
    DataSource(String),

    /// Malformed batch or non-finite loss during a forward/backward pass.
    #[error("training error: {0}")]
    Training(String),

    /// A best-model persist failed; never swallowed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
