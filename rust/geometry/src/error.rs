use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during geometry processing
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transform is not invertible: {0}")]
    NonInvertibleTransform(String),

    #[error("Core error: {0}")]
    CoreError(#[from] urban_wind_core::Error),
}
