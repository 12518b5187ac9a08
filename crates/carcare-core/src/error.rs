use thiserror::Error;

/// Top-level error type for the CarCare system.
///
/// Every caller-facing failure maps onto one of these variants so that the
/// HTTP layer can report a stable, distinguishable kind. Subsystem crates
/// define their own error types and convert into or out of this one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CarCareError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CarCareError {
    /// Shorthand for a `NotFound` error on the given entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CarCareError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<toml::de::Error> for CarCareError {
    fn from(err: toml::de::Error) -> Self {
        CarCareError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CarCareError {
    fn from(err: toml::ser::Error) -> Self {
        CarCareError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CarCareError {
    fn from(err: serde_json::Error) -> Self {
        CarCareError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for CarCare operations.
pub type Result<T> = std::result::Result<T, CarCareError>;
