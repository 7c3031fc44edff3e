use thiserror::Error;

/// Top-level error type for Hearth.
///
/// Subsystem crates define their own error types and implement
/// `From<HearthError>` for them so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HearthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for HearthError {
    fn from(err: toml::de::Error) -> Self {
        HearthError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HearthError {
    fn from(err: toml::ser::Error) -> Self {
        HearthError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for HearthError {
    fn from(err: serde_json::Error) -> Self {
        HearthError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Hearth operations.
pub type Result<T> = std::result::Result<T, HearthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HearthError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = HearthError::Storage("database is locked".to_string());
        assert_eq!(err.to_string(), "Storage error: database is locked");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HearthError = io_err.into();
        assert!(matches!(err, HearthError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: HearthError = toml_err.into();
        assert!(matches!(err, HearthError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: HearthError = json_err.into();
        assert!(matches!(err, HearthError::Serialization(_)));
    }
}
