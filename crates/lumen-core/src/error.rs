//! Error types for Lumen

use thiserror::Error;

/// The main error type for Lumen operations
#[derive(Debug, Error)]
pub enum LumenError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Duplicate entity name: {0}")]
    DuplicateEntityName(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),

    #[error("Scene error: {0}")]
    SceneError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Invalid enum value: {value} is not one of {allowed:?}")]
    InvalidEnumValue {
        value: String,
        allowed: Vec<String>,
    },

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// Result type alias for Lumen operations
pub type Result<T> = std::result::Result<T, LumenError>;

impl From<toml::de::Error> for LumenError {
    fn from(err: toml::de::Error) -> Self {
        LumenError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for LumenError {
    fn from(err: toml::ser::Error) -> Self {
        LumenError::TomlSerError(err.to_string())
    }
}

impl LumenError {
    /// Build an `InvalidEnumValue` from a value and the list of accepted names
    pub fn invalid_enum(value: impl Into<String>, allowed: &[&str]) -> Self {
        LumenError::InvalidEnumValue {
            value: value.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_enum_message() {
        let err = LumenError::invalid_enum("sometimes", &["on_awake", "every_frame"]);
        let msg = err.to_string();
        assert!(msg.contains("sometimes"));
        assert!(msg.contains("every_frame"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let err: LumenError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert!(matches!(err, LumenError::TomlParseError(_)));
    }
}
