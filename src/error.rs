use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Load error: {message}")]
    Load { message: String },

    #[error("Invalid parameter shape for '{key}': {message}")]
    InvalidParameterShape { key: String, message: String },

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn transport(message: impl Into<String>) -> Self {
        IngestError::Transport { message: message.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        IngestError::Storage { message: message.into() }
    }

    pub fn load(message: impl Into<String>) -> Self {
        IngestError::Load { message: message.into() }
    }

    pub fn invalid_shape(key: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::InvalidParameterShape {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Transport { .. } => "transport",
            IngestError::Storage { .. } => "storage",
            IngestError::Load { .. } => "load",
            IngestError::InvalidParameterShape { .. } => "invalid_parameter_shape",
            IngestError::Json(_) => "json",
            IngestError::Toml(_) => "toml",
            IngestError::Io(_) => "io",
            IngestError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
