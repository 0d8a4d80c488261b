use crate::core::coordinator::FlowError;
use crate::domain::model::{ApiError, IdentificationStep, ModuleName};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentError {
    #[error("API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backend rejected the request: {0}")]
    ApiError(#[from] ApiError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Storage error in module '{module}': {message}")]
    StorageError { module: ModuleName, message: String },

    #[error("Module '{module}' is not available in this build")]
    ModuleUnavailable { module: ModuleName },

    #[error("Identification step '{step}' is not supported by this configuration")]
    UnsupportedConfiguration { step: IdentificationStep },

    #[error("Flow failed: {0}")]
    FlowError(#[from] FlowError),

    #[error("Session error: {message}")]
    SessionError { message: String },
}

impl IdentError {
    /// 給終端使用者看的簡短訊息
    pub fn user_friendly_message(&self) -> String {
        match self {
            IdentError::HttpError(_) => "Could not reach the identification service.".to_string(),
            IdentError::ApiError(e) | IdentError::FlowError(FlowError::Api(e)) => {
                format!("The identification service reported: {}", e)
            }
            IdentError::ConfigError { message } => format!("Configuration problem: {}", message),
            IdentError::InvalidConfigValueError { field, reason, .. } => {
                format!("Configuration value '{}' is invalid: {}", field, reason)
            }
            IdentError::ModuleUnavailable { .. } | IdentError::UnsupportedConfiguration { .. } => {
                "This identification method is not supported by the app.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            IdentError::HttpError(_) => "Check the network connection and api.base_url",
            IdentError::ApiError(ApiError::AuthorizationFailed) => {
                "Request a new session token and update api.session_token"
            }
            IdentError::ConfigError { .. } | IdentError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and run again"
            }
            IdentError::StorageError { .. } | IdentError::IoError(_) => {
                "Check that storage.root is writable"
            }
            IdentError::ModuleUnavailable { .. } | IdentError::UnsupportedConfiguration { .. } => {
                "Build with the required modules enabled (e.g. the `qes` feature)"
            }
            _ => "Retry the identification",
        }
    }
}

pub type Result<T> = std::result::Result<T, IdentError>;
