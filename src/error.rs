//! Error handling for the level engine
//!
//! The analysis core degrades gracefully and never fails; this type covers
//! the surfaces around it: configuration files, K-line files and the CLI.

use std::fmt;
use std::io;

/// Main error type for the level engine
#[derive(Debug)]
pub enum LevelError {
    // Configuration errors
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),

    // Data errors
    DataParse(String),
    InsufficientData(String),
    InvalidParameter(String, String), // (parameter_name, reason)

    // IO errors
    FileNotFound(String),
    FileRead(String),
    FileWrite(String),

    // General errors
    Internal(String),
}

impl LevelError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            LevelError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: level-calc --init-config {}\n\
                    2. Adjust the generated TOML\n\
                    3. Try again",
                    path, path
                )
            }
            LevelError::ConfigValidation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check the config for:\n\
                    - gap_min_atr_ratio below gap_max_atr_ratio\n\
                    - Non-negative weights and tolerances\n\
                    - Non-zero periods and bucket counts",
                    msg
                )
            }
            LevelError::DataParse(msg) => {
                format!(
                    "Could not parse K-line data: {}\n\n\
                    💡 Expected a JSON object keyed by timeframe:\n\
                    {{\"4h\": [{{\"timestamp\": 0, \"open\": 1, \"high\": 1, \"low\": 1, \"close\": 1, \"volume\": 1}}]}}",
                    msg
                )
            }
            LevelError::InsufficientData(msg) => {
                format!(
                    "Not enough market data: {}\n\n\
                    💡 Provide more bars per timeframe\n\
                    Swing detection needs 2×period+1 bars, VPVR needs 10",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            LevelError::ConfigNotFound(_)
            | LevelError::ConfigParse(_)
            | LevelError::ConfigValidation(_) => "config",

            LevelError::DataParse(_)
            | LevelError::InsufficientData(_)
            | LevelError::InvalidParameter(_, _) => "data",

            LevelError::FileNotFound(_)
            | LevelError::FileRead(_)
            | LevelError::FileWrite(_) => "io",

            LevelError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            LevelError::ConfigParse(msg) => {
                write!(f, "Configuration parse error: {}", msg)
            }
            LevelError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }

            LevelError::DataParse(msg) => {
                write!(f, "K-line data parse error: {}", msg)
            }
            LevelError::InsufficientData(msg) => {
                write!(f, "Insufficient data: {}", msg)
            }
            LevelError::InvalidParameter(param, reason) => {
                write!(f, "Invalid parameter '{}': {}", param, reason)
            }

            LevelError::FileNotFound(path) => {
                write!(f, "File not found: {}", path)
            }
            LevelError::FileRead(msg) => {
                write!(f, "File read error: {}", msg)
            }
            LevelError::FileWrite(msg) => {
                write!(f, "File write error: {}", msg)
            }

            LevelError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for LevelError {}

// Conversion implementations for common error types

impl From<io::Error> for LevelError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => LevelError::FileNotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => LevelError::FileRead(err.to_string()),
            _ => LevelError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for LevelError {
    fn from(err: serde_json::Error) -> Self {
        LevelError::DataParse(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for LevelError {
    fn from(err: toml::de::Error) -> Self {
        LevelError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<crate::config::ConfigError> for LevelError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileRead(msg) => LevelError::FileRead(msg),
            ConfigError::FileWrite(msg) | ConfigError::Serialize(msg) => LevelError::FileWrite(msg),
            ConfigError::Parse(msg) => LevelError::ConfigParse(msg),
            ConfigError::Validation(msg) => LevelError::ConfigValidation(msg),
        }
    }
}

impl From<String> for LevelError {
    fn from(msg: String) -> Self {
        LevelError::Internal(msg)
    }
}

impl From<&str> for LevelError {
    fn from(msg: &str) -> Self {
        LevelError::Internal(msg.to_string())
    }
}

/// Result type alias using LevelError
pub type LevelResult<T> = Result<T, LevelError>;
