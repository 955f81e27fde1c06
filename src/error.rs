//! Error types for Lockstep
//!
//! Defines a unified error type for history loading, parsing and reporting.
//! Scheduling itself never fails once a history has been parsed: conflicts,
//! deadlocks and dropped operations are reported as notices, not errors.

use std::fmt;
use std::io;

/// Unified error type for Lockstep operations
#[derive(Debug)]
pub enum LockstepError {
    /// I/O error (reading history files)
    Io(io::Error),
    /// Malformed history token
    Syntax {
        /// Byte offset of the offending token in the history text
        position: usize,
        /// Offending token text
        token: String,
        /// What was expected instead
        message: String,
    },
    /// JSON serialization error
    Json(String),
    /// Invalid configuration value (e.g. unknown policy name)
    Config(String),
}

impl LockstepError {
    /// Create a syntax error for the token starting at `position`
    pub fn syntax(position: usize, token: &str, message: impl Into<String>) -> Self {
        LockstepError::Syntax {
            position,
            token: token.to_string(),
            message: message.into(),
        }
    }

    /// Create an "unknown value for option" configuration error
    pub fn unknown_option_value(option: &str, value: &str) -> Self {
        LockstepError::Config(format!("Unknown value '{}' for {}", value, option))
    }
}

impl fmt::Display for LockstepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockstepError::Io(e) => write!(f, "{}", e),
            LockstepError::Syntax { position, token, message } => write!(
                f,
                "Invalid input: '{}' at position {}: {}",
                token, position, message
            ),
            LockstepError::Json(msg) => write!(f, "{}", msg),
            LockstepError::Config(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LockstepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockstepError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LockstepError {
    fn from(e: io::Error) -> Self {
        LockstepError::Io(e)
    }
}

impl From<serde_json::Error> for LockstepError {
    fn from(e: serde_json::Error) -> Self {
        LockstepError::Json(e.to_string())
    }
}

/// Result type alias for Lockstep operations
pub type Result<T> = std::result::Result<T, LockstepError>;
