//! Error types for the migration engine
//!
//! Every failure aborts the transition in progress. The variants follow the
//! order in which an invocation can fail: configuration and state loading,
//! model extraction, verification, SQL execution, and finally consistency
//! problems discovered after the database has already been changed.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors raised by the migration engine
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Unreadable, unparseable or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unreadable or unparseable schema state
    #[error("State error in {path}: {message}")]
    State { path: PathBuf, message: String },

    /// Model source could not be read or parsed
    #[error("Extraction error in {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// Live schema or strict-mode model check failed
    #[error("Verification failed: {0}")]
    Verification(String),

    /// SQL script failed to execute
    #[error("Execution of {script} failed: {message}")]
    Execution { script: String, message: String },

    /// Recorded state drifted from the database after a partial commit
    #[error("Consistency error at version {version}: {message}. Manual correction required")]
    Consistency { version: u32, message: String },

    /// Rollback request that cannot be satisfied
    #[error("Rollback error: {0}")]
    Rollback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MigrateError {
    /// Create a configuration error
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a state error for the given file
    pub fn state<T: ToString>(path: impl Into<PathBuf>, msg: T) -> Self {
        Self::State {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Create an extraction error for the given source file
    pub fn extraction<T: ToString>(path: impl Into<PathBuf>, msg: T) -> Self {
        Self::Extraction {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Create a verification error
    pub fn verification<T: ToString>(msg: T) -> Self {
        Self::Verification(msg.to_string())
    }

    /// Create an execution error for the given script
    pub fn execution<T: ToString>(script: impl Into<String>, msg: T) -> Self {
        Self::Execution {
            script: script.into(),
            message: msg.to_string(),
        }
    }

    /// Create a consistency error
    pub fn consistency<T: ToString>(version: u32, msg: T) -> Self {
        Self::Consistency {
            version,
            message: msg.to_string(),
        }
    }

    /// Create a rollback error
    pub fn rollback<T: ToString>(msg: T) -> Self {
        Self::Rollback(msg.to_string())
    }

    /// Whether the database may already differ from the recorded state
    pub fn requires_operator(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_error_message() {
        let err = MigrateError::consistency(4, "config version not updated");
        assert!(err.requires_operator());
        assert_eq!(
            err.to_string(),
            "Consistency error at version 4: config version not updated. Manual correction required"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MigrateError = io.into();
        assert!(matches!(err, MigrateError::Io(_)));
        assert!(!err.requires_operator());
    }
}
