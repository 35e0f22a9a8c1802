//! Error types and result aliases for sprig operations.
//!
//! `SprigError` covers infrastructure failures that abort an operation.
//! Per-library outcomes of a restore (a dependency that could not be found,
//! a rejected hash) are not errors in that sense; they are collected as
//! [`RestoreDiagnostic`] values and reported together.

use thiserror::Error;

use crate::types::VersionError;

pub mod diagnostic;

pub use diagnostic::RestoreDiagnostic;

/// Unified error type for all sprig operations
#[derive(Error, Debug)]
pub enum SprigError {
    // Config errors
    #[error("Failed to parse {path}: {message}")]
    ManifestParse { path: String, message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("The given root is invalid: {path}")]
    InvalidRoot { path: String },

    #[error(transparent)]
    Version(#[from] VersionError),

    // Source errors
    #[error("Package '{name}' not found")]
    PackageNotFound { name: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{operation} is not supported by {provider}")]
    Unsupported { operation: String, provider: String },

    // Cache errors
    #[error("Integrity check failed for {package}: expected {expected}, got {actual}")]
    IntegrityFailure {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to lock {path}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {message}")]
    Task { message: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for sprig operations
pub type SprigResult<T> = Result<T, SprigError>;

impl SprigError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create an error for a spawned task that panicked or was cancelled
    pub fn task(source: impl std::fmt::Display) -> Self {
        Self::Task {
            message: source.to_string(),
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            SprigError::PackageNotFound { .. } => {
                Some("Check the package name spelling and the configured sources")
            },
            SprigError::Network { .. } => Some("Check your internet connection and try again"),
            SprigError::InvalidRoot { .. } => {
                Some("Pass a directory, a sprig.toml or a sprig.lock.json path")
            },
            SprigError::IntegrityFailure { .. } => {
                Some("The source may be serving a different build; verify the pinned hash")
            },
            SprigError::Lock { .. } => {
                Some("Check that the packages directory is writable and supports file locks")
            },
            _ => None,
        }
    }
}
