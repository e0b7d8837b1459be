//! Error types and handling for Auriga
//!
//! This module defines the error types used throughout the crate,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Auriga operations
pub type Result<T> = std::result::Result<T, AurigaError>;

/// Main error type for Auriga
#[derive(Debug, Error)]
pub enum AurigaError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// OAuth2 exchange failures (bad credentials, user cancelled, MFA rejected)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// API returned an error status; carries the provider-supplied message
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Requested endpoint name absent from the registry
    #[error("Unknown endpoint name: {name}")]
    UnknownEndpoint { name: String },

    /// Vehicle-level failures (wake-up timeout, refused command)
    #[error("Vehicle error: {reason}")]
    Vehicle { reason: String },

    /// Energy product failures (refused command)
    #[error("Product error: {reason}")]
    Product { reason: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },
}

impl AurigaError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AurigaError::Config {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        AurigaError::Auth {
            message: message.into(),
        }
    }

    /// Create a new HTTP error carrying the provider status and message
    pub fn http<S: Into<String>>(status: u16, message: S) -> Self {
        AurigaError::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a new unknown-endpoint error
    pub fn unknown_endpoint<S: Into<String>>(name: S) -> Self {
        AurigaError::UnknownEndpoint { name: name.into() }
    }

    /// Create a new vehicle error
    pub fn vehicle<S: Into<String>>(reason: S) -> Self {
        AurigaError::Vehicle {
            reason: reason.into(),
        }
    }

    /// Create a new energy product error
    pub fn product<S: Into<String>>(reason: S) -> Self {
        AurigaError::Product {
            reason: reason.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AurigaError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        AurigaError::Network {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        AurigaError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AurigaError::Timeout {
            message: message.into(),
        }
    }

    /// Whether this error is an HTTP error with the given status code
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, AurigaError::Http { status, .. } if *status == code)
    }
}

impl From<std::io::Error> for AurigaError {
    fn from(err: std::io::Error) -> Self {
        AurigaError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AurigaError {
    fn from(err: serde_yaml::Error) -> Self {
        AurigaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AurigaError {
    fn from(err: serde_json::Error) -> Self {
        AurigaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AurigaError {
    fn from(err: reqwest::Error) -> Self {
        AurigaError::network(err.to_string())
    }
}

impl From<url::ParseError> for AurigaError {
    fn from(err: url::ParseError) -> Self {
        AurigaError::validation("url", err.to_string())
    }
}

impl From<chrono::ParseError> for AurigaError {
    fn from(err: chrono::ParseError) -> Self {
        AurigaError::validation("datetime", err.to_string())
    }
}
