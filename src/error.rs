//! Error types for the ONVIF client core
//!
//! This module provides structured error handling for discovery and
//! authenticated transport, with classification helpers for callers that
//! need to decide whether to retry or re-prompt for credentials.

use thiserror::Error;

/// Result type alias for ONVIF client operations
pub type Result<T> = std::result::Result<T, OnvifError>;

/// Error types for ONVIF discovery and transport operations
#[derive(Error, Debug)]
pub enum OnvifError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Network discovery errors
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Network interface resolution errors
    #[error("Network interface not found: {0}")]
    InterfaceNotFound(String),

    /// Wire format parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Operation cancelled by the caller
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found errors (resources, snapshot URIs, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream device returned an unexpected status
    #[error("Device error: {0}")]
    Upstream(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl OnvifError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a discovery error
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create an interface resolution error
    pub fn interface_not_found<S: Into<String>>(msg: S) -> Self {
        Self::InterfaceNotFound(msg.into())
    }

    /// Create a parsing error
    pub fn parsing<S: Into<String>>(msg: S) -> Self {
        Self::Parsing(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an upstream device error
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::Upstream(msg.into())
    }

    /// Check if this error is potentially recoverable by retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            OnvifError::Connection(_) | OnvifError::Timeout(_) | OnvifError::Io(_) => true,
            OnvifError::Http(e) => e.is_timeout() || e.is_connect(),
            OnvifError::Upstream(_) => true,
            _ => false,
        }
    }

    /// Check if this error indicates an authentication problem
    pub fn is_auth_error(&self) -> bool {
        match self {
            OnvifError::Authentication(_) => true,
            OnvifError::Http(e) => e.status().is_some_and(|s| {
                s == reqwest::StatusCode::UNAUTHORIZED || s == reqwest::StatusCode::FORBIDDEN
            }),
            _ => false,
        }
    }

    /// Check if this error was caused by caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OnvifError::Cancelled(_))
    }
}
