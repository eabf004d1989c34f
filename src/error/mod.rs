//! Error handling for shipkit.
//!
//! This module provides:
//! - [`ShipError`]: The main error enum for all publish operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing, each
//!   carrying a remediation hint

mod codes;

use std::io;

use thiserror::Error;

pub use codes::ErrorCode;

/// Main error type for shipkit operations.
#[derive(Error, Debug)]
pub enum ShipError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Bundling failed: {0}")]
    Bundling(String),

    #[error("Authentication with broker failed: {0}")]
    AuthenticationFailed(String),

    #[error("Access denied by broker: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by broker: {0}")]
    RateLimited(String),

    #[error("Broker misconfigured: {0}")]
    BrokerMisconfigured(String),

    #[error("Broker unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Broker error: {0}")]
    UnknownBroker(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShipError {
    /// Get the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::IoError,
            Self::Bundling(_) => ErrorCode::BundleFailed,
            Self::AuthenticationFailed(_) => ErrorCode::AuthFailed,
            Self::AccessDenied(_) => ErrorCode::AccessDenied,
            Self::NotFound(_) => ErrorCode::BrokerNotFound,
            Self::RateLimited(_) => ErrorCode::RateLimited,
            Self::BrokerMisconfigured(_) => ErrorCode::BrokerMisconfigured,
            Self::ServiceUnavailable(_) => ErrorCode::BrokerUnavailable,
            Self::Protocol(_) => ErrorCode::ProtocolMismatch,
            Self::UnknownBroker(_) => ErrorCode::BrokerUnknown,
            Self::Upload(_) => ErrorCode::UploadFailed,
            Self::JobNotFound(_) => ErrorCode::JobNotFound,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::Json(_) => ErrorCode::SerializationError,
        }
    }

    /// Actionable remediation hint for this error.
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        self.code().suggestion()
    }
}

/// Result type alias using ShipError.
pub type Result<T> = std::result::Result<T, ShipError>;
