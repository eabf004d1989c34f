//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Bundle errors
//! - 2xx: Broker/transport errors
//! - 3xx: Config errors
//! - 4xx: Job errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes attached to every [`crate::ShipError`].
///
/// Each variant maps to a numeric code (e.g., `AuthFailed` -> E201) and
/// carries a remediation hint via [`ErrorCode::suggestion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Bundle errors (1xx)
    // ========================================
    /// E101: Source directory unreadable, output path uncreatable, or the
    /// archive writer failed
    BundleFailed,

    // ========================================
    // Broker/transport errors (2xx)
    // ========================================
    /// E201: Broker rejected the device credential
    AuthFailed,
    /// E202: Device is authenticated but not allowed to publish this app
    AccessDenied,
    /// E203: Broker does not know the requested resource
    BrokerNotFound,
    /// E204: Broker is throttling this device
    RateLimited,
    /// E205: The broker itself lacks required configuration
    BrokerMisconfigured,
    /// E206: Broker is temporarily unavailable
    BrokerUnavailable,
    /// E207: Broker response did not match the expected schema
    ProtocolMismatch,
    /// E208: Broker returned an unclassifiable failure
    BrokerUnknown,
    /// E209: Job was created but the archive upload failed
    UploadFailed,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: Config file has invalid syntax or values
    ConfigInvalid,
    /// E302: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Job errors (4xx)
    // ========================================
    /// E401: No job with the given id is tracked
    JobNotFound,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: Filesystem operation failed
    IoError,
    /// E902: Serialization/deserialization failed
    SerializationError,
}

impl ErrorCode {
    /// Numeric code for this error (e.g., 201 for `AuthFailed`).
    #[must_use]
    pub fn numeric(&self) -> u16 {
        match self {
            Self::BundleFailed => 101,
            Self::AuthFailed => 201,
            Self::AccessDenied => 202,
            Self::BrokerNotFound => 203,
            Self::RateLimited => 204,
            Self::BrokerMisconfigured => 205,
            Self::BrokerUnavailable => 206,
            Self::ProtocolMismatch => 207,
            Self::BrokerUnknown => 208,
            Self::UploadFailed => 209,
            Self::ConfigInvalid => 301,
            Self::ConfigMissingRequired => 302,
            Self::JobNotFound => 401,
            Self::IoError => 901,
            Self::SerializationError => 902,
        }
    }

    /// Category name for grouping (e.g., "broker").
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self.numeric() {
            100..=199 => "bundle",
            200..=299 => "broker",
            300..=399 => "config",
            400..=499 => "job",
            _ => "internal",
        }
    }

    /// Actionable remediation hint for this error class.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::BundleFailed => {
                "Check that the project directory is readable and the output directory is writable"
            }
            Self::AuthFailed => {
                "Check the device token configuration ([broker].device_token in shipkit.toml or SHIPKIT_DEVICE_TOKEN)"
            }
            Self::AccessDenied => {
                "This device is not allowed to publish the requested app; verify the owner id"
            }
            Self::BrokerNotFound => {
                "The broker does not know this resource; it may have expired server-side"
            }
            Self::RateLimited => "Too many publish requests; wait a moment before retrying",
            Self::BrokerMisconfigured => {
                "The broker itself is missing required configuration; contact the hosting operator"
            }
            Self::BrokerUnavailable => "The broker is temporarily unavailable; retry later",
            Self::ProtocolMismatch => {
                "The broker returned an unexpected response shape; check that client and broker versions match"
            }
            Self::BrokerUnknown => "Unexpected broker response; re-run with -v and inspect the logs",
            Self::UploadFailed => {
                "Bundling and job creation succeeded but the archive upload failed; retry the publish"
            }
            Self::ConfigInvalid => "Fix the invalid value in shipkit.toml",
            Self::ConfigMissingRequired => {
                "Set both [broker].url and [broker].device_token to use a real broker, or leave both unset to publish against the local simulator"
            }
            Self::JobNotFound => {
                "The job is no longer tracked; it may have finished in a previous run or expired"
            }
            Self::IoError => "Check file permissions and free disk space",
            Self::SerializationError => {
                "Re-run with -v; this usually indicates a corrupted response or file"
            }
        }
    }

    /// Whether the user can plausibly recover by acting on the suggestion.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::BrokerUnknown | Self::ProtocolMismatch)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.numeric())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_are_unique() {
        let all = [
            ErrorCode::BundleFailed,
            ErrorCode::AuthFailed,
            ErrorCode::AccessDenied,
            ErrorCode::BrokerNotFound,
            ErrorCode::RateLimited,
            ErrorCode::BrokerMisconfigured,
            ErrorCode::BrokerUnavailable,
            ErrorCode::ProtocolMismatch,
            ErrorCode::BrokerUnknown,
            ErrorCode::UploadFailed,
            ErrorCode::ConfigInvalid,
            ErrorCode::ConfigMissingRequired,
            ErrorCode::JobNotFound,
            ErrorCode::IoError,
            ErrorCode::SerializationError,
        ];
        let mut seen = std::collections::HashSet::new();
        for code in all {
            assert!(seen.insert(code.numeric()), "duplicate code {code}");
        }
    }

    #[test]
    fn display_uses_numeric_code() {
        assert_eq!(ErrorCode::AuthFailed.to_string(), "E201");
        assert_eq!(ErrorCode::BundleFailed.to_string(), "E101");
    }

    #[test]
    fn categories_follow_ranges() {
        assert_eq!(ErrorCode::BundleFailed.category(), "bundle");
        assert_eq!(ErrorCode::RateLimited.category(), "broker");
        assert_eq!(ErrorCode::ConfigInvalid.category(), "config");
        assert_eq!(ErrorCode::JobNotFound.category(), "job");
        assert_eq!(ErrorCode::IoError.category(), "internal");
    }

    #[test]
    fn suggestions_are_nonempty() {
        assert!(!ErrorCode::AuthFailed.suggestion().is_empty());
        assert!(ErrorCode::AuthFailed.suggestion().contains("device token"));
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::BrokerMisconfigured).unwrap();
        assert_eq!(json, "\"BROKER_MISCONFIGURED\"");
    }
}
