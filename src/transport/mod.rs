//! Transport contract between the publisher and a hosting broker.
//!
//! Two implementations exist: [`HttpTransport`] talks to a real broker,
//! [`StubTransport`] simulates one in-process. Both expose identical status
//! semantics, so everything above this module depends only on [`Transport`].

mod http;
mod stub;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use http::HttpTransport;
pub use stub::{Clock, PhaseSchedule, StubTransport, SystemClock};

use crate::error::Result;

/// Lifecycle states of a publish job.
///
/// `Ready`, `Failed`, and `Cancelled` are terminal: no transition ever
/// leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Queued,
    Packaging,
    Uploading,
    Building,
    Deploying,
    Ready,
    Failed,
    Cancelled,
}

impl PublishStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Packaging => "packaging",
            Self::Uploading => "uploading",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this state admits no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of transport is serving a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// A real HTTP broker.
    Broker,
    /// The in-process simulator.
    Stub,
}

impl TransportKind {
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Stub)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Stub => "stub",
        }
    }
}

/// Everything a transport needs to start a publish job.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// The app being published.
    pub owner_id: i64,
    /// Lower-case hex SHA-256 of the archive bytes.
    pub content_hash: String,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// Display name forwarded to the broker.
    pub owner_name: Option<String>,
    /// Local project path; the simulator turns it into a viewable URL.
    pub local_path_hint: Option<String>,
}

/// Outcome of [`Transport::start`].
#[derive(Debug, Clone)]
pub struct StartResponse {
    pub job_id: String,
    pub status: PublishStatus,
    /// Present only when the transport requires a separate upload step.
    pub upload_url: Option<String>,
}

/// Outcome of [`Transport::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: PublishStatus,
    pub progress_percent: Option<u8>,
    pub message: Option<String>,
    /// Set once `status` is `Ready`.
    pub live_url: Option<String>,
    /// Set once `status` is `Failed`.
    pub error_message: Option<String>,
}

/// Outcome of [`Transport::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelResponse {
    pub success: bool,
    pub status: PublishStatus,
}

/// The three-operation contract every transport implements.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Register a new publish job. Returns immediately with `queued`.
    fn start(&self, request: &StartRequest) -> Result<StartResponse>;

    /// Report the current job state. Safe to call repeatedly; never
    /// advances a job except through elapsed time.
    fn status(&self, job_id: &str) -> Result<StatusResponse>;

    /// Request cancellation. Succeeds only before a terminal state;
    /// otherwise returns `success: false` with the current status.
    fn cancel(&self, job_id: &str) -> Result<CancelResponse>;

    /// Upload the archive to the target returned by [`Transport::start`].
    fn upload(&self, upload_url: &str, archive_path: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(PublishStatus::Ready.is_terminal());
        assert!(PublishStatus::Failed.is_terminal());
        assert!(PublishStatus::Cancelled.is_terminal());
        assert!(!PublishStatus::Queued.is_terminal());
        assert!(!PublishStatus::Deploying.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PublishStatus::Deploying).unwrap(),
            "\"deploying\""
        );
        let parsed: PublishStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(parsed, PublishStatus::Ready);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(PublishStatus::Packaging.to_string(), "packaging");
        assert_eq!(TransportKind::Stub.as_str(), "stub");
        assert!(TransportKind::Stub.is_simulated());
        assert!(!TransportKind::Broker.is_simulated());
    }
}
