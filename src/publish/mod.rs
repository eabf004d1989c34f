//! Publish orchestration.
//!
//! The [`Publisher`] owns the end-to-end flow: bundle the project, start a
//! job on the configured transport, upload the archive when the transport
//! asks for it, and track the job until a terminal status triggers cleanup.
//! The transport is the source of truth for status; this module only adds
//! side effects at the edges.

mod registry;

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use registry::{JobRegistry, RegisteredJob};

use crate::bundle::{self, BundleProgress, ExclusionPolicy};
use crate::config::Config;
use crate::error::{Result, ShipError};
use crate::transport::{
    HttpTransport, PublishStatus, StartRequest, StatusResponse, StubTransport, Transport,
    TransportKind,
};

/// How often the stub transport sweeps expired simulated jobs.
const STUB_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Persistence seam for recording the final live URL against the owning
/// app record. The embedding application supplies the real store.
pub trait UrlSink: Send + Sync {
    fn record_live_url(&self, owner_id: i64, url: &str) -> Result<()>;
}

/// Default [`UrlSink`] holding URLs in memory.
#[derive(Default)]
pub struct InMemoryUrlSink {
    urls: Mutex<HashMap<i64, String>>,
}

impl InMemoryUrlSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, owner_id: i64) -> Option<String> {
        self.urls.lock().get(&owner_id).cloned()
    }
}

impl UrlSink for InMemoryUrlSink {
    fn record_live_url(&self, owner_id: i64, url: &str) -> Result<()> {
        self.urls.lock().insert(owner_id, url.to_string());
        Ok(())
    }
}

/// Outcome of a successful [`Publisher::publish_start`].
#[derive(Debug, Clone, Serialize)]
pub struct StartedPublish {
    pub job_id: String,
    pub is_simulated: bool,
}

/// Poll result. Polling never throws: transport failures are encoded in
/// `status`/`error_message` so a UI can keep polling safely.
#[derive(Debug, Clone, Serialize)]
pub struct PublishStatusResult {
    pub job_id: String,
    pub status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Outcome of [`Publisher::publish_cancel`].
#[derive(Debug, Clone, Serialize)]
pub struct PublishCancelResult {
    pub job_id: String,
    pub success: bool,
    pub status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Redacted diagnostic record. Never contains the raw device credential.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub transport: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_fingerprint: Option<String>,
    pub owner_id: i64,
    pub registered_jobs: Vec<JobDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cleanup_warning: Option<String>,
}

/// Registry entry as surfaced through diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct JobDiagnostics {
    pub job_id: String,
    pub owner_id: i64,
    pub archive_path: String,
    pub archive_exists: bool,
    pub started_at: DateTime<Utc>,
    pub simulated: bool,
}

/// The publish orchestrator. Construct once at startup; the transport
/// strategy is selected here and nowhere else.
pub struct Publisher {
    transport: Arc<dyn Transport>,
    registry: JobRegistry,
    url_sink: Arc<dyn UrlSink>,
    policy: ExclusionPolicy,
    output_dir: PathBuf,
    broker_url: Option<String>,
    device_token: Option<String>,
    last_cleanup_warning: Mutex<Option<String>>,
}

impl Publisher {
    /// Build a publisher with an explicit transport and URL sink.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        url_sink: Arc<dyn UrlSink>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            transport,
            registry: JobRegistry::new(),
            url_sink,
            policy: ExclusionPolicy::standard(),
            output_dir,
            broker_url: None,
            device_token: None,
            last_cleanup_warning: Mutex::new(None),
        }
    }

    /// Select the transport from configuration: a real broker when both URL
    /// and device token are present, the in-process simulator otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (transport, broker_url, device_token): (Arc<dyn Transport>, _, _) =
            match config.broker_settings()? {
                Some(settings) => {
                    info!(broker = %settings.url, "publishing against broker");
                    (
                        Arc::new(HttpTransport::new(&settings)),
                        Some(settings.url),
                        Some(settings.device_token),
                    )
                }
                None => {
                    info!("no broker configured; publishing against local simulator");
                    let stub =
                        Arc::new(StubTransport::new().with_retention(config.stub_retention()));
                    drop(StubTransport::spawn_sweeper(&stub, STUB_SWEEP_INTERVAL));
                    (stub, None, None)
                }
            };

        let mut publisher = Self::new(
            transport,
            Arc::new(InMemoryUrlSink::new()),
            config.output_dir(),
        );
        publisher.broker_url = broker_url;
        publisher.device_token = device_token;
        Ok(publisher)
    }

    /// Replace the URL sink (e.g., with the embedder's persistence layer).
    #[must_use]
    pub fn with_url_sink(mut self, url_sink: Arc<dyn UrlSink>) -> Self {
        self.url_sink = url_sink;
        self
    }

    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Bundle `source_dir` and start a publish job for `owner_id`.
    ///
    /// Blocks through bundling, job creation, and (when the transport asks
    /// for one) the archive upload; the returned job is already past the
    /// upload step. Any failure before that point aborts the attempt with
    /// nothing registered and the partial archive removed.
    pub fn publish_start(
        &self,
        owner_id: i64,
        source_dir: &std::path::Path,
    ) -> Result<StartedPublish> {
        self.publish_start_with_progress(owner_id, source_dir, |_| {})
    }

    /// [`Publisher::publish_start`] with bundling progress callbacks.
    pub fn publish_start_with_progress(
        &self,
        owner_id: i64,
        source_dir: &std::path::Path,
        on_progress: impl FnMut(BundleProgress),
    ) -> Result<StartedPublish> {
        let archive_path = self
            .output_dir
            .join(format!("bundle-{owner_id}-{}.tar.gz", Uuid::new_v4()));

        let bundle_info =
            match bundle::create_bundle(source_dir, &archive_path, &self.policy, on_progress) {
                Ok(info) => info,
                Err(err) => {
                    remove_archive_best_effort(&archive_path);
                    return Err(err);
                }
            };
        info!(
            owner_id,
            file_count = bundle_info.file_count,
            size_bytes = bundle_info.size_bytes,
            hash = %bundle_info.content_hash,
            "bundle created"
        );

        let owner_name = source_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let request = StartRequest {
            owner_id,
            content_hash: bundle_info.content_hash.clone(),
            size_bytes: bundle_info.size_bytes,
            owner_name,
            local_path_hint: Some(source_dir.to_string_lossy().into_owned()),
        };

        let response = match self.transport.start(&request) {
            Ok(response) => response,
            Err(err) => {
                remove_archive_best_effort(&archive_path);
                return Err(err);
            }
        };

        if let Some(upload_url) = &response.upload_url {
            if let Err(err) = self.transport.upload(upload_url, &archive_path) {
                // The broker-side job already exists; cancel it rather than
                // leaving it orphaned in `queued`.
                match self.transport.cancel(&response.job_id) {
                    Ok(_) => debug!(job_id = %response.job_id, "cancelled job after failed upload"),
                    Err(cancel_err) => warn!(
                        job_id = %response.job_id,
                        error = %cancel_err,
                        "could not cancel job after failed upload"
                    ),
                }
                remove_archive_best_effort(&archive_path);
                return Err(err);
            }
        }

        let is_simulated = self.transport.kind().is_simulated();
        self.registry.insert(RegisteredJob {
            job_id: response.job_id.clone(),
            owner_id,
            archive_path,
            started_at: Utc::now(),
            simulated: is_simulated,
        });
        info!(job_id = %response.job_id, owner_id, simulated = is_simulated, "publish started");

        Ok(StartedPublish {
            job_id: response.job_id,
            is_simulated,
        })
    }

    /// Poll a job. On the first terminal status, persists the live URL (if
    /// `ready`), deletes the archive, and drops the registry entry; repeat
    /// polls are safe and return the same terminal outcome.
    pub fn publish_status(&self, job_id: &str) -> PublishStatusResult {
        match self.transport.status(job_id) {
            Ok(response) => {
                if response.status.is_terminal() {
                    self.finalize(job_id, &response);
                }
                PublishStatusResult {
                    job_id: job_id.to_string(),
                    status: response.status,
                    progress_percent: response.progress_percent,
                    message: response.message,
                    live_url: response.live_url,
                    error_message: response.error_message,
                }
            }
            Err(err @ (ShipError::JobNotFound(_) | ShipError::NotFound(_))) => {
                // The transport no longer knows the job (process restart or
                // broker-side expiry). Reclaim local bookkeeping if any.
                if let Some(job) = self.registry.remove(job_id) {
                    self.delete_archive(&job);
                }
                PublishStatusResult {
                    job_id: job_id.to_string(),
                    status: PublishStatus::Failed,
                    progress_percent: None,
                    message: None,
                    live_url: None,
                    error_message: Some(err.to_string()),
                }
            }
            Err(err) => PublishStatusResult {
                job_id: job_id.to_string(),
                status: PublishStatus::Failed,
                progress_percent: None,
                message: None,
                live_url: None,
                error_message: Some(err.to_string()),
            },
        }
    }

    /// Cancel a job. On success, performs the same cleanup as a terminal
    /// status poll.
    pub fn publish_cancel(&self, job_id: &str) -> PublishCancelResult {
        match self.transport.cancel(job_id) {
            Ok(response) => {
                if response.success {
                    self.finalize(
                        job_id,
                        &StatusResponse {
                            status: PublishStatus::Cancelled,
                            progress_percent: None,
                            message: None,
                            live_url: None,
                            error_message: None,
                        },
                    );
                }
                PublishCancelResult {
                    job_id: job_id.to_string(),
                    success: response.success,
                    status: response.status,
                    error_message: None,
                }
            }
            Err(err) => PublishCancelResult {
                job_id: job_id.to_string(),
                success: false,
                status: PublishStatus::Failed,
                error_message: Some(err.to_string()),
            },
        }
    }

    /// Redacted diagnostics for support bundles. Includes only the token
    /// length and a short one-way fingerprint, never the credential.
    #[must_use]
    pub fn publish_diagnostics(&self, job_id: Option<&str>, owner_id: i64) -> DiagnosticsReport {
        let registered_jobs = self
            .registry
            .jobs_for_owner(owner_id)
            .into_iter()
            .map(job_diagnostics)
            .collect();

        let job = job_id.and_then(|id| self.registry.get(id).map(job_diagnostics));
        let job_status = job_id.map(|id| match self.transport.status(id) {
            Ok(response) => response.status.to_string(),
            Err(err) => format!("unavailable: {err}"),
        });

        DiagnosticsReport {
            transport: self.transport.kind().as_str(),
            broker_url: self.broker_url.clone(),
            credential_len: self.device_token.as_ref().map(String::len),
            credential_fingerprint: self.device_token.as_deref().map(credential_fingerprint),
            owner_id,
            registered_jobs,
            job,
            job_status,
            last_cleanup_warning: self.last_cleanup_warning.lock().clone(),
        }
    }

    /// Cleanup on the first terminal observation. The atomic registry
    /// removal decides which caller does the physical work; losers no-op.
    fn finalize(&self, job_id: &str, response: &StatusResponse) {
        let Some(job) = self.registry.remove(job_id) else {
            return;
        };

        if response.status == PublishStatus::Ready {
            if let Some(url) = &response.live_url {
                match self.url_sink.record_live_url(job.owner_id, url) {
                    Ok(()) => debug!(owner_id = job.owner_id, url = %url, "live URL recorded"),
                    Err(err) => warn!(
                        owner_id = job.owner_id,
                        error = %err,
                        "failed to record live URL"
                    ),
                }
            }
        }

        self.delete_archive(&job);
        info!(job_id = %job.job_id, status = %response.status, "publish finished");
    }

    fn delete_archive(&self, job: &RegisteredJob) {
        match fs::remove_file(&job.archive_path) {
            Ok(()) => debug!(archive = %job.archive_path.display(), "archive deleted"),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(archive = %job.archive_path.display(), "archive already removed");
            }
            Err(err) => {
                let warning = format!(
                    "could not delete archive {}: {err}",
                    job.archive_path.display()
                );
                warn!(job_id = %job.job_id, "{warning}");
                *self.last_cleanup_warning.lock() = Some(warning);
            }
        }
    }
}

fn job_diagnostics(job: RegisteredJob) -> JobDiagnostics {
    JobDiagnostics {
        archive_exists: job.archive_path.exists(),
        archive_path: job.archive_path.display().to_string(),
        job_id: job.job_id,
        owner_id: job.owner_id,
        started_at: job.started_at,
        simulated: job.simulated,
    }
}

fn remove_archive_best_effort(path: &std::path::Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != ErrorKind::NotFound {
            warn!(archive = %path.display(), error = %err, "could not remove partial archive");
        }
    }
}

/// First 12 hex chars of SHA-256; enough to correlate, impossible to invert.
fn credential_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;
    use std::path::Path;
    use tempfile::tempdir;

    fn make_project(root: &Path) {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("index.html"), "<html></html>").unwrap();
        fs::write(root.join("src/app.js"), "console.log('hi')").unwrap();
        fs::write(root.join("src/style.css"), "body {}").unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "x").unwrap();
    }

    fn simulated_publisher(
        output_dir: PathBuf,
    ) -> (Arc<ManualClock>, Arc<InMemoryUrlSink>, Publisher) {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(StubTransport::with_clock(clock.clone()));
        let sink = Arc::new(InMemoryUrlSink::new());
        let publisher = Publisher::new(transport, sink.clone(), output_dir);
        (clock, sink, publisher)
    }

    #[test]
    fn start_bundles_and_registers_job() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("my-app");
        make_project(&project);
        let (_clock, _sink, publisher) = simulated_publisher(dir.path().join("out"));

        let started = publisher.publish_start(1, &project).unwrap();
        assert!(started.is_simulated);

        let job = publisher.registry.get(&started.job_id).unwrap();
        assert_eq!(job.owner_id, 1);
        assert!(job.archive_path.exists());

        let status = publisher.publish_status(&started.job_id);
        assert_eq!(status.status, PublishStatus::Queued);
    }

    #[test]
    fn terminal_status_cleans_up_exactly_once() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("my-app");
        make_project(&project);
        let (clock, sink, publisher) = simulated_publisher(dir.path().join("out"));

        let started = publisher.publish_start(1, &project).unwrap();
        let archive_path = publisher.registry.get(&started.job_id).unwrap().archive_path;

        clock.advance(Duration::from_secs(60));
        let first = publisher.publish_status(&started.job_id);
        assert_eq!(first.status, PublishStatus::Ready);
        let url = first.live_url.clone().unwrap();

        assert!(!archive_path.exists());
        assert!(publisher.registry.is_empty());
        assert_eq!(sink.get(1).as_deref(), Some(url.as_str()));

        // Repeat polls stay terminal with the same URL and never error.
        for _ in 0..3 {
            let again = publisher.publish_status(&started.job_id);
            assert_eq!(again.status, PublishStatus::Ready);
            assert_eq!(again.live_url.as_deref(), Some(url.as_str()));
        }
    }

    #[test]
    fn cancel_cleans_up_and_sticks() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("my-app");
        make_project(&project);
        let (clock, sink, publisher) = simulated_publisher(dir.path().join("out"));

        let started = publisher.publish_start(1, &project).unwrap();
        let archive_path = publisher.registry.get(&started.job_id).unwrap().archive_path;

        clock.advance(Duration::from_secs(3));
        let cancelled = publisher.publish_cancel(&started.job_id);
        assert!(cancelled.success);
        assert_eq!(cancelled.status, PublishStatus::Cancelled);

        assert!(!archive_path.exists());
        assert!(publisher.registry.is_empty());
        assert!(sink.get(1).is_none());

        clock.advance(Duration::from_secs(120));
        let status = publisher.publish_status(&started.job_id);
        assert_eq!(status.status, PublishStatus::Cancelled);

        let again = publisher.publish_cancel(&started.job_id);
        assert!(!again.success);
    }

    #[test]
    fn bundling_failure_registers_nothing() {
        let dir = tempdir().unwrap();
        let (_clock, _sink, publisher) = simulated_publisher(dir.path().join("out"));

        let err = publisher
            .publish_start(1, &dir.path().join("does-not-exist"))
            .unwrap_err();
        assert!(matches!(err, ShipError::Bundling(_)));
        assert!(publisher.registry.is_empty());
    }

    #[test]
    fn unknown_job_polls_as_failed_result() {
        let dir = tempdir().unwrap();
        let (_clock, _sink, publisher) = simulated_publisher(dir.path().join("out"));

        let result = publisher.publish_status("no-such-job");
        assert_eq!(result.status, PublishStatus::Failed);
        assert!(result.error_message.unwrap().contains("no-such-job"));

        let cancel = publisher.publish_cancel("no-such-job");
        assert!(!cancel.success);
    }

    #[test]
    fn diagnostics_redact_the_credential() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("my-app");
        make_project(&project);
        let (_clock, _sink, mut publisher) = simulated_publisher(dir.path().join("out"));
        publisher.broker_url = Some("https://broker.example".to_string());
        publisher.device_token = Some("super-secret-token".to_string());

        let started = publisher.publish_start(9, &project).unwrap();
        let report = publisher.publish_diagnostics(Some(&started.job_id), 9);

        assert_eq!(report.transport, "stub");
        assert_eq!(report.credential_len, Some(18));
        let fingerprint = report.credential_fingerprint.clone().unwrap();
        assert_eq!(fingerprint.len(), 12);
        assert_ne!(fingerprint, "super-secret-token");

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("super-secret-token"));
        assert_eq!(report.registered_jobs.len(), 1);
        assert!(report.job.is_some());
        assert_eq!(report.job_status.as_deref(), Some("queued"));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = credential_fingerprint("token-a");
        let b = credential_fingerprint("token-a");
        let c = credential_fingerprint("token-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
