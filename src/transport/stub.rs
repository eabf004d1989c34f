//! In-process broker simulator.
//!
//! Lets publishing work end-to-end without a configured broker. Jobs are
//! held in an in-memory table and their status is recomputed purely from
//! elapsed time against a fixed phase schedule, so polling has no side
//! effects and the simulation is testable with an injected clock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, ShipError};
use crate::transport::{
    CancelResponse, PublishStatus, StartRequest, StartResponse, StatusResponse, Transport,
    TransportKind,
};

/// Time source for the simulation. Injected in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Ordered non-terminal phases with nominal durations. Once total elapsed
/// time exceeds the sum, the job is permanently `ready`.
#[derive(Debug, Clone)]
pub struct PhaseSchedule {
    phases: Vec<(PublishStatus, Duration)>,
}

impl PhaseSchedule {
    /// The schedule used outside of tests: a publish takes ~18s end to end.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            phases: vec![
                (PublishStatus::Queued, Duration::from_secs(2)),
                (PublishStatus::Packaging, Duration::from_secs(3)),
                (PublishStatus::Uploading, Duration::from_secs(4)),
                (PublishStatus::Building, Duration::from_secs(6)),
                (PublishStatus::Deploying, Duration::from_secs(3)),
            ],
        }
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }

    /// Status and overall progress for a given elapsed time.
    ///
    /// Progress interpolates linearly within the current phase; a finished
    /// run reports `(Ready, 100)`.
    #[must_use]
    pub fn at(&self, elapsed: Duration) -> (PublishStatus, u8) {
        let total = self.total();
        if elapsed >= total {
            return (PublishStatus::Ready, 100);
        }

        let mut cumulative = Duration::ZERO;
        for (status, duration) in &self.phases {
            cumulative += *duration;
            if elapsed < cumulative {
                let percent = (elapsed.as_secs_f64() / total.as_secs_f64() * 100.0) as u8;
                return (*status, percent.min(99));
            }
        }

        (PublishStatus::Ready, 100)
    }
}

impl Default for PhaseSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

struct StubJob {
    owner_id: i64,
    started_at: Instant,
    cancelled: bool,
    local_path_hint: Option<String>,
}

/// The simulator. Construct once at startup and share via `Arc`.
pub struct StubTransport {
    jobs: Mutex<HashMap<String, StubJob>>,
    schedule: PhaseSchedule,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl StubTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            schedule: PhaseSchedule::standard(),
            retention: Duration::from_secs(3600),
            clock,
        }
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: PhaseSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Drop simulated jobs older than the retention window.
    ///
    /// Runs independently of polling to bound memory; returns how many
    /// jobs were discarded.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| now.saturating_duration_since(job.started_at) <= self.retention);
        let swept = before - jobs.len();
        if swept > 0 {
            debug!(swept, "discarded expired simulated jobs");
        }
        swept
    }

    /// Spawn a background thread sweeping every `interval` until the
    /// transport is dropped.
    pub fn spawn_sweeper(this: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(this);
        thread::spawn(move || {
            loop {
                thread::sleep(interval);
                match weak.upgrade() {
                    Some(stub) => {
                        stub.sweep_expired();
                    }
                    None => break,
                }
            }
        })
    }

    fn live_url(job_id: &str, hint: Option<&str>) -> String {
        match hint {
            Some(path) => normalize_file_url(path),
            None => format!("stub://local/{job_id}"),
        }
    }

    fn phase_message(status: PublishStatus) -> &'static str {
        match status {
            PublishStatus::Queued => "waiting in queue",
            PublishStatus::Packaging => "packaging bundle",
            PublishStatus::Uploading => "uploading bundle",
            PublishStatus::Building => "building app",
            PublishStatus::Deploying => "deploying app",
            PublishStatus::Ready => "publish complete",
            PublishStatus::Failed => "publish failed",
            PublishStatus::Cancelled => "publish cancelled",
        }
    }
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StubTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stub
    }

    fn start(&self, request: &StartRequest) -> Result<StartResponse> {
        let job_id = Uuid::new_v4().to_string();
        let job = StubJob {
            owner_id: request.owner_id,
            started_at: self.clock.now(),
            cancelled: false,
            local_path_hint: request.local_path_hint.clone(),
        };
        debug!(
            job_id = %job_id,
            owner_id = job.owner_id,
            hash = %request.content_hash,
            "simulated publish started"
        );
        self.jobs.lock().insert(job_id.clone(), job);

        Ok(StartResponse {
            job_id,
            status: PublishStatus::Queued,
            upload_url: None,
        })
    }

    fn status(&self, job_id: &str) -> Result<StatusResponse> {
        let jobs = self.jobs.lock();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| ShipError::JobNotFound(job_id.to_string()))?;

        if job.cancelled {
            return Ok(StatusResponse {
                status: PublishStatus::Cancelled,
                progress_percent: None,
                message: Some(Self::phase_message(PublishStatus::Cancelled).to_string()),
                live_url: None,
                error_message: None,
            });
        }

        let elapsed = self.clock.now().saturating_duration_since(job.started_at);
        let (status, percent) = self.schedule.at(elapsed);

        let live_url = if status == PublishStatus::Ready {
            Some(Self::live_url(job_id, job.local_path_hint.as_deref()))
        } else {
            None
        };

        Ok(StatusResponse {
            status,
            progress_percent: Some(percent),
            message: Some(Self::phase_message(status).to_string()),
            live_url,
            error_message: None,
        })
    }

    fn cancel(&self, job_id: &str) -> Result<CancelResponse> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| ShipError::JobNotFound(job_id.to_string()))?;

        if job.cancelled {
            return Ok(CancelResponse {
                success: false,
                status: PublishStatus::Cancelled,
            });
        }

        let elapsed = self.clock.now().saturating_duration_since(job.started_at);
        let (current, _) = self.schedule.at(elapsed);
        if current.is_terminal() {
            return Ok(CancelResponse {
                success: false,
                status: current,
            });
        }

        job.cancelled = true;
        debug!(job_id = %job_id, "simulated publish cancelled");
        Ok(CancelResponse {
            success: true,
            status: PublishStatus::Cancelled,
        })
    }

    fn upload(&self, _upload_url: &str, _archive_path: &Path) -> Result<()> {
        Err(ShipError::Protocol(
            "stub transport has no separate upload step".to_string(),
        ))
    }
}

/// Turn a local path into a `file:///` URL: backslashes become forward
/// slashes and duplicate slashes collapse.
fn normalize_file_url(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let mut collapsed = String::with_capacity(forward.len());
    let mut prev_slash = false;
    for c in forward.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(c);
    }
    format!("file:///{}", collapsed.trim_start_matches('/'))
}
