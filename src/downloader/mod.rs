//! Core evidence pipeline split into focused submodules.
//!
//! The `EvidenceDownloader` struct and its methods are organized by stage:
//! - [`discovery`] - Test run listing and cutoff filtering
//! - [`lookup`] - Step and run-level evidence enumeration
//! - [`fetch`] - Streaming a single evidence file to disk
//! - [`orchestration`] - Batch dispatch across the bounded worker pool

mod discovery;
mod fetch;
mod lookup;
mod orchestration;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::audit_log::AuditLog;
use crate::config::Config;
use crate::date_filter::{Clock, SystemClock};
use crate::error::Result;
use crate::service::{HttpTestService, TestManagementService};
use crate::types::{BatchSummary, Credential, DownloadOutcome, Event, RunDescriptor};
use crate::utils::sanitize_segment;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Failure and throughput counters shared by the tasks of one batch
#[derive(Debug, Default)]
pub(crate) struct BatchStats {
    remote_failures: AtomicUsize,
    malformed_dates: AtomicUsize,
    downloads_succeeded: AtomicUsize,
    downloads_failed: AtomicUsize,
    bytes_written: AtomicU64,
}

impl BatchStats {
    pub(crate) fn record_remote_failure(&self) {
        self.remote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_date(&self) {
        self.malformed_dates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: &DownloadOutcome) {
        if outcome.success {
            self.downloads_succeeded.fetch_add(1, Ordering::Relaxed);
            self.bytes_written
                .fetch_add(outcome.byte_count, Ordering::Relaxed);
        } else {
            self.downloads_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the counters into `summary`
    pub(crate) fn fill(&self, summary: &mut BatchSummary) {
        summary.remote_failures = self.remote_failures.load(Ordering::Relaxed);
        summary.malformed_dates = self.malformed_dates.load(Ordering::Relaxed);
        summary.downloads_succeeded = self.downloads_succeeded.load(Ordering::Relaxed);
        summary.downloads_failed = self.downloads_failed.load(Ordering::Relaxed);
        summary.bytes_written = self.bytes_written.load(Ordering::Relaxed);
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Holds the explicitly constructed context every stage needs: the configuration,
/// the service client (which owns the credential), the audit logs and the clock
/// used to resolve relative dates. Nothing in it is mutated after construction.
#[derive(Clone)]
pub struct EvidenceDownloader {
    /// Remote service access
    pub(crate) service: Arc<dyn TestManagementService>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Execution log and per-test-case logs
    pub(crate) audit: Arc<AuditLog>,
    /// Time source for relative start dates
    pub(crate) clock: Arc<dyn Clock>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl EvidenceDownloader {
    /// Create a downloader talking HTTP to the configured service
    ///
    /// This validates the configuration, builds the HTTP client carrying
    /// `credential`, and opens the execution log in `config.log_dir`.
    pub fn new(config: Config, credential: &Credential) -> Result<Self> {
        config.validate()?;
        let service = Arc::new(HttpTestService::new(&config, credential)?);
        let audit = Arc::new(AuditLog::open(&config.log_dir)?);
        Self::with_service(config, service, audit)
    }

    /// Create a downloader on top of any [`TestManagementService`]
    pub fn with_service(
        config: Config,
        service: Arc<dyn TestManagementService>,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            service,
            config: Arc::new(config),
            audit,
            clock: Arc::new(SystemClock),
            event_tx,
        })
    }

    /// Replace the clock used to resolve "N days ago" start dates
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives all events independently. A subscriber that falls
    /// more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The audit logs this downloader writes to
    pub fn audit_log(&self) -> Arc<AuditLog> {
        Arc::clone(&self.audit)
    }

    /// Folder a run's evidence is written to: `<output_dir>/<testCaseId>/<runKey>`
    pub fn run_folder(&self, run: &RunDescriptor) -> PathBuf {
        self.config
            .output_dir
            .join(sanitize_segment(run.test_case.as_str(), "test_case"))
            .join(sanitize_segment(&run.run_key, &format!("run_{}", run.run_id)))
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
