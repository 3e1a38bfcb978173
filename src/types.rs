//! Core types and events

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a test case on the remote service (e.g. "TC-1")
///
/// Always stored trimmed. It is used verbatim as a URL path segment, as a directory
/// name under the output root, and as the name of the per-test-case log.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCaseId(String);

impl TestCaseId {
    /// Trim `raw`; returns `None` when nothing is left
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Split a comma-separated batch ("TC-1, TC-2,,TC-3") into ids, dropping blanks
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',').filter_map(Self::parse).collect()
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One qualifying execution of a test case
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunDescriptor {
    /// Test case the run belongs to
    pub test_case: TestCaseId,
    /// Opaque remote run identifier, used in API paths
    pub run_id: String,
    /// Human-readable run label (e.g. "EXE-7"), used as the folder name
    pub run_key: String,
    /// When the run started, as reported by the service
    pub started_at: NaiveDateTime,
}

/// One downloadable evidence file
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EvidenceDescriptor {
    /// Opaque remote attachment identifier
    pub remote_id: String,
    /// Declared file name
    pub file_name: String,
}

/// Result of downloading a single evidence file
#[derive(Clone, Debug, Serialize)]
pub struct DownloadOutcome {
    /// The evidence that was requested
    pub evidence: EvidenceDescriptor,
    /// The file name actually written (may carry a `_<n>` suffix); `None` when nothing was written
    pub resolved_file_name: Option<String>,
    /// Bytes written to disk
    pub byte_count: u64,
    /// Whether the file is complete on disk
    pub success: bool,
    /// Failure description when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DownloadOutcome {
    pub(crate) fn succeeded(evidence: EvidenceDescriptor, file_name: String, bytes: u64) -> Self {
        Self {
            evidence,
            resolved_file_name: Some(file_name),
            byte_count: bytes,
            success: true,
            error_detail: None,
        }
    }

    pub(crate) fn failed(evidence: EvidenceDescriptor, error: impl fmt::Display) -> Self {
        Self {
            evidence,
            resolved_file_name: None,
            byte_count: 0,
            success: false,
            error_detail: Some(error.to_string()),
        }
    }
}

/// Bearer token for the remote service
///
/// Read once at startup and shared read-only by every worker. `Debug` never prints
/// the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a bearer token (surrounding whitespace is removed)
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// Value for the `Authorization` header
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// True when no token was supplied
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Totals for one orchestrator pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Test cases processed
    pub test_cases: usize,
    /// Runs that passed the cutoff and were dispatched
    pub runs_discovered: usize,
    /// Runs whose task finished (successfully or not)
    pub runs_completed: usize,
    /// Runs whose task panicked
    pub runs_aborted: usize,
    /// Evidence files written completely
    pub downloads_succeeded: usize,
    /// Evidence files that could not be downloaded
    pub downloads_failed: usize,
    /// Total bytes written
    pub bytes_written: u64,
    /// Endpoint calls that failed and were treated as empty results
    pub remote_failures: usize,
    /// Run entries skipped because their start date could not be parsed
    pub malformed_dates: usize,
}

impl BatchSummary {
    /// True when every attempted operation succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.downloads_failed == 0
            && self.remote_failures == 0
            && self.malformed_dates == 0
            && self.runs_aborted == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} test case(s), {} run(s), {} file(s) downloaded ({} bytes), {} download failure(s), {} remote failure(s), {} malformed date(s)",
            self.test_cases,
            self.runs_discovered,
            self.downloads_succeeded,
            self.bytes_written,
            self.downloads_failed,
            self.remote_failures,
            self.malformed_dates,
        )?;
        if self.runs_aborted > 0 {
            write!(f, ", {} aborted run(s)", self.runs_aborted)?;
        }
        Ok(())
    }
}

/// Events emitted while a batch is processed
///
/// Subscribe via [`EvidenceDownloader::subscribe`](crate::EvidenceDownloader::subscribe).
/// Events are dropped when nobody is listening.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Discovery finished for a test case
    RunsDiscovered {
        /// Test case id
        test_case: TestCaseId,
        /// Number of runs after the cutoff
        count: usize,
    },

    /// A worker picked up a run and listed its evidence
    RunStarted {
        /// Test case id
        test_case: TestCaseId,
        /// Run key
        run_key: String,
        /// Evidence files found for the run
        evidence_count: usize,
    },

    /// A file download began
    DownloadStarted {
        /// Test case id
        test_case: TestCaseId,
        /// Run key
        run_key: String,
        /// Resolved file name on disk
        file_name: String,
        /// Declared size (0 when the service sent no content-length)
        total_bytes: u64,
    },

    /// Bytes were written for a file
    DownloadProgress {
        /// Test case id
        test_case: TestCaseId,
        /// Run key
        run_key: String,
        /// Resolved file name on disk
        file_name: String,
        /// Cumulative bytes written
        downloaded_bytes: u64,
        /// Declared size (0 when unknown)
        total_bytes: u64,
    },

    /// A file download ended
    DownloadFinished {
        /// Test case id
        test_case: TestCaseId,
        /// Run key
        run_key: String,
        /// What happened
        outcome: DownloadOutcome,
    },

    /// A run's task finished
    RunCompleted {
        /// Test case id
        test_case: TestCaseId,
        /// Run key
        run_key: String,
        /// Files written
        succeeded: usize,
        /// Files that failed
        failed: usize,
    },

    /// The whole batch finished
    BatchCompleted {
        /// Final totals
        summary: BatchSummary,
    },
}
