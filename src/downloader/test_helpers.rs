//! Shared test helpers: an in-memory service and downloader construction.

use crate::audit_log::AuditLog;
use crate::config::Config;
use crate::date_filter::FixedClock;
use crate::downloader::EvidenceDownloader;
use crate::error::{Error, Result};
use crate::service::{
    AttachmentBody, EvidenceRecord, StepResult, StepResults, TestManagementService, TestRunEntry,
    TestRunListing, UserColumns,
};
use crate::types::{EvidenceDescriptor, TestCaseId};
use bytes::Bytes;
use chrono::NaiveDate;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

/// "Now" for every test downloader: 2024-03-15 12:00
pub(crate) fn test_now() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// Build a run listing entry
pub(crate) fn entry(run_id: &str, key: &str, started: Option<&str>) -> TestRunEntry {
    TestRunEntry {
        test_run_id: run_id.to_string(),
        key: key.to_string(),
        user_columns: UserColumns {
            testrun_started: started.map(str::to_string),
        },
    }
}

/// Build an evidence record
pub(crate) fn record(id: &str, file_name: &str) -> EvidenceRecord {
    EvidenceRecord {
        id: id.to_string(),
        file_name: file_name.to_string(),
    }
}

/// In-memory [`TestManagementService`]
///
/// Missing map entries answer with HTTP 404, ids listed in the `*_fail` sets with
/// HTTP 500. Step-result and attachment calls track how many run tasks are inside
/// the service at once.
#[derive(Default)]
pub(crate) struct FakeService {
    pub runs: HashMap<String, Vec<TestRunEntry>>,
    pub steps: HashMap<String, Vec<Vec<EvidenceRecord>>>,
    pub attachments: HashMap<String, Vec<EvidenceRecord>>,
    pub files: HashMap<String, Vec<u8>>,
    pub failing_runs: Vec<String>,
    pub failing_steps: Vec<String>,
    pub failing_attachments: Vec<String>,
    /// File ids whose body breaks off after the first chunk
    pub broken_files: Vec<String>,
    /// File ids whose body goes silent after the first chunk
    pub stalled_files: Vec<String>,
    pub delay: Option<Duration>,
    /// Pause before each body chunk
    pub chunk_delay: Option<Duration>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub step_calls: AtomicUsize,
    pub attachment_calls: AtomicUsize,
}

impl FakeService {
    fn remote(endpoint: &str, status: u16) -> Error {
        Error::Remote {
            endpoint: endpoint.to_string(),
            status,
        }
    }

    async fn occupy(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TestManagementService for FakeService {
    async fn test_runs(&self, test_case: &TestCaseId) -> Result<TestRunListing> {
        let endpoint = format!("test/{test_case}/testrun");
        if self.failing_runs.iter().any(|id| id == test_case.as_str()) {
            return Err(Self::remote(&endpoint, 500));
        }
        match self.runs.get(test_case.as_str()) {
            Some(entries) => Ok(TestRunListing {
                entries: entries.clone(),
            }),
            None => Err(Self::remote(&endpoint, 404)),
        }
    }

    async fn step_results(&self, run_id: &str) -> Result<StepResults> {
        self.step_calls.fetch_add(1, Ordering::SeqCst);
        self.occupy().await;
        if self.failing_steps.iter().any(|id| id == run_id) {
            return Err(Self::remote(&format!("testrun/{run_id}/steps"), 500));
        }
        let step_results = self
            .steps
            .get(run_id)
            .map(|steps| {
                steps
                    .iter()
                    .map(|records| StepResult {
                        evidences: Some(records.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(StepResults { step_results })
    }

    async fn run_attachments(&self, run_id: &str) -> Result<Vec<EvidenceRecord>> {
        self.attachment_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_attachments.iter().any(|id| id == run_id) {
            return Err(Self::remote(&format!("testrun/{run_id}/attachment"), 500));
        }
        Ok(self.attachments.get(run_id).cloned().unwrap_or_default())
    }

    async fn open_attachment(&self, evidence: &EvidenceDescriptor) -> Result<AttachmentBody> {
        let endpoint = format!("attachment/{}/{}", evidence.remote_id, evidence.file_name);
        let Some(content) = self.files.get(&evidence.remote_id) else {
            return Err(Self::remote(&endpoint, 404));
        };
        let mut chunks: Vec<Result<Bytes>> = content
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let content_length = Some(content.len() as u64);

        if self.broken_files.contains(&evidence.remote_id) {
            chunks.truncate(1);
            chunks.push(Err(Self::remote(&endpoint, 502)));
        } else if self.stalled_files.contains(&evidence.remote_id) {
            chunks.truncate(1);
            return Ok(AttachmentBody {
                content_length,
                chunks: futures::stream::iter(chunks)
                    .chain(futures::stream::pending())
                    .boxed(),
            });
        }

        let chunks = futures::stream::iter(chunks);
        let chunks = match self.chunk_delay {
            Some(pause) => chunks
                .then(move |chunk| async move {
                    tokio::time::sleep(pause).await;
                    chunk
                })
                .boxed(),
            None => chunks.boxed(),
        };
        Ok(AttachmentBody {
            content_length,
            chunks,
        })
    }
}

/// Helper to create a test downloader over `service` with output and logs in a
/// temp dir. Returns the downloader and the tempdir (which must be kept alive).
pub(crate) fn create_test_downloader(
    service: Arc<FakeService>,
) -> (EvidenceDownloader, tempfile::TempDir) {
    create_test_downloader_with(service, |_| {})
}

/// Like [`create_test_downloader`], letting the test adjust the config first
pub(crate) fn create_test_downloader_with(
    service: Arc<FakeService>,
    adjust: impl FnOnce(&mut Config),
) -> (EvidenceDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();

    let mut config = Config {
        output_dir: temp_dir.path().join("test_case"),
        log_dir: temp_dir.path().join("logs"),
        ..Config::default()
    };
    adjust(&mut config);

    let audit = Arc::new(AuditLog::open(&config.log_dir).unwrap());
    let downloader = EvidenceDownloader::with_service(config, service, audit)
        .unwrap()
        .with_clock(Arc::new(FixedClock(test_now())));

    (downloader, temp_dir)
}
