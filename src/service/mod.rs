//! Access to the remote test-management service.
//!
//! The pipeline only talks to the service through [`TestManagementService`], which
//! keeps discovery, lookup and download logic independent of HTTP. The production
//! implementation is [`HttpTestService`]; tests plug in in-memory fakes.

mod http;
mod models;

pub use http::HttpTestService;
pub use models::{EvidenceRecord, StepResult, StepResults, TestRunEntry, TestRunListing, UserColumns};

use crate::error::Result;
use crate::types::{EvidenceDescriptor, TestCaseId};
use bytes::Bytes;
use futures::stream::BoxStream;

/// A streaming attachment body
pub struct AttachmentBody {
    /// Declared size from the `content-length` header, if any
    pub content_length: Option<u64>,
    /// Body chunks as they arrive
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for AttachmentBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// The four endpoints the evidence pipeline consumes
///
/// Every method performs exactly one request. Non-success statuses are reported as
/// [`Error::Remote`](crate::Error::Remote), undecodable bodies as
/// [`Error::Schema`](crate::Error::Schema); callers decide whether to absorb them.
#[async_trait::async_trait]
pub trait TestManagementService: Send + Sync {
    /// List the executions of a test case
    async fn test_runs(&self, test_case: &TestCaseId) -> Result<TestRunListing>;

    /// Fetch the per-step results (and their evidence) of a run
    async fn step_results(&self, run_id: &str) -> Result<StepResults>;

    /// List the run-level attachments of a run
    async fn run_attachments(&self, run_id: &str) -> Result<Vec<EvidenceRecord>>;

    /// Open a streaming read of an evidence file
    async fn open_attachment(&self, evidence: &EvidenceDescriptor) -> Result<AttachmentBody>;
}
