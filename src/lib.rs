//! # evidence-dl
//!
//! Bulk retrieval of test-run evidence from an Xray-style test-management service.
//!
//! For every test case in a batch the library lists its executions, keeps those that
//! started after a cutoff, and downloads every evidence file attached to them (step
//! evidence first, then run-level attachments) into
//! `<output_dir>/<testCaseId>/<runKey>/<fileName>`. Runs are processed on a bounded
//! pool of worker tasks; nothing already on disk is ever overwritten.
//!
//! ## Design
//!
//! - **Failure containment** - a failed request or file never stops the batch; it is
//!   logged and counted in the returned [`BatchSummary`]
//! - **Audit trail** - `execution_log.log` plus one `<testCaseId>_log.log` per test case
//! - **Event-driven** - consumers subscribe to [`Event`]s for progress reporting
//! - **Pluggable service** - the pipeline talks to a [`TestManagementService`] trait,
//!   with [`HttpTestService`] as the production client
//!
//! ## Quick Start
//!
//! ```no_run
//! use evidence_dl::{Config, Credential, EvidenceDownloader, TestCaseId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         api_base_url: "https://jira.example.com/rest/raven/1.0".to_string(),
//!         max_workers: 4,
//!         ..Default::default()
//!     };
//!     let credential = Credential::new("my-token");
//!
//!     let downloader = EvidenceDownloader::new(config, &credential)?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = downloader.run(&TestCaseId::parse_list("TC-1, TC-2")).await;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Execution and per-test-case audit logs
pub mod audit_log;
/// Configuration types
pub mod config;
/// Start date parsing
pub mod date_filter;
/// Core evidence pipeline (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Remote test-management service access
pub mod service;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use audit_log::{AuditLog, AuditSink, CaseLog};
pub use config::Config;
pub use date_filter::{Clock, FixedClock, SystemClock};
pub use downloader::EvidenceDownloader;
pub use error::{Error, Result};
pub use service::{HttpTestService, TestManagementService};
pub use types::{
    BatchSummary, Credential, DownloadOutcome, EvidenceDescriptor, Event, RunDescriptor,
    TestCaseId,
};
