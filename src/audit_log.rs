//! Human-readable audit logs
//!
//! Two kinds of append-only log files are written next to each other:
//! - `execution_log.log`, one per process, for batch-level events
//! - `<testCaseId>_log.log`, one per test case, opened lazily the first time a
//!   worker touches that test case
//!
//! Lines look like `2024-03-15 14:45:02,117 - INFO - message`. Every line is also
//! emitted as a `tracing` event, so console output and audit files stay in step.
//! Failing to write an audit line never fails the operation being logged.

use crate::error::{Error, Result};
use crate::types::TestCaseId;
use crate::utils::sanitize_segment;
use chrono::Local;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::Level;

/// File name of the process-wide log
pub const EXECUTION_LOG: &str = "execution_log.log";

/// An append-only log file shared between tasks
///
/// Each line is formatted up front and written with one `write_all` while the
/// lock is held, so lines from concurrent tasks never interleave. The write is a
/// plain blocking call on whatever thread logs; audit lines are short and the
/// file is not flushed or synced per line.
#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogFile {
    fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::filesystem(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn write(&self, level: Level, message: &str) {
        let line = format!(
            "{} - {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            level,
            message
        );
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write audit log line");
        }
    }
}

/// Destination for audit lines
///
/// Implemented by the execution log ([`AuditLog`]) and by per-test-case logs
/// ([`CaseLog`]), so pipeline steps can write to whichever applies.
pub trait AuditSink: Send + Sync {
    /// Write an INFO line
    fn info(&self, message: &str);

    /// Write a WARN line
    fn warn(&self, message: &str);

    /// Write an ERROR line
    fn error(&self, message: &str);

    /// Write a line here and in the execution log
    fn mirror(&self, level: Level, message: &str);
}

/// Process-wide log plus a registry of per-test-case logs
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    execution: Arc<LogFile>,
    cases: Mutex<HashMap<TestCaseId, Arc<CaseLog>>>,
}

impl AuditLog {
    /// Open (or create) the execution log inside `dir`
    ///
    /// The directory is created if needed. Per-test-case logs are opened on demand
    /// by [`AuditLog::case`].
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| Error::filesystem(&dir, e))?;
        let execution = Arc::new(LogFile::open(dir.join(EXECUTION_LOG))?);
        Ok(Self {
            dir,
            execution,
            cases: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the per-test-case log for `test_case`
    pub fn case_log_path(&self, test_case: &TestCaseId) -> PathBuf {
        let name = sanitize_segment(test_case.as_str(), "test_case");
        self.dir.join(format!("{name}_log.log"))
    }

    /// Get the log for `test_case`, opening its file on first use
    ///
    /// Later calls for the same test case return the same handle, so no line is
    /// ever written twice.
    pub fn case(&self, test_case: &TestCaseId) -> Result<Arc<CaseLog>> {
        let mut cases = match self.cases.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(log) = cases.get(test_case) {
            return Ok(Arc::clone(log));
        }

        let file = LogFile::open(self.case_log_path(test_case))?;
        let log = Arc::new(CaseLog {
            test_case: test_case.clone(),
            file,
            execution: Arc::clone(&self.execution),
        });
        cases.insert(test_case.clone(), Arc::clone(&log));
        tracing::debug!(test_case = %test_case, "opened test case log");
        Ok(log)
    }
}

impl AuditSink for AuditLog {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
        self.execution.write(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
        self.execution.write(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
        self.execution.write(Level::ERROR, message);
    }

    // Already the execution log
    fn mirror(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => self.error(message),
            Level::WARN => self.warn(message),
            _ => self.info(message),
        }
    }
}

/// Log for a single test case
#[derive(Debug)]
pub struct CaseLog {
    test_case: TestCaseId,
    file: LogFile,
    execution: Arc<LogFile>,
}

impl AuditSink for CaseLog {
    fn info(&self, message: &str) {
        tracing::info!(test_case = %self.test_case, "{message}");
        self.file.write(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(test_case = %self.test_case, "{message}");
        self.file.write(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        tracing::error!(test_case = %self.test_case, "{message}");
        self.file.write(Level::ERROR, message);
    }

    fn mirror(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => self.error(message),
            Level::WARN => self.warn(message),
            _ => self.info(message),
        }
        self.execution.write(level, message);
    }
}
