//! Batch dispatch across the bounded worker pool.

use crate::audit_log::{AuditSink, CaseLog};
use crate::types::{BatchSummary, Event, RunDescriptor, TestCaseId};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Level;

use super::{BatchStats, EvidenceDownloader};

/// Per-run download totals returned by a worker task
#[derive(Debug, Default, Clone, Copy)]
struct RunTally {
    succeeded: usize,
    failed: usize,
}

impl EvidenceDownloader {
    /// Download the evidence of every qualifying run of `test_cases`
    ///
    /// Runs with at most `config.max_workers` run tasks in flight. See
    /// [`EvidenceDownloader::run_with_workers`].
    pub async fn run(&self, test_cases: &[TestCaseId]) -> BatchSummary {
        self.run_with_workers(test_cases, self.config.max_workers)
            .await
    }

    /// Download the evidence of every qualifying run of `test_cases`
    ///
    /// Test cases are discovered one after another on the calling task. Every
    /// qualifying run becomes its own task; at most `max_workers` of them hold a
    /// worker slot at any moment. Inside a task, evidence is listed and then
    /// downloaded sequentially. Returns once every task has finished.
    ///
    /// Nothing here fails the batch: remote errors, bad dates and failed files are
    /// absorbed where they occur and counted in the returned [`BatchSummary`]. A
    /// task that panics is logged and counted in `runs_aborted`.
    pub async fn run_with_workers(
        &self,
        test_cases: &[TestCaseId],
        max_workers: usize,
    ) -> BatchSummary {
        let stats = Arc::new(BatchStats::default());
        let workers = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut summary = BatchSummary {
            test_cases: test_cases.len(),
            ..Default::default()
        };

        tracing::info!(
            test_cases = test_cases.len(),
            max_workers,
            "starting evidence batch"
        );

        for test_case in test_cases {
            let runs = self.discover_runs_tracked(test_case, &stats).await;
            summary.runs_discovered += runs.len();
            self.emit_event(Event::RunsDiscovered {
                test_case: test_case.clone(),
                count: runs.len(),
            });

            for run in runs {
                let downloader = self.clone();
                let workers = Arc::clone(&workers);
                let stats = Arc::clone(&stats);
                tasks.spawn(async move {
                    // The semaphore is owned here and never closed
                    let _permit = workers.acquire_owned().await.ok()?;
                    Some(downloader.process_run(&run, &stats).await)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(_tally)) => summary.runs_completed += 1,
                Ok(None) => summary.runs_aborted += 1,
                Err(e) => {
                    summary.runs_aborted += 1;
                    self.audit
                        .error(&format!("A test run task terminated abnormally: {e}"));
                }
            }
        }

        stats.fill(&mut summary);
        self.audit
            .info(&format!("Evidence batch finished: {summary}"));
        self.emit_event(Event::BatchCompleted {
            summary: summary.clone(),
        });
        summary
    }

    /// List and download the evidence of one run, holding a worker slot
    async fn process_run(&self, run: &RunDescriptor, stats: &BatchStats) -> RunTally {
        let case_log = self.case_log(&run.test_case);
        let log: &dyn AuditSink = match &case_log {
            Some(case_log) => case_log.as_ref(),
            None => self.audit.as_ref(),
        };

        log.info(&format!("Processing test case: {}", run.test_case));
        let evidence = self.lookup_evidence_with(&run.run_id, log, stats).await;
        self.emit_event(Event::RunStarted {
            test_case: run.test_case.clone(),
            run_key: run.run_key.clone(),
            evidence_count: evidence.len(),
        });

        let destination = self.run_folder(run);
        let mut tally = RunTally::default();
        for item in &evidence {
            let outcome = self
                .download_evidence_with(item, &destination, run, log, stats)
                .await;
            if outcome.success {
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
            }
        }

        log.mirror(
            Level::INFO,
            &format!(
                "Download completed for Test Case: {}, Test Run: {}",
                run.test_case, run.run_key
            ),
        );
        self.emit_event(Event::RunCompleted {
            test_case: run.test_case.clone(),
            run_key: run.run_key.clone(),
            succeeded: tally.succeeded,
            failed: tally.failed,
        });
        tally
    }

    /// The test case's own log, or `None` (with a warning) when it cannot be opened
    fn case_log(&self, test_case: &TestCaseId) -> Option<Arc<CaseLog>> {
        match self.audit.case(test_case) {
            Ok(log) => Some(log),
            Err(e) => {
                self.audit.warn(&format!(
                    "Could not open log for test case {test_case}, using execution log: {e}"
                ));
                None
            }
        }
    }
}
