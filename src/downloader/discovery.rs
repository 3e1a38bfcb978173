//! Test run discovery and cutoff filtering.

use crate::audit_log::AuditSink;
use crate::date_filter;
use crate::types::{RunDescriptor, TestCaseId};

use super::{BatchStats, EvidenceDownloader};

impl EvidenceDownloader {
    /// List the runs of `test_case` that started after the configured cutoff
    ///
    /// Issues a single run-listing request. Entries are kept in the order the
    /// service returned them and filtered as follows:
    /// - no (or blank) start date: skipped silently
    /// - start date in neither recognised format: logged and skipped
    /// - started at or before the cutoff: dropped
    ///
    /// Never fails: a failed request is logged and yields an empty list.
    pub async fn discover_runs(&self, test_case: &TestCaseId) -> Vec<RunDescriptor> {
        self.discover_runs_tracked(test_case, &BatchStats::default())
            .await
    }

    pub(crate) async fn discover_runs_tracked(
        &self,
        test_case: &TestCaseId,
        stats: &BatchStats,
    ) -> Vec<RunDescriptor> {
        let log = self.audit.as_ref();
        log.info(&format!("Fetching test runs for test case {test_case}"));

        let listing = match self.service.test_runs(test_case).await {
            Ok(listing) => listing,
            Err(e) => {
                stats.record_remote_failure();
                log.error(&format!(
                    "Failed to fetch test runs for test case {test_case}: {e}"
                ));
                return Vec::new();
            }
        };

        let cutoff = self.config.cutoff;
        let total = listing.entries.len();
        let mut runs = Vec::new();

        for entry in listing.entries {
            let Some(started) = entry.started() else {
                continue;
            };

            let started_at = match date_filter::parse(started, self.clock.as_ref()) {
                Ok(started_at) => started_at,
                Err(e) => {
                    stats.record_malformed_date();
                    log.warn(&format!(
                        "Skipping test run {} of test case {test_case}: {e}",
                        entry.key
                    ));
                    continue;
                }
            };

            if started_at <= cutoff {
                tracing::debug!(
                    test_case = %test_case,
                    run_key = %entry.key,
                    started_at = %started_at,
                    "test run started before cutoff"
                );
                continue;
            }

            runs.push(RunDescriptor {
                test_case: test_case.clone(),
                run_id: entry.test_run_id,
                run_key: entry.key,
                started_at,
            });
        }

        tracing::info!(
            test_case = %test_case,
            total,
            qualifying = runs.len(),
            cutoff = %cutoff,
            "test runs discovered"
        );
        runs
    }
}
