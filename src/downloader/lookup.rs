//! Evidence enumeration for a single run.

use crate::audit_log::AuditSink;
use crate::types::EvidenceDescriptor;

use super::{BatchStats, EvidenceDownloader};

impl EvidenceDownloader {
    /// List every evidence file of a run
    ///
    /// Combines two sources, in this order:
    /// 1. evidence embedded in the run's step results (step order, then per-step order)
    /// 2. run-level attachments
    ///
    /// Both requests are always made. A failed request is logged and contributes
    /// nothing; it never prevents the other one. Entries are not deduplicated.
    pub async fn lookup_evidence(&self, run_id: &str) -> Vec<EvidenceDescriptor> {
        self.lookup_evidence_with(run_id, self.audit.as_ref(), &BatchStats::default())
            .await
    }

    pub(crate) async fn lookup_evidence_with(
        &self,
        run_id: &str,
        log: &dyn AuditSink,
        stats: &BatchStats,
    ) -> Vec<EvidenceDescriptor> {
        let mut evidence = Vec::new();

        log.info(&format!("Fetching evidences for test run ID: {run_id}"));
        match self.service.step_results(run_id).await {
            Ok(steps) => {
                for step in steps.step_results {
                    if let Some(records) = step.evidences {
                        evidence.extend(records.into_iter().map(EvidenceDescriptor::from));
                    }
                }
            }
            Err(e) => {
                stats.record_remote_failure();
                log.error(&format!(
                    "Failed to fetch step evidences for test run ID: {run_id}: {e}"
                ));
            }
        }

        let from_steps = evidence.len();

        log.info(&format!(
            "Fetching additional evidences for test run ID: {run_id}"
        ));
        match self.service.run_attachments(run_id).await {
            Ok(records) => {
                evidence.extend(records.into_iter().map(EvidenceDescriptor::from));
            }
            Err(e) => {
                stats.record_remote_failure();
                log.error(&format!(
                    "Failed to fetch attachments for test run ID: {run_id}: {e}"
                ));
            }
        }

        tracing::debug!(
            run_id,
            from_steps,
            from_attachments = evidence.len() - from_steps,
            "evidence listed"
        );
        evidence
    }
}
