//! Streaming a single evidence file to disk.

use crate::audit_log::AuditSink;
use crate::error::{Error, Result};
use crate::service::AttachmentBody;
use crate::types::{DownloadOutcome, EvidenceDescriptor, Event, RunDescriptor};
use crate::utils::{create_unique_file, sanitize_segment};
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::Level;

use super::{BatchStats, EvidenceDownloader};

/// Identifies the file being written in progress events
struct ProgressTarget<'a> {
    run: &'a RunDescriptor,
    file_name: &'a str,
    total_bytes: u64,
}

impl EvidenceDownloader {
    /// Download one evidence file into `destination`
    ///
    /// Makes a single attempt. On success the folder is created if needed and the
    /// body is streamed into the first free name among `name.ext`, `name_1.ext`,
    /// `name_2.ext`, ...; existing files are never overwritten. Any failure (remote
    /// status, connection, filesystem) is logged and returned as an unsuccessful
    /// [`DownloadOutcome`]; a partially written file is removed.
    pub async fn download_evidence(
        &self,
        evidence: &EvidenceDescriptor,
        destination: &Path,
        run: &RunDescriptor,
    ) -> DownloadOutcome {
        self.download_evidence_with(
            evidence,
            destination,
            run,
            self.audit.as_ref(),
            &BatchStats::default(),
        )
        .await
    }

    pub(crate) async fn download_evidence_with(
        &self,
        evidence: &EvidenceDescriptor,
        destination: &Path,
        run: &RunDescriptor,
        log: &dyn AuditSink,
        stats: &BatchStats,
    ) -> DownloadOutcome {
        log.info(&format!(
            "Downloading evidence: {} for test run ID: {}",
            evidence.file_name, run.run_id
        ));

        let outcome = match self.try_download(evidence, destination, run).await {
            Ok((file_name, bytes)) => {
                log.mirror(
                    Level::INFO,
                    &format!(
                        "Downloaded evidence: {file_name} for test Execution : {}",
                        run.run_key
                    ),
                );
                tracing::debug!(
                    run_key = %run.run_key,
                    file_name = %file_name,
                    bytes,
                    completed_at = %chrono::Local::now().naive_local(),
                    "evidence stored"
                );
                DownloadOutcome::succeeded(evidence.clone(), file_name, bytes)
            }
            Err(e) => {
                log.mirror(
                    Level::ERROR,
                    &format!(
                        "Failed to download evidence {} for test run ID : {} and key: {}: {e}",
                        evidence.file_name, run.run_id, run.run_key
                    ),
                );
                DownloadOutcome::failed(evidence.clone(), e)
            }
        };

        stats.record_outcome(&outcome);
        self.emit_event(Event::DownloadFinished {
            test_case: run.test_case.clone(),
            run_key: run.run_key.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Fetch, place and write the file; returns the resolved name and byte count
    async fn try_download(
        &self,
        evidence: &EvidenceDescriptor,
        destination: &Path,
        run: &RunDescriptor,
    ) -> Result<(String, u64)> {
        let body = self.service.open_attachment(evidence).await?;

        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| Error::filesystem(destination, e))?;

        let fallback = format!("evidence_{}", evidence.remote_id);
        let requested = sanitize_segment(&evidence.file_name, &fallback);
        let (file, path, file_name) = create_unique_file(destination, &requested).await?;

        let total_bytes = body.content_length.unwrap_or(0);
        self.emit_event(Event::DownloadStarted {
            test_case: run.test_case.clone(),
            run_key: run.run_key.clone(),
            file_name: file_name.clone(),
            total_bytes,
        });

        let target = ProgressTarget {
            run,
            file_name: &file_name,
            total_bytes,
        };
        match self.write_body(file, &path, body, &target).await {
            Ok(bytes) => Ok((file_name, bytes)),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %remove_err,
                        "failed to remove partial evidence file"
                    );
                }
                Err(e)
            }
        }
    }

    /// Stream `body` into `file` in `chunk_size` pieces, reporting progress
    ///
    /// Fails with [`Error::Stalled`] when no chunk arrives within `download_timeout`.
    async fn write_body(
        &self,
        mut file: tokio::fs::File,
        path: &Path,
        mut body: AttachmentBody,
        target: &ProgressTarget<'_>,
    ) -> Result<u64> {
        let chunk_size = self.config.chunk_size;
        let idle = self.config.download_timeout;
        let mut written: u64 = 0;

        loop {
            let next = tokio::time::timeout(idle, body.chunks.next())
                .await
                .map_err(|_| Error::Stalled {
                    endpoint: target.file_name.to_string(),
                    idle,
                })?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            for piece in chunk.chunks(chunk_size) {
                file.write_all(piece)
                    .await
                    .map_err(|e| Error::filesystem(path, e))?;
                written += piece.len() as u64;
                if self.event_tx.receiver_count() > 0 {
                    self.emit_event(Event::DownloadProgress {
                        test_case: target.run.test_case.clone(),
                        run_key: target.run.run_key.clone(),
                        file_name: target.file_name.to_string(),
                        downloaded_bytes: written,
                        total_bytes: target.total_bytes,
                    });
                }
            }
        }

        file.flush().await.map_err(|e| Error::filesystem(path, e))?;
        Ok(written)
    }
}
