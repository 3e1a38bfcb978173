//! `reqwest`-backed implementation of [`TestManagementService`].

use super::{AttachmentBody, EvidenceRecord, StepResults, TestManagementService, TestRunListing};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Credential, EvidenceDescriptor, TestCaseId};
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// HTTP client for the test-management REST API
///
/// Every request carries `Authorization: Bearer <token>` and an explicit timeout.
/// Certificate verification follows [`Config::accept_invalid_certs`].
#[derive(Clone, Debug)]
pub struct HttpTestService {
    client: Client,
    api_base: Url,
    attachment_base: Url,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl HttpTestService {
    /// Build a client for the service described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token cannot be used as a header value,
    /// [`Error::InvalidUrl`] for unusable base URLs, and [`Error::Transport`] if the
    /// TLS backend fails to initialise.
    pub fn new(config: &Config, credential: &Credential) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&credential.bearer_header())
            .map_err(|_| Error::config("token", "contains characters not allowed in a header"))?;
        auth.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(AUTHORIZATION, auth);

        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled");
        }

        let client = Client::builder()
            .default_headers(default_headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: parse_base(&config.api_base_url)?,
            attachment_base: parse_base(&config.attachment_base_url)?,
            request_timeout: config.request_timeout,
            download_timeout: config.download_timeout,
        })
    }

    /// Send a JSON request and decode the body
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
        let response = request.timeout(self.request_timeout).send().await?;
        let status = response.status();
        tracing::debug!(url = %url, status = %status, "response received");

        if !status.is_success() {
            return Err(Error::Remote {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| Error::Schema {
            endpoint: url.to_string(),
            source,
        })
    }
}

#[async_trait::async_trait]
impl TestManagementService for HttpTestService {
    async fn test_runs(&self, test_case: &TestCaseId) -> Result<TestRunListing> {
        let url = endpoint(&self.api_base, &["test", test_case.as_str(), "testrun"])?;
        tracing::debug!(url = %url, "fetching test runs");
        self.send_json(self.client.get(url.clone()), &url).await
    }

    async fn step_results(&self, run_id: &str) -> Result<StepResults> {
        let url = endpoint(&self.api_base, &["testrun", run_id, "steps"])?;
        tracing::debug!(url = %url, "fetching step results");
        self.send_json(self.client.post(url.clone()), &url).await
    }

    async fn run_attachments(&self, run_id: &str) -> Result<Vec<EvidenceRecord>> {
        let url = endpoint(&self.api_base, &["testrun", run_id, "attachment"])?;
        tracing::debug!(url = %url, "fetching run attachments");
        let records: Option<Vec<EvidenceRecord>> =
            self.send_json(self.client.get(url.clone()), &url).await?;
        Ok(records.unwrap_or_default())
    }

    async fn open_attachment(&self, evidence: &EvidenceDescriptor) -> Result<AttachmentBody> {
        let url = endpoint(
            &self.attachment_base,
            &["attachment", &evidence.remote_id, &evidence.file_name],
        )?;
        tracing::debug!(url = %url, "opening attachment stream");

        // Idle limit only: headers here, each body chunk in the downloader
        let response = tokio::time::timeout(self.download_timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| Error::Stalled {
                endpoint: url.to_string(),
                idle: self.download_timeout,
            })??;
        let status = response.status();
        tracing::debug!(url = %url, status = %status, "response received");

        if !status.is_success() {
            return Err(Error::Remote {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(AttachmentBody {
            content_length: response.content_length(),
            chunks: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(Error::from))
                .boxed(),
        })
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: "cannot be a base URL".to_string(),
        });
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl {
            url: base.to_string(),
            reason: "cannot be a base URL".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
