//! Mock test-management server and downloader construction

use evidence_dl::{Config, Credential, EvidenceDownloader};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "integration-token";
pub const API_PREFIX: &str = "/rest/raven/1.0";
pub const ATTACHMENT_PREFIX: &str = "/plugins/servlet/raven";

/// Create a downloader pointed at `server` with output and logs in a fresh temp dir
pub fn create_downloader(server: &MockServer, max_workers: usize) -> (EvidenceDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config {
        api_base_url: format!("{}{API_PREFIX}", server.uri()),
        attachment_base_url: format!("{}{ATTACHMENT_PREFIX}", server.uri()),
        output_dir: temp_dir.path().join("test_case"),
        log_dir: temp_dir.path().join("logs"),
        max_workers,
        ..Config::default()
    };
    let downloader = EvidenceDownloader::new(config, &Credential::new(TOKEN)).unwrap();
    (downloader, temp_dir)
}

/// Serve a run listing for `test_case`; each run is `(run_id, key, started)`
pub async fn mount_runs(server: &MockServer, test_case: &str, runs: &[(u64, &str, &str)]) {
    let entries: Vec<_> = runs
        .iter()
        .map(|(id, key, started)| {
            json!({
                "testRunId": id,
                "key": key,
                "userColumns": { "testrun_started": started }
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("{API_PREFIX}/test/{test_case}/testrun")))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entries": entries })))
        .mount(server)
        .await;
}

/// Serve step results; each step lists `(evidence_id, file_name)` pairs
pub async fn mount_steps(server: &MockServer, run_id: u64, steps: &[&[(u64, &str)]]) {
    let steps: Vec<_> = steps
        .iter()
        .map(|evidence| {
            let evidence: Vec<_> = evidence
                .iter()
                .map(|(id, name)| json!({ "id": id, "fileName": name }))
                .collect();
            json!({ "evidences": evidence })
        })
        .collect();

    Mock::given(method("POST"))
        .and(path(format!("{API_PREFIX}/testrun/{run_id}/steps")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "stepResults": steps })))
        .mount(server)
        .await;
}

/// Serve run-level attachments
pub async fn mount_attachments(server: &MockServer, run_id: u64, attachments: &[(u64, &str)]) {
    let body: Vec<_> = attachments
        .iter()
        .map(|(id, name)| json!({ "id": id, "fileName": name }))
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("{API_PREFIX}/testrun/{run_id}/attachment")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve the bytes of one evidence file
pub async fn mount_file(server: &MockServer, evidence_id: u64, file_name: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!(
            "{ATTACHMENT_PREFIX}/attachment/{evidence_id}/{file_name}"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

/// Answer `path` with a bare status code
pub async fn mount_status(server: &MockServer, http_method: &str, route: String, status: u16) {
    Mock::given(method(http_method))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
