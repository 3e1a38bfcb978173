//! Wire records returned by the test-management REST API.
//!
//! Only the fields the pipeline reads are modelled. Optional fields are explicit
//! `Option`s or `#[serde(default)]`, so a missing value means "absent" rather than a
//! decode failure; a missing required field fails the whole body with
//! [`Error::Schema`](crate::Error::Schema).

use crate::types::EvidenceDescriptor;
use serde::{Deserialize, Deserializer};

/// Body of `GET /test/{testCaseId}/testrun`
#[derive(Clone, Debug, Deserialize)]
pub struct TestRunListing {
    /// Executions in service order
    pub entries: Vec<TestRunEntry>,
}

/// One execution in a [`TestRunListing`]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunEntry {
    /// Remote run id (numeric or string on the wire)
    #[serde(deserialize_with = "string_or_number")]
    pub test_run_id: String,
    /// Human-readable run key, e.g. "EXE-7"
    pub key: String,
    /// Display columns; absent means no start date
    #[serde(default)]
    pub user_columns: UserColumns,
}

/// Display columns attached to a run entry
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserColumns {
    /// Start date as displayed; `None` or empty when the run never started
    #[serde(default)]
    pub testrun_started: Option<String>,
}

impl TestRunEntry {
    /// The start date text, or `None` when it is absent or blank
    pub fn started(&self) -> Option<&str> {
        self.user_columns
            .testrun_started
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Body of `POST /testrun/{runId}/steps`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResults {
    /// Steps in execution order
    pub step_results: Vec<StepResult>,
}

/// One step of a run
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StepResult {
    /// Evidence attached to this step, if any
    #[serde(default)]
    pub evidences: Option<Vec<EvidenceRecord>>,
}

/// An evidence entry as listed by the steps and attachment endpoints
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Remote attachment id (numeric or string on the wire)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Declared file name
    pub file_name: String,
}

impl From<EvidenceRecord> for EvidenceDescriptor {
    fn from(record: EvidenceRecord) -> Self {
        Self {
            remote_id: record.id,
            file_name: record.file_name,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}
