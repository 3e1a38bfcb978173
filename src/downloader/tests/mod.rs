use super::test_helpers::{
    FakeService, create_test_downloader, create_test_downloader_with, entry, record, test_now,
};
use super::*;
use crate::audit_log::EXECUTION_LOG;
use crate::types::{EvidenceDescriptor, TestCaseId};
use std::collections::HashMap;
use std::sync::atomic::Ordering;

mod lookup;

fn tc(id: &str) -> TestCaseId {
    TestCaseId::parse(id).unwrap()
}

fn read_execution_log(temp_dir: &tempfile::TempDir) -> String {
    std::fs::read_to_string(temp_dir.path().join("logs").join(EXECUTION_LOG)).unwrap()
}
