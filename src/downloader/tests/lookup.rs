use super::*;

fn names(evidence: &[EvidenceDescriptor]) -> Vec<&str> {
    evidence.iter().map(|e| e.file_name.as_str()).collect()
}

fn run_with_both_sources() -> FakeService {
    FakeService {
        steps: HashMap::from([(
            "100".to_string(),
            vec![
                vec![record("1", "a.png"), record("2", "b.png")],
                vec![],
                vec![record("3", "c.log")],
            ],
        )]),
        attachments: HashMap::from([("100".to_string(), vec![record("4", "d.zip")])]),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_lookup_concatenates_steps_then_attachments() {
    let (downloader, _temp_dir) = create_test_downloader(Arc::new(run_with_both_sources()));

    let evidence = downloader.lookup_evidence("100").await;

    assert_eq!(names(&evidence), vec!["a.png", "b.png", "c.log", "d.zip"]);
    assert_eq!(evidence[3].remote_id, "4");
}

#[tokio::test]
async fn test_lookup_step_failure_keeps_attachments() {
    let service = Arc::new(FakeService {
        failing_steps: vec!["100".to_string()],
        ..run_with_both_sources()
    });
    let (downloader, temp_dir) = create_test_downloader(Arc::clone(&service));
    let stats = BatchStats::default();

    let evidence = downloader
        .lookup_evidence_with("100", downloader.audit.as_ref(), &stats)
        .await;

    assert_eq!(names(&evidence), vec!["d.zip"]);
    assert_eq!(service.attachment_calls.load(Ordering::SeqCst), 1);

    let mut summary = BatchSummary::default();
    stats.fill(&mut summary);
    assert_eq!(summary.remote_failures, 1);
    assert!(read_execution_log(&temp_dir).contains("Failed to fetch step evidences for test run ID: 100"));
}

#[tokio::test]
async fn test_lookup_attachment_failure_keeps_steps() {
    let service = Arc::new(FakeService {
        failing_attachments: vec!["100".to_string()],
        ..run_with_both_sources()
    });
    let (downloader, _temp_dir) = create_test_downloader(service);

    let evidence = downloader.lookup_evidence("100").await;

    assert_eq!(names(&evidence), vec!["a.png", "b.png", "c.log"]);
}

#[tokio::test]
async fn test_lookup_both_failures_yield_nothing() {
    let service = Arc::new(FakeService {
        failing_steps: vec!["100".to_string()],
        failing_attachments: vec!["100".to_string()],
        ..run_with_both_sources()
    });
    let (downloader, _temp_dir) = create_test_downloader(Arc::clone(&service));

    let evidence = downloader.lookup_evidence("100").await;

    assert!(evidence.is_empty());
    assert_eq!(service.step_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.attachment_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lookup_does_not_deduplicate() {
    let service = Arc::new(FakeService {
        steps: HashMap::from([("7".to_string(), vec![vec![record("1", "same.png")]])]),
        attachments: HashMap::from([("7".to_string(), vec![record("1", "same.png")])]),
        ..Default::default()
    });
    let (downloader, _temp_dir) = create_test_downloader(service);

    let evidence = downloader.lookup_evidence("7").await;

    assert_eq!(evidence.len(), 2);
    assert_eq!(evidence[0], evidence[1]);
}
