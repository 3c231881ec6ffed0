mod common;

use common::{observation_document, sha512, Harness};
use http::StatusCode;
use insitu_ingest::IngestRequest;

#[tokio::test]
async fn test_synchronous_mode_returns_final_status() {
    let h = Harness::new().await;
    let content = observation_document(2);
    let locator = h.put_source("obs.json", &content);
    h.put_sidecar("obs.json", &sha512(&content));

    let response = h.controller().execute(IngestRequest::new(&locator)).await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert!(h.metadata.get_by_locator(&locator).await.unwrap().is_some());
}

#[tokio::test]
async fn test_background_mode_accepts_then_records() {
    let h = Harness::new().await;
    let locator = h.put_source("obs.json", &observation_document(3));
    let controller = h.controller();

    let response = controller
        .execute(IngestRequest::new(&locator).wait_till_complete(false))
        .await;

    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(response.body.message, "ingesting. Not waiting.");
    let job_id = response.body.job_id.clone().unwrap();

    controller.drain().await;
    assert_eq!(controller.pending(), 0);

    let record = h.metadata.get_by_job_id(&job_id).await.unwrap().unwrap();
    assert_eq!(record.locator, locator);
    assert_eq!(record.record_count, 3);
    assert!(!record.checksum_verified);
    assert!(h.working_root_is_empty());
}

#[tokio::test]
async fn test_background_rejection_is_reported_inline() {
    let h = Harness::new().await;
    let locator = h.put_source("obs.json", &observation_document(1));
    let controller = h.controller();

    assert!(controller.execute(IngestRequest::new(&locator)).await.is_success());

    let response = controller
        .execute(IngestRequest::new(&locator).wait_till_complete(false))
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.body.message,
        "unable to ingest file as it is already ingested"
    );
    assert_eq!(controller.pending(), 0);
}

#[tokio::test]
async fn test_background_transfer_failure_is_reported_inline() {
    let h = Harness::new().await;
    let locator = h.source_dir.join("absent.json").to_string_lossy().to_string();
    let controller = h.controller();

    let response = controller
        .execute(IngestRequest::new(&locator).wait_till_complete(false))
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body.message, "failed to ingest to parquet");
    assert!(h.working_root_is_empty());
}

#[tokio::test]
async fn test_background_transform_failure_only_logs() {
    let h = Harness::failing_writer().await;
    let locator = h.put_source("obs.json", &observation_document(1));
    let controller = h.controller();

    let response = controller
        .execute(IngestRequest::new(&locator).wait_till_complete(false))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    controller.drain().await;

    assert_eq!(h.writer.call_count(), 1);
    assert!(h.metadata.get_by_locator(&locator).await.unwrap().is_none());
    assert!(h.working_root_is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_jobs_for_distinct_objects() {
    let h = Harness::new().await;
    let controller = h.controller();

    let mut job_ids = Vec::new();
    for i in 0..5 {
        let locator = h.put_source(&format!("obs-{}.json", i), &observation_document(i + 1));
        let response = controller
            .execute(IngestRequest::new(&locator).wait_till_complete(false))
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        job_ids.push(response.body.job_id.unwrap());
    }

    controller.drain().await;

    for job_id in &job_ids {
        assert!(h.metadata.get_by_job_id(job_id).await.unwrap().is_some());
    }
    assert_eq!(h.metadata.list().await.unwrap().len(), 5);
    assert!(h.working_root_is_empty());
}

#[tokio::test]
async fn test_synchronous_writer_panic_removes_working_dir() {
    let h = Harness::panicking_writer().await;
    let locator = h.put_source("obs.json", &observation_document(1));
    let controller = h.controller();

    let joined = tokio::spawn(async move { controller.execute(IngestRequest::new(&locator)).await }).await;

    assert!(joined.unwrap_err().is_panic());
    assert_eq!(h.writer.call_count(), 1);
    assert!(h.metadata.list().await.unwrap().is_empty());
    assert!(h.working_root_is_empty());
}

#[tokio::test]
async fn test_background_writer_panic_removes_working_dir() {
    let h = Harness::panicking_writer().await;
    let locator = h.put_source("obs.json", &observation_document(1));
    let controller = h.controller();

    let response = controller
        .execute(IngestRequest::new(&locator).wait_till_complete(false))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    controller.drain().await;

    assert_eq!(controller.pending(), 0);
    assert_eq!(h.writer.call_count(), 1);
    assert!(h.metadata.list().await.unwrap().is_empty());
    assert!(h.working_root_is_empty());
}
