use crate::e2e::helpers;

use helpers::fake_provider::{
    FAILING_MARKER, INVALID_SECRET_PREFIX, LIMITED_SECRET_PREFIX, SLOW_MARKER,
};
use helpers::{submit_job, wait_for_job, TestContext, TEST_MAX_TEXT_LENGTH};
use hyper::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_context::test_context;

/// Three five-word sentences, one chunk each at an eight-word limit
const STORY: &str = "The quick brown fox jumps. \
    The lazy dog kept sleeping. \
    Everyone enjoyed the warm weather.";

fn log_messages(job: &Value) -> Vec<String> {
    job.get("logs")
        .and_then(|logs| logs.as_array())
        .map(|logs| {
            logs.iter()
                .filter_map(|entry| entry.get("message").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_narrate_text_into_downloadable_mp3(ctx: &TestContext) {
    ctx.fixtures.create_credential("main", "good-secret-1").await.unwrap();

    let job_id = submit_job(&ctx.client, STORY, Some("bedtime")).await;
    let job = wait_for_job(&ctx.client, &job_id).await;

    assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("done"));
    assert_eq!(job.get("progress").and_then(|v| v.as_u64()), Some(100));
    assert_eq!(job.get("chunk_count").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(job.get("completed_chunks").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(ctx.provider.calls(), 3);

    let url = job
        .pointer("/artifact/url")
        .and_then(|v| v.as_str())
        .expect("Missing artifact url");
    let response = ctx.client.get(url).await.unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("content-type", "audio/mpeg");
    let disposition = response.header("content-disposition").unwrap();
    assert!(
        disposition.contains("filename=\"bedtime.mp3\""),
        "Unexpected disposition {}",
        disposition
    );
    assert!(!response.body_bytes.is_empty());
    assert_eq!(
        job.pointer("/artifact/size_bytes").and_then(|v| v.as_u64()),
        Some(response.body_bytes.len() as u64)
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_default_the_download_filename(ctx: &TestContext) {
    ctx.fixtures.create_credential("main", "good-secret-1").await.unwrap();

    let job_id = submit_job(&ctx.client, "Short and sweet.", None).await;
    let job = wait_for_job(&ctx.client, &job_id).await;

    let filename = job.get("filename").and_then(|v| v.as_str()).unwrap();
    assert!(filename.starts_with("audio_"), "Unexpected filename {}", filename);

    let url = job.pointer("/artifact/url").and_then(|v| v.as_str()).unwrap();
    let response = ctx.client.get(url).await.unwrap();
    let disposition = response.header("content-disposition").unwrap();
    assert!(disposition.contains(&format!("filename=\"{}.mp3\"", filename)));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_job_when_no_credentials_exist(ctx: &TestContext) {
    let job_id = submit_job(&ctx.client, STORY, None).await;
    let job = wait_for_job(&ctx.client, &job_id).await;

    assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("error"));
    let error = job.get("error").and_then(|v| v.as_str()).unwrap();
    assert!(error.contains("All credentials failed"), "Unexpected error {}", error);
    assert!(job.get("artifact").is_none());
    assert_eq!(ctx.provider.calls(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_switch_away_from_rate_limited_credential(ctx: &TestContext) {
    let limited = format!("{}key-1", LIMITED_SECRET_PREFIX);
    ctx.fixtures.create_credential("limited", &limited).await.unwrap();
    ctx.fixtures.create_credential("spare", "good-secret-2").await.unwrap();

    let job_id = submit_job(&ctx.client, STORY, None).await;
    let job = wait_for_job(&ctx.client, &job_id).await;

    assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("done"));
    let logs = log_messages(&job);
    assert!(
        logs.iter().any(|m| m.contains("rate limited")),
        "Expected a rate limit entry in {:?}",
        logs
    );
    assert_eq!(
        job.pointer("/chunks/0/rate_limits").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        job.pointer("/chunks/2/credential").and_then(|v| v.as_str()),
        Some("spare")
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_exclude_rejected_credential(ctx: &TestContext) {
    let invalid = format!("{}key-1", INVALID_SECRET_PREFIX);
    ctx.fixtures.create_credential("broken", &invalid).await.unwrap();
    ctx.fixtures.create_credential("working", "good-secret-2").await.unwrap();

    let job_id = submit_job(&ctx.client, STORY, None).await;
    let job = wait_for_job(&ctx.client, &job_id).await;

    assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("done"));
    // One rejection, then every chunk on the working credential
    assert_eq!(ctx.provider.calls(), 4);
    assert_eq!(
        ctx.fixtures.get_credential_status("broken").await.unwrap().as_deref(),
        Some("invalid")
    );
    assert_eq!(
        ctx.fixtures.get_credential_status("working").await.unwrap().as_deref(),
        Some("valid")
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_job_when_a_chunk_keeps_failing(ctx: &TestContext) {
    ctx.fixtures.create_credential("main", "good-secret-1").await.unwrap();

    let text = format!("This first part works fine. But {} words are here.", FAILING_MARKER);
    let job_id = submit_job(&ctx.client, &text, None).await;
    let job = wait_for_job(&ctx.client, &job_id).await;

    assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("error"));
    let error = job.get("error").and_then(|v| v.as_str()).unwrap();
    assert!(
        error.contains("text could not be synthesized"),
        "Unexpected error {}",
        error
    );
    assert!(job.get("artifact").is_none());
    assert_eq!(
        job.pointer("/chunks/1/state").and_then(|v| v.as_str()),
        Some("failed")
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_validate_job_requests(ctx: &TestContext) {
    ctx.client
        .post("/api/jobs", &json!({ "text": "   ", "voice": "Kore" }))
        .await
        .unwrap()
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("Text cannot be empty");

    ctx.client
        .post("/api/jobs", &json!({ "text": "Hello.", "voice": "Nobody" }))
        .await
        .unwrap()
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("Unknown voice");

    ctx.client
        .post(
            "/api/jobs",
            &json!({ "text": "a".repeat(TEST_MAX_TEXT_LENGTH + 1), "voice": "Kore" }),
        )
        .await
        .unwrap()
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    let response = ctx.client.get("/api/jobs").await.unwrap();
    assert_eq!(response.body, Some(json!([])));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_unknown_ids(ctx: &TestContext) {
    let missing = "00000000-0000-0000-0000-000000000000";

    ctx.client
        .get(&format!("/api/jobs/{}", missing))
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);

    ctx.client
        .get(&format!("/api/artifacts/{}", missing))
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND)
        .assert_error_message("Artifact not found or revoked");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_refuse_to_remove_processing_job(ctx: &TestContext) {
    ctx.fixtures.create_credential("main", "good-secret-1").await.unwrap();

    let text = format!("A {} sentence here.", SLOW_MARKER);
    let job_id = submit_job(&ctx.client, &text, None).await;
    let path = format!("/api/jobs/{}", job_id);

    ctx.client
        .delete(&path)
        .await
        .unwrap()
        .assert_status(StatusCode::CONFLICT);

    let job = wait_for_job(&ctx.client, &job_id).await;
    let url = job.pointer("/artifact/url").and_then(|v| v.as_str()).unwrap().to_string();

    ctx.client
        .delete(&path)
        .await
        .unwrap()
        .assert_status(StatusCode::NO_CONTENT);

    // Removing a job revokes its artifact
    ctx.client
        .get(&url)
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_cancel_processing_job(ctx: &TestContext) {
    ctx.fixtures.create_credential("main", "good-secret-1").await.unwrap();

    let text = format!(
        "First {} sentence. Second {} sentence. Third {} sentence.",
        SLOW_MARKER, SLOW_MARKER, SLOW_MARKER
    );
    let job_id = submit_job(&ctx.client, &text, None).await;

    let response = ctx
        .client
        .post_empty(&format!("/api/jobs/{}/cancel", job_id))
        .await
        .unwrap();
    response.assert_status(StatusCode::OK);

    let job = wait_for_job(&ctx.client, &job_id).await;
    assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("error"));
    assert_eq!(job.get("error").and_then(|v| v.as_str()), Some("Job cancelled"));
    assert!(job.get("artifact").is_none());

    ctx.client
        .post_empty(&format!("/api/jobs/{}/cancel", job_id))
        .await
        .unwrap()
        .assert_status(StatusCode::CONFLICT);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_queue_jobs_beyond_the_concurrency_limit(ctx: &TestContext) {
    for i in 0..3 {
        ctx.fixtures
            .create_credential(&format!("key-{}", i), &format!("good-secret-{}", i))
            .await
            .unwrap();
    }

    let text = format!("A {} sentence.", SLOW_MARKER);
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(submit_job(&ctx.client, &text, None).await);
    }

    let response = ctx.client.get("/api/jobs").await.unwrap();
    let statuses: Vec<&str> = response
        .body
        .as_ref()
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|job| job.get("status").and_then(|s| s.as_str()))
        .collect();
    assert_eq!(statuses, vec!["processing", "processing", "queued"]);

    for id in &ids {
        let job = wait_for_job(&ctx.client, id).await;
        assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("done"));
    }
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_clear_completed_jobs(ctx: &TestContext) {
    ctx.fixtures.create_credential("main", "good-secret-1").await.unwrap();

    let done = submit_job(&ctx.client, "Quick one.", None).await;
    wait_for_job(&ctx.client, &done).await;
    let failed = submit_job(&ctx.client, FAILING_MARKER, None).await;
    wait_for_job(&ctx.client, &failed).await;

    let response = ctx
        .client
        .post_empty("/api/jobs/clear-completed")
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(response.body, Some(json!({ "removed": 2 })));

    let response = ctx.client.get("/api/jobs").await.unwrap();
    assert_eq!(response.body, Some(json!([])));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_list_voices(ctx: &TestContext) {
    let response = ctx.client.get("/api/voices").await.unwrap();

    response.assert_status(StatusCode::OK);
    let voices = response.body.as_ref().unwrap().as_array().unwrap();
    assert_eq!(voices.len(), 19);
    let kore = voices
        .iter()
        .find(|v| v.get("id").and_then(|id| id.as_str()) == Some("Kore"))
        .expect("Kore missing");
    assert_eq!(kore.get("category").and_then(|v| v.as_str()), Some("female"));
    assert_eq!(kore.get("name").and_then(|v| v.as_str()), Some("Kore"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_store_the_canonical_voice_id(ctx: &TestContext) {
    ctx.fixtures.create_credential("main", "good-secret-1").await.unwrap();

    let response = ctx
        .client
        .post("/api/jobs", &json!({ "text": "Hello there.", "voice": "kore" }))
        .await
        .unwrap();
    response.assert_status(StatusCode::CREATED);
    let job_id = response.str_field("id").unwrap().to_string();

    let job = wait_for_job(&ctx.client, &job_id).await;
    assert_eq!(job.get("status").and_then(|v| v.as_str()), Some("done"));
    assert_eq!(job.get("voice").and_then(|v| v.as_str()), Some("Kore"));
}
