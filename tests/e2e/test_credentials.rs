use crate::e2e::helpers;

use helpers::fake_provider::{INVALID_SECRET_PREFIX, LIMITED_SECRET_PREFIX};
use helpers::TestContext;
use hyper::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_context::test_context;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_create_credential_with_masked_secret(ctx: &TestContext) {
    let response = ctx
        .client
        .post(
            "/api/credentials",
            &json!({ "label": "primary", "secret": "AIzaSyD1234567890abcd" }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.str_field("label"), Some("primary"));
    assert_eq!(response.str_field("masked_secret"), Some("AIza...abcd"));
    assert_eq!(response.str_field("status"), Some("unknown"));
    assert!(
        !String::from_utf8_lossy(&response.body_bytes).contains("AIzaSyD1234567890abcd"),
        "Secret leaked in response"
    );

    assert_eq!(ctx.fixtures.get_credential_count().await.unwrap(), 1);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_list_credentials_without_secrets(ctx: &TestContext) {
    ctx.fixtures.create_credential("a", "secret-aaaa-1111").await.unwrap();
    ctx.fixtures.create_credential("b", "secret-bbbb-2222").await.unwrap();

    let response = ctx.client.get("/api/credentials").await.unwrap();

    response.assert_status(StatusCode::OK);
    let list = response.body.as_ref().unwrap().as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|c| c.get("secret").is_none()));
    assert_eq!(list[0].get("in_use").and_then(|v| v.as_bool()), Some(false));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_duplicate_secret(ctx: &TestContext) {
    ctx.fixtures.create_credential("a", "same-secret-123").await.unwrap();

    let response = ctx
        .client
        .post(
            "/api/credentials",
            &json!({ "label": "b", "secret": "same-secret-123" }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::CONFLICT);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_empty_label(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/api/credentials", &json!({ "label": "  ", "secret": "x-123" }))
        .await
        .unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("Label cannot be empty");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_toggle_credential_active_flag(ctx: &TestContext) {
    let credential = ctx.fixtures.create_credential("a", "secret-toggle-1").await.unwrap();

    let response = ctx
        .client
        .patch(
            &format!("/api/credentials/{}", credential.id),
            &json!({ "is_active": false }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(
        response.body.as_ref().unwrap().get("is_active").and_then(|v| v.as_bool()),
        Some(false)
    );

    let ready = ctx.client.get("/health/ready").await.unwrap();
    assert_eq!(ready.str_field("tts"), Some("no_usable_credentials"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_delete_credential(ctx: &TestContext) {
    let credential = ctx.fixtures.create_credential("a", "secret-delete-1").await.unwrap();
    let path = format!("/api/credentials/{}", credential.id);

    ctx.client
        .delete(&path)
        .await
        .unwrap()
        .assert_status(StatusCode::NO_CONTENT);

    ctx.client
        .delete(&path)
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);
    assert_eq!(ctx.fixtures.get_credential_count().await.unwrap(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_validate_working_credential(ctx: &TestContext) {
    let credential = ctx.fixtures.create_credential("good", "good-secret-1").await.unwrap();

    let response = ctx
        .client
        .post_empty(&format!("/api/credentials/{}/validate", credential.id))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(response.str_field("status"), Some("valid"));
    assert_eq!(
        ctx.fixtures.get_credential_status("good").await.unwrap().as_deref(),
        Some("valid")
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_mark_rejected_credential_invalid(ctx: &TestContext) {
    let secret = format!("{}key-1", INVALID_SECRET_PREFIX);
    let credential = ctx.fixtures.create_credential("bad", &secret).await.unwrap();

    let response = ctx
        .client
        .post_empty(&format!("/api/credentials/{}/validate", credential.id))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(response.str_field("status"), Some("invalid"));
    assert!(response.str_field("status_message").is_some());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_keep_rate_limited_credential_valid_with_cooldown(ctx: &TestContext) {
    let secret = format!("{}key-1", LIMITED_SECRET_PREFIX);
    let credential = ctx.fixtures.create_credential("busy", &secret).await.unwrap();

    let response = ctx
        .client
        .post_empty(&format!("/api/credentials/{}/validate", credential.id))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(response.str_field("status"), Some("valid"));
    assert!(response.str_field("cooldown_until").is_some());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_unknown_credential(ctx: &TestContext) {
    let response = ctx
        .client
        .post_empty("/api/credentials/00000000-0000-0000-0000-000000000000/validate")
        .await
        .unwrap();

    response.assert_status(StatusCode::NOT_FOUND);
}
