//! HTTP status mapping, Retry-After parsing and body sanitization.

use courier::providers::{check_http_response, ProviderError};

use super::support::serve_once;

async fn checked(status_line: &str, headers: &[(&str, &str)], body: &str) -> ProviderError {
    let (url, _request) = serve_once(status_line, headers, body).await;
    let response = reqwest::get(url).await.expect("request should complete");
    check_http_response(response)
        .await
        .expect_err("response should fail on non-success status")
}

#[tokio::test]
async fn success_maps_to_ok() {
    let (url, _request) = serve_once("202 Accepted", &[], "").await;
    let response = reqwest::get(url).await.expect("request should complete");
    assert!(check_http_response(response).await.is_ok());
}

#[tokio::test]
async fn rate_limit_carries_retry_after_seconds() {
    let err = checked("429 Too Many Requests", &[("Retry-After", "12")], "slow down").await;
    assert_eq!(err.code(), Some(429));
    assert!(err.is_retryable());
    assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(12)));
}

#[tokio::test]
async fn http_date_retry_after_is_ignored() {
    let err = checked(
        "429 Too Many Requests",
        &[("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT")],
        "",
    )
    .await;
    assert_eq!(err.retry_after(), None);
}

#[tokio::test]
async fn client_errors_are_not_retryable() {
    let err = checked("400 Bad Request", &[], r#"{"errors":[{"message":"bad"}]}"#).await;
    assert_eq!(err.code(), Some(400));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn error_bodies_are_redacted() {
    let key = "SG.abcdefghijklmnopqrstuv.abcdefghijklmnopqrstuvwxyz0123";
    let err = checked("401 Unauthorized", &[], &format!("invalid key {key}")).await;
    match err {
        ProviderError::Status { message, .. } => {
            assert!(!message.contains(key));
            assert!(message.contains("[REDACTED]"));
        }
        other => panic!("expected status error, got: {other}"),
    }
}

#[tokio::test]
async fn long_error_bodies_are_truncated() {
    let err = checked("500 Internal Server Error", &[], &"x".repeat(400)).await;
    match err {
        ProviderError::Status { message, .. } => assert!(message.ends_with("...[truncated]")),
        other => panic!("expected status error, got: {other}"),
    }
}
