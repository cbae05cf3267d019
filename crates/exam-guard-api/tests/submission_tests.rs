//! Integration tests for submission keys and failure classification.

mod common;

use std::collections::BTreeMap;

use exam_guard_api::{
    ApiError, FailureClass, classify_api_error, idempotency_key_for_submission,
};
use exam_guard_core::{AnswerValue, SubmissionPayload};

fn payload(choice: u32) -> SubmissionPayload {
    let mut answers = BTreeMap::new();
    answers.insert("q2".to_string(), AnswerValue::Text("forty two".to_string()));
    answers.insert("q1".to_string(), AnswerValue::Choice(choice));
    SubmissionPayload {
        answers,
        anomaly_count: 2,
    }
}

#[test]
fn submission_tests_idempotency_key_is_stable_and_content_sensitive() {
    let key_a = idempotency_key_for_submission("a-1", &payload(1)).expect("key");
    let key_b = idempotency_key_for_submission("a-1", &payload(1)).expect("key");
    let other_answer = idempotency_key_for_submission("a-1", &payload(0)).expect("key");
    let other_attempt = idempotency_key_for_submission("a-2", &payload(1)).expect("key");

    assert_eq!(key_a, key_b);
    assert_eq!(key_a.len(), 64);
    assert_ne!(key_a, other_answer);
    assert_ne!(key_a, other_attempt);
}

#[test]
fn submission_tests_submit_sends_key_and_body_once() {
    let transport =
        common::ScriptedTransport::new(vec![common::ok(r#"{"score":3,"total":4,"status":"graded"}"#)]);
    let client = common::client(transport.clone(), common::fast_retry(3));

    let result = client
        .submit_attempt("a-1", "tok", &payload(1))
        .expect("submit should succeed");
    assert_eq!((result.score, result.total), (3, 4));
    assert!(result.is_graded());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/api/attempts/a-1/submit");
    assert_eq!(
        requests[0].idempotency_key,
        Some(idempotency_key_for_submission("a-1", &payload(1)).expect("key"))
    );
    let body: serde_json::Value =
        serde_json::from_slice(requests[0].body.as_deref().expect("body")).expect("json body");
    assert_eq!(body["anomalyCount"], 2);
    assert_eq!(body["answers"]["q1"], 1);
}

#[test]
fn submission_tests_submit_failure_is_not_retried() {
    let transport = common::ScriptedTransport::new(vec![common::status(502, "")]);
    let client = common::client(transport.clone(), common::fast_retry(3));
    assert!(client.submit_attempt("a-1", "tok", &payload(1)).is_err());
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn submission_tests_classification_distinguishes_transient_and_permanent() {
    assert_eq!(
        classify_api_error(&ApiError::Server {
            status: 503,
            message: String::new()
        }),
        FailureClass::Retriable
    );
    assert_eq!(classify_api_error(&ApiError::Timeout), FailureClass::Retriable);
    assert_eq!(
        classify_api_error(&ApiError::Client {
            status: 400,
            message: String::new()
        }),
        FailureClass::Permanent
    );
    assert_eq!(
        classify_api_error(&ApiError::SebRequired {
            message: String::new()
        }),
        FailureClass::Permanent
    );
}
