//! Tests submission payload wire shape.

use std::collections::BTreeMap;

use exam_guard_core::{AnswerValue, SubmissionPayload, SubmissionResult};

#[test]
fn payload_codec_tests_uses_camel_case_and_untagged_answers() {
    let mut answers = BTreeMap::new();
    answers.insert("q1".to_string(), AnswerValue::Choice(2));
    answers.insert("q2".to_string(), AnswerValue::Choices(vec![0, 3]));
    answers.insert("q3".to_string(), AnswerValue::Text("photosynthesis".to_string()));
    let payload = SubmissionPayload {
        answers,
        anomaly_count: 2,
    };

    let encoded = payload.to_json_bytes().expect("encoding should succeed");
    let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
    assert_eq!(value["anomalyCount"], 2);
    assert_eq!(value["answers"]["q1"], 2);
    assert_eq!(value["answers"]["q2"], serde_json::json!([0, 3]));
    assert_eq!(value["answers"]["q3"], "photosynthesis");

    let decoded = SubmissionPayload::from_json_bytes(&encoded).expect("decoding should succeed");
    assert_eq!(decoded, payload);
}

#[test]
fn payload_codec_tests_result_graded_flag_is_optional() {
    let plain: SubmissionResult = serde_json::from_str(r#"{"score":3,"total":5}"#).unwrap();
    assert!(!plain.is_graded());

    let graded: SubmissionResult =
        serde_json::from_str(r#"{"score":3,"total":5,"status":"GRADED"}"#).unwrap();
    assert!(graded.is_graded());
}
