//! Shared fakes for attempt session integration tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use exam_guard_api::ApiError;
use exam_guard_core::{AnswerValue, ExamDefinition, Question, SubmissionPayload, SubmissionResult};
use exam_guard_monitor::{AnomalyMonitor, ManualClock};
use exam_guard_session::{AttemptBackend, AttemptSession, ExamSource};

/// Exam source serving fixed data.
pub struct FakeSource {
    pub exam: Result<ExamDefinition, u16>,
    pub questions: Vec<Question>,
}

impl ExamSource for FakeSource {
    fn fetch_exam(&self, _exam_id: &str, _token: &str) -> Result<ExamDefinition, ApiError> {
        self.exam.clone().map_err(|status| ApiError::Server {
            status,
            message: "unavailable".to_string(),
        })
    }

    fn fetch_questions(&self, _exam_id: &str, _token: &str) -> Result<Vec<Question>, ApiError> {
        Ok(self.questions.clone())
    }
}

/// Backend grading single-choice answers against a key.
#[derive(Default)]
pub struct GradingBackend {
    pub key: BTreeMap<String, u32>,
    pub fail: bool,
    pub requests: Mutex<Vec<SubmissionPayload>>,
}

#[allow(dead_code)]
impl GradingBackend {
    pub fn requests(&self) -> Vec<SubmissionPayload> {
        self.requests.lock().expect("request lock").clone()
    }
}

impl AttemptBackend for GradingBackend {
    fn submit(
        &self,
        _attempt_id: &str,
        _token: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionResult, ApiError> {
        self.requests
            .lock()
            .expect("request lock")
            .push(payload.clone());
        if self.fail {
            return Err(ApiError::Timeout);
        }
        let score = self
            .key
            .iter()
            .filter(|(id, expected)| {
                payload.answers.get(*id) == Some(&AnswerValue::Choice(**expected))
            })
            .count() as u32;
        Ok(SubmissionResult {
            score,
            total: self.key.len() as u32,
            status: Some("graded".to_string()),
        })
    }
}

#[allow(dead_code)]
pub fn exam(duration_minutes: u32, question_count: usize) -> ExamDefinition {
    let questions: Vec<serde_json::Value> = (0..question_count)
        .map(|index| {
            serde_json::json!({
                "id": format!("q{index}"),
                "prompt": format!("Question {index}"),
                "options": ["a", "b", "c"],
                "type": "mcq"
            })
        })
        .collect();
    let raw = serde_json::json!({
        "id": "exam-1",
        "title": "Algebra",
        "durationMinutes": duration_minutes,
        "questions": questions,
    });
    ExamDefinition::from_json_bytes(raw.to_string().as_bytes()).expect("exam fixture")
}

#[allow(dead_code)]
pub fn backend_for(exam: &ExamDefinition) -> Arc<GradingBackend> {
    Arc::new(GradingBackend {
        key: exam
            .questions
            .iter()
            .map(|question| (question.id.clone(), 1))
            .collect(),
        ..Default::default()
    })
}

#[allow(dead_code)]
pub fn started(exam: ExamDefinition, backend: Arc<GradingBackend>) -> AttemptSession {
    let mut session = AttemptSession::new(exam, backend, "token");
    let monitor = AnomalyMonitor::new(Arc::new(ManualClock::new(1_000)));
    assert!(session.begin("attempt-1", 1_000, monitor));
    session
}
