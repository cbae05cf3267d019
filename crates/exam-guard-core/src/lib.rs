#![warn(missing_docs)]
//! # exam-guard-core
//!
//! ## Purpose
//! Defines the pure data model shared by every `exam-guard` crate.
//!
//! ## Responsibilities
//! - Represent exam definitions, questions and answer values as served by the
//!   exam API.
//! - Represent one student's [`ExamAttempt`] and its lifecycle status.
//! - Represent severity-tagged [`AnomalyEvent`] records.
//! - Encode/decode submission payloads and results for transport.
//!
//! ## Data flow
//! The API layer decodes [`ExamDefinition`] -> the attempt session owns an
//! [`ExamAttempt`] and mutates its answers -> at submission time the answers
//! and anomaly count are packaged into [`SubmissionPayload`] -> the server
//! answers with [`SubmissionResult`].
//!
//! ## Ownership and lifetimes
//! All values own their strings and maps so that sessions, monitors and
//! transports never share borrowed state across callback boundaries.
//!
//! ## Error model
//! Decoding and validation failures return [`CoreError`]. Every error type in
//! the workspace additionally maps onto [`ErrorCategory`].
//!
//! ## Security and privacy notes
//! Answers are student data. This crate never logs, and callers must not log
//! answer maps or payload bodies.
//!
//! ## Example
//! ```rust
//! use exam_guard_core::{AnomalyEvent, AnomalyKind, Severity};
//!
//! let event = AnomalyEvent::new(AnomalyKind::Backgrounded, 1_000);
//! assert_eq!(event.severity, Severity::Medium);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Duration applied when an exam does not declare a positive duration.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

/// Coarse error taxonomy used for banners and runtime observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Camera, microphone or shortcut registration was refused.
    PermissionDenied,
    /// Exam start is blocked until the user acts (controlled browser, data).
    PreconditionFailed,
    /// Load or submit request failed in transit or on the server.
    NetworkFailure,
    /// An operation was invoked outside its legal state.
    InvariantViolation,
}

/// Exam metadata served by `GET /exams/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDefinition {
    /// Server exam identifier.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Declared duration; `None` or `0` falls back to
    /// [`DEFAULT_DURATION_MINUTES`].
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Whether the exam requires the controlled browser.
    #[serde(default)]
    pub seb_enabled: bool,
    /// Pass threshold in percent, when the exam declares one.
    #[serde(default)]
    pub pass_percentage: Option<u8>,
    /// Whether the camera/microphone preview should run during the attempt.
    #[serde(default)]
    pub proctoring_enabled: bool,
    /// Questions, present when requested with `includeQuestions=true`.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl ExamDefinition {
    /// Returns the effective attempt duration in seconds.
    pub fn duration_seconds(&self) -> u64 {
        let minutes = self
            .duration_minutes
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_DURATION_MINUTES);
        u64::from(minutes) * 60
    }

    /// Decodes and validates an exam definition.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] for malformed JSON and
    /// [`CoreError::InvalidExam`] when the id is blank.
    pub fn from_json_bytes(raw: &[u8]) -> Result<Self, CoreError> {
        let exam: Self = serde_json::from_slice(raw)?;
        if exam.id.trim().is_empty() {
            return Err(CoreError::InvalidExam("exam id is empty".to_string()));
        }
        Ok(exam)
    }
}

/// One exam question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Server question identifier, used as the answer map key.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Prompt text. Older payloads send it as `text`.
    #[serde(alias = "text")]
    pub prompt: String,
    /// Ordered answer options.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// Question kind; unknown kinds decode as [`QuestionKind::Other`].
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
}

/// Answer option. The wire form is either a bare string or `{ "text": .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawOption")]
pub struct QuestionOption {
    /// Option label.
    pub text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
    Bare(String),
    Object { text: String },
}

impl From<RawOption> for QuestionOption {
    fn from(raw: RawOption) -> Self {
        match raw {
            RawOption::Bare(text) | RawOption::Object { text } => Self { text },
        }
    }
}

/// Question kinds understood by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one option may be selected.
    #[default]
    #[serde(alias = "mcq", alias = "single")]
    SingleChoice,
    /// Any subset of options may be selected.
    #[serde(alias = "multiple")]
    MultipleChoice,
    /// Two-option true/false question.
    TrueFalse,
    /// Free-text answer.
    ShortAnswer,
    /// Kind introduced by a newer server.
    #[serde(other)]
    Other,
}

/// Value recorded for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Index of the selected option.
    Choice(u32),
    /// Indices of all selected options.
    Choices(Vec<u32>),
    /// Free-text answer.
    Text(String),
}

/// Attempt lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    /// Attempt exists but the timer has not started.
    NotStarted,
    /// Timer running, answers accepted.
    InProgress,
    /// Submission latched; attempt is immutable.
    Submitted,
    /// Server reported a final grade.
    Graded,
}

/// One student's timed instance of an exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamAttempt {
    /// Server-issued attempt identifier.
    pub id: String,
    /// Exam the attempt belongs to.
    pub exam_id: String,
    /// Epoch milliseconds when the attempt entered `InProgress`.
    pub started_at_ms: Option<u64>,
    /// Total allotted time.
    pub duration_seconds: u64,
    /// Latest answer per question id.
    pub answers: BTreeMap<String, AnswerValue>,
    /// Lifecycle status.
    pub status: AttemptStatus,
    /// Remaining seconds on the countdown.
    pub time_left_seconds: u64,
}

impl ExamAttempt {
    /// Creates a `NotStarted` attempt with a full countdown.
    pub fn new(
        id: impl Into<String>,
        exam_id: impl Into<String>,
        duration_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            exam_id: exam_id.into(),
            started_at_ms: None,
            duration_seconds,
            answers: BTreeMap::new(),
            status: AttemptStatus::NotStarted,
            time_left_seconds: duration_seconds,
        }
    }

    /// Returns `true` while answers may still change.
    pub fn is_open(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }
}

/// Kind of anomalous client behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Mobile app moved to the background.
    Backgrounded,
    /// Browser or desktop window lost focus.
    WindowBlurred,
    /// Browser tab became hidden.
    TabHidden,
    /// Camera track ended unexpectedly.
    CameraLost,
    /// Microphone track ended unexpectedly.
    MicrophoneLost,
    /// Desktop lockdown was lost while the attempt was open.
    LockdownLost,
    /// A blocked capture shortcut was pressed.
    CaptureShortcutPressed,
}

impl AnomalyKind {
    /// Severity assigned to this kind of event.
    pub fn severity(self) -> Severity {
        match self {
            Self::CaptureShortcutPressed => Severity::Low,
            Self::Backgrounded | Self::WindowBlurred | Self::TabHidden => Severity::Medium,
            Self::CameraLost | Self::MicrophoneLost | Self::LockdownLost => Severity::High,
        }
    }
}

/// Anomaly severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Environment left the exam surface.
    Medium,
    /// Monitoring coverage was lost.
    High,
}

/// Timestamped, severity-tagged record of suspicious behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// Epoch milliseconds when the transition was observed.
    pub timestamp_ms: u64,
    /// Severity derived from `kind`.
    pub severity: Severity,
}

impl AnomalyEvent {
    /// Creates an event with severity derived from `kind`.
    pub fn new(kind: AnomalyKind, timestamp_ms: u64) -> Self {
        Self {
            kind,
            timestamp_ms,
            severity: kind.severity(),
        }
    }
}

/// Body of the submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    /// Final answers keyed by question id.
    pub answers: BTreeMap<String, AnswerValue>,
    /// Anomalies counted between start and the submit latch.
    pub anomaly_count: u32,
}

impl SubmissionPayload {
    /// Serializes payload to compact JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(CoreError::Codec)
    }

    /// Deserializes payload from JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON decoding fails.
    pub fn from_json_bytes(raw: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(raw).map_err(CoreError::Codec)
    }
}

/// Grading response returned by the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    /// Points awarded.
    pub score: u32,
    /// Points available.
    pub total: u32,
    /// Optional server status, `"graded"` once grading is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl SubmissionResult {
    /// Returns `true` when the server reports a final grade.
    pub fn is_graded(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("graded"))
    }
}

/// Error type for core decoding and validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Exam payload decoded but violates client expectations.
    #[error("invalid exam: {0}")]
    InvalidExam(String),
    /// JSON encoding/decoding error.
    #[error("payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CoreError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::PreconditionFailed
    }
}

/// Deserializes an identifier the server may send as a string or a number.
///
/// # Errors
/// Returns the deserializer error when the value is neither.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
