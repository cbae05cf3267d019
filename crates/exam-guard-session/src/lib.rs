#![warn(missing_docs)]
//! # exam-guard-session
//!
//! ## Purpose
//! The exam-taking state machine: question and answer model, countdown,
//! submission and result.
//!
//! ## Responsibilities
//! - Load exam metadata and questions, failing into an empty state instead of
//!   starting.
//! - Run `NotStarted -> InProgress -> Submitted` with a one-second tick.
//! - Guarantee at most one submission request per attempt through a
//!   single-assignment [`SubmitLatch`].
//! - Seal the attempt's [`AnomalyMonitor`] at the latch and send its count.
//!
//! ## Data flow
//! [`ExamSource`] -> [`AttemptSession::load`] -> [`AttemptSession::begin`]
//! -> answers/ticks -> [`AttemptSession::submit`] (user or timer) ->
//! [`AttemptBackend::submit`] -> [`SubmissionResult`].
//!
//! ## Ownership and lifetimes
//! The session exclusively owns the [`ExamAttempt`] and the monitor for the
//! attempt. Dropping the session drops the monitor, which releases its
//! lifecycle subscriptions.
//!
//! ## Error model
//! Load failures return [`SessionError`]. Submission never returns `Err`: a
//! rejected second submit is [`SubmitOutcome::Ignored`], and a transport
//! failure is [`SubmitOutcome::Failed`] with the error retained for the UI.
//! There is no automatic resubmission.
//!
//! ## Security and privacy notes
//! Answers are never logged; only counts and ids are.

use std::sync::Arc;

use exam_guard_api::{ApiError, ExamApiClient};
use exam_guard_core::{
    AnomalyKind, AnswerValue, AttemptStatus, ErrorCategory, ExamAttempt, ExamDefinition,
    Question, SubmissionPayload, SubmissionResult,
};
use exam_guard_monitor::{AnomalyMonitor, AnomalySnapshot, LifecycleTransition};
use thiserror::Error;

/// Loads exam data.
pub trait ExamSource: Send + Sync {
    /// Fetches exam metadata, with questions when the server embeds them.
    fn fetch_exam(&self, exam_id: &str, token: &str) -> Result<ExamDefinition, ApiError>;
    /// Fetches questions from the dedicated endpoint.
    fn fetch_questions(&self, exam_id: &str, token: &str) -> Result<Vec<Question>, ApiError>;
}

/// Sends the final submission.
pub trait AttemptBackend: Send + Sync {
    /// Submits `payload` for `attempt_id`.
    fn submit(
        &self,
        attempt_id: &str,
        token: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionResult, ApiError>;
}

impl ExamSource for ExamApiClient {
    fn fetch_exam(&self, exam_id: &str, token: &str) -> Result<ExamDefinition, ApiError> {
        ExamApiClient::fetch_exam(self, exam_id, token, true)
    }

    fn fetch_questions(&self, exam_id: &str, token: &str) -> Result<Vec<Question>, ApiError> {
        ExamApiClient::fetch_questions(self, exam_id, token)
    }
}

impl AttemptBackend for ExamApiClient {
    fn submit(
        &self,
        attempt_id: &str,
        token: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionResult, ApiError> {
        self.submit_attempt(attempt_id, token, payload)
    }
}

/// What caused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// User confirmed submission.
    User,
    /// Countdown reached zero.
    TimerExpired,
}

/// Single-assignment submit guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitLatch {
    /// No submission yet.
    #[default]
    Pending,
    /// Latched by the first trigger; never reset.
    Latched(SubmitTrigger),
}

impl SubmitLatch {
    /// Latches with `trigger` unless already latched. Returns whether this
    /// call won.
    fn latch(&mut self, trigger: SubmitTrigger) -> bool {
        match self {
            Self::Pending => {
                *self = Self::Latched(trigger);
                true
            }
            Self::Latched(_) => false,
        }
    }
}

/// Why a submit call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// The attempt never entered `InProgress`.
    NotStarted,
    /// A previous trigger already latched.
    AlreadyLatched(SubmitTrigger),
}

/// Result of [`AttemptSession::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The request was sent and the server graded it.
    Submitted(SubmissionResult),
    /// The request was sent and failed; the attempt stays `Submitted`.
    Failed(ErrorCategory),
    /// Nothing was sent.
    Ignored(IgnoredReason),
}

/// Result of [`AttemptSession::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Attempt is not in progress.
    Idle,
    /// Seconds left after this tick.
    Running(u64),
    /// Countdown reached zero and triggered submission.
    Expired(SubmitOutcome),
}

/// One student's attempt at one exam.
pub struct AttemptSession {
    exam: ExamDefinition,
    token: String,
    backend: Arc<dyn AttemptBackend>,
    attempt: ExamAttempt,
    monitor: Option<AnomalyMonitor>,
    latch: SubmitLatch,
    snapshot: Option<AnomalySnapshot>,
    result: Option<SubmissionResult>,
    submit_failure: Option<ApiError>,
}

impl AttemptSession {
    /// Loads `exam_id` and builds a `NotStarted` session.
    ///
    /// Questions embedded in the exam response are used when present;
    /// otherwise the dedicated questions endpoint is queried.
    ///
    /// # Errors
    /// - [`SessionError::ExamUnavailable`] when either request fails.
    /// - [`SessionError::NoQuestions`] when the exam has no questions.
    pub fn load(
        source: &dyn ExamSource,
        backend: Arc<dyn AttemptBackend>,
        exam_id: &str,
        token: &str,
    ) -> Result<Self, SessionError> {
        let mut exam = source
            .fetch_exam(exam_id, token)
            .map_err(SessionError::ExamUnavailable)?;
        if exam.questions.is_empty() {
            exam.questions = source
                .fetch_questions(exam_id, token)
                .map_err(SessionError::ExamUnavailable)?;
        }
        if exam.questions.is_empty() {
            return Err(SessionError::NoQuestions(exam.id));
        }
        tracing::info!(
            stage = "session",
            action = "load",
            exam_id = %exam.id,
            questions = exam.questions.len(),
            "exam loaded"
        );
        Ok(Self::new(exam, backend, token))
    }

    /// Builds a `NotStarted` session from an already loaded exam.
    pub fn new(
        exam: ExamDefinition,
        backend: Arc<dyn AttemptBackend>,
        token: impl Into<String>,
    ) -> Self {
        let attempt = ExamAttempt::new(String::new(), exam.id.clone(), exam.duration_seconds());
        Self {
            exam,
            token: token.into(),
            backend,
            attempt,
            monitor: None,
            latch: SubmitLatch::Pending,
            snapshot: None,
            result: None,
            submit_failure: None,
        }
    }

    /// Replaces the countdown before the attempt starts. Zero is ignored.
    pub fn override_duration_minutes(&mut self, minutes: u32) {
        if self.attempt.status == AttemptStatus::NotStarted && minutes > 0 {
            self.attempt.duration_seconds = u64::from(minutes) * 60;
            self.attempt.time_left_seconds = self.attempt.duration_seconds;
        }
    }

    /// Enters `InProgress` with the server attempt id and arms `monitor`.
    ///
    /// Returns `false` without side effects unless the attempt is
    /// `NotStarted`.
    pub fn begin(
        &mut self,
        attempt_id: impl Into<String>,
        now_ms: u64,
        monitor: AnomalyMonitor,
    ) -> bool {
        if self.attempt.status != AttemptStatus::NotStarted {
            tracing::debug!(stage = "session", "begin ignored; attempt already started");
            return false;
        }
        self.attempt.id = attempt_id.into();
        self.attempt.started_at_ms = Some(now_ms);
        self.attempt.time_left_seconds = self.attempt.duration_seconds;
        self.attempt.status = AttemptStatus::InProgress;
        monitor.arm();
        self.monitor = Some(monitor);
        tracing::info!(
            stage = "session",
            action = "begin",
            attempt_id = %self.attempt.id,
            duration_seconds = self.attempt.duration_seconds,
            "attempt in progress"
        );
        true
    }

    /// Upserts an answer while `InProgress`. Returns whether it was stored.
    pub fn select_answer(&mut self, question_id: impl Into<String>, value: AnswerValue) -> bool {
        if !self.attempt.is_open() {
            return false;
        }
        self.attempt.answers.insert(question_id.into(), value);
        true
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.attempt.is_open() {
            return TickOutcome::Idle;
        }
        self.attempt.time_left_seconds = self.attempt.time_left_seconds.saturating_sub(1);
        if self.attempt.time_left_seconds == 0 {
            TickOutcome::Expired(self.submit(SubmitTrigger::TimerExpired))
        } else {
            TickOutcome::Running(self.attempt.time_left_seconds)
        }
    }

    /// Forwards a lifecycle transition to the monitor.
    pub fn observe(&self, transition: LifecycleTransition) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(|monitor| monitor.observe(transition))
    }

    /// Records an anomaly raised outside the lifecycle source.
    pub fn record_anomaly(&self, kind: AnomalyKind) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(|monitor| monitor.record(kind))
    }

    /// Submits the attempt at most once.
    ///
    /// The latch and the `Submitted` status are set, and the monitor sealed,
    /// before the request is sent.
    pub fn submit(&mut self, trigger: SubmitTrigger) -> SubmitOutcome {
        if let SubmitLatch::Latched(first) = self.latch {
            tracing::debug!(stage = "session", ?trigger, ?first, "duplicate submit ignored");
            return SubmitOutcome::Ignored(IgnoredReason::AlreadyLatched(first));
        }
        if self.attempt.status != AttemptStatus::InProgress {
            return SubmitOutcome::Ignored(IgnoredReason::NotStarted);
        }
        self.latch.latch(trigger);
        self.attempt.status = AttemptStatus::Submitted;

        let snapshot = self
            .monitor
            .as_mut()
            .map(AnomalyMonitor::seal)
            .unwrap_or_default();
        let payload = SubmissionPayload {
            answers: self.attempt.answers.clone(),
            anomaly_count: snapshot.count,
        };
        self.snapshot = Some(snapshot);

        tracing::info!(
            stage = "session",
            action = "submit",
            attempt_id = %self.attempt.id,
            ?trigger,
            answered = payload.answers.len(),
            anomaly_count = payload.anomaly_count,
            "submitting attempt"
        );

        match self.backend.submit(&self.attempt.id, &self.token, &payload) {
            Ok(result) => {
                if result.is_graded() {
                    self.attempt.status = AttemptStatus::Graded;
                }
                self.result = Some(result.clone());
                SubmitOutcome::Submitted(result)
            }
            Err(error) => {
                let category = error.category();
                tracing::warn!(stage = "session", %error, "submission failed; not retrying");
                self.submit_failure = Some(error);
                SubmitOutcome::Failed(category)
            }
        }
    }

    /// Releases the monitor's subscriptions without submitting.
    pub fn detach_monitor(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.detach();
        }
    }

    /// Exam definition.
    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    /// Attempt state.
    pub fn attempt(&self) -> &ExamAttempt {
        &self.attempt
    }

    /// Lifecycle status.
    pub fn status(&self) -> AttemptStatus {
        self.attempt.status
    }

    /// Submit latch.
    pub fn latch(&self) -> SubmitLatch {
        self.latch
    }

    /// Anomaly count: live while in progress, frozen after the latch.
    pub fn anomaly_count(&self) -> u32 {
        match (&self.snapshot, &self.monitor) {
            (Some(snapshot), _) => snapshot.count,
            (None, Some(monitor)) => monitor.count(),
            (None, None) => 0,
        }
    }

    /// Events frozen at the latch.
    pub fn anomaly_snapshot(&self) -> Option<&AnomalySnapshot> {
        self.snapshot.as_ref()
    }

    /// Server result after a successful submission.
    pub fn result(&self) -> Option<&SubmissionResult> {
        self.result.as_ref()
    }

    /// Error from a failed submission.
    pub fn submit_failure(&self) -> Option<&ApiError> {
        self.submit_failure.as_ref()
    }
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Exam or question data could not be fetched.
    #[error("exam data unavailable: {0}")]
    ExamUnavailable(#[source] ApiError),
    /// The exam has no questions to answer.
    #[error("exam {0} has no questions")]
    NoQuestions(String),
}

impl SessionError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ExamUnavailable(error) => error.category(),
            Self::NoQuestions(_) => ErrorCategory::PreconditionFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_is_single_assignment() {
        let mut latch = SubmitLatch::default();
        assert!(latch.latch(SubmitTrigger::TimerExpired));
        assert!(!latch.latch(SubmitTrigger::User));
        assert_eq!(latch, SubmitLatch::Latched(SubmitTrigger::TimerExpired));
    }
}
