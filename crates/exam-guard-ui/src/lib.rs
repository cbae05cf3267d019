#![warn(missing_docs)]
//! # exam-guard-ui
//!
//! ## Purpose
//! Derived, display-ready state for the exam screen.
//!
//! ## Responsibilities
//! - Project gate decisions into guidance text.
//! - Render the countdown and the result summary (score, pass/fail,
//!   anomaly count).
//! - Collect non-fatal failures as banners.
//! - Format the proctoring report rows with RFC 3339 timestamps.
//!
//! ## Data flow
//! Session, gate, media and lockdown events mutate [`ExamUiState`], which the
//! host shell renders.
//!
//! ## Ownership and lifetimes
//! All values are owned strings so reducers never borrow session state.
//!
//! ## Error model
//! Only timestamp formatting can fail ([`UiError`]).
//!
//! ## Security and privacy notes
//! UI state never holds tokens or answers.

use exam_guard_core::{AnomalyEvent, AnomalyKind, ErrorCategory, Severity, SubmissionResult};
use exam_guard_gate::{BlockReason, GateDecision};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Pass threshold when the exam does not declare one.
pub const DEFAULT_PASS_PERCENTAGE: u8 = 50;

/// Status of a supporting stage (lockdown, proctoring, network).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Not started.
    Idle,
    /// Engaged and healthy.
    Running,
    /// Engaged with reduced capability.
    Degraded,
    /// Intentionally disabled.
    Disabled,
}

/// Non-fatal failure surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Failure class.
    pub category: ErrorCategory,
    /// Display text.
    pub message: String,
}

impl Banner {
    /// Builds a banner with category-specific lead text.
    pub fn new(category: ErrorCategory, detail: &str) -> Self {
        let lead = match category {
            ErrorCategory::PermissionDenied => "Permission denied",
            ErrorCategory::PreconditionFailed => "Cannot start exam",
            ErrorCategory::NetworkFailure => "Network problem",
            ErrorCategory::InvariantViolation => "Unexpected state",
        };
        let message = if detail.is_empty() {
            lead.to_string()
        } else {
            format!("{lead}: {detail}")
        };
        Self { category, message }
    }
}

/// Result summary derived from the server grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultView {
    /// Points awarded.
    pub score: u32,
    /// Points available.
    pub total: u32,
    /// Rounded-down percentage; `0` when `total` is zero.
    pub percentage: u8,
    /// Whether `percentage` meets the threshold.
    pub passed: bool,
    /// Anomalies sent with the submission.
    pub anomaly_count: u32,
}

impl ResultView {
    /// Derives the view; `pass_percentage` falls back to
    /// [`DEFAULT_PASS_PERCENTAGE`].
    pub fn new(result: &SubmissionResult, pass_percentage: Option<u8>, anomaly_count: u32) -> Self {
        let percentage = if result.total == 0 {
            0
        } else {
            let ratio = u64::from(result.score.min(result.total)) * 100 / u64::from(result.total);
            ratio as u8
        };
        let threshold = pass_percentage.unwrap_or(DEFAULT_PASS_PERCENTAGE);
        Self {
            score: result.score,
            total: result.total,
            percentage,
            passed: result.total > 0 && percentage >= threshold,
            anomaly_count,
        }
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let verdict = if self.passed { "Passed" } else { "Not passed" };
        format!(
            "{}/{} ({}%) - {verdict} - {} anomalies",
            self.score, self.total, self.percentage, self.anomaly_count
        )
    }
}

/// Guidance text for a gate decision.
pub fn gate_guidance(decision: &GateDecision) -> String {
    match decision {
        GateDecision::Allowed => "You can start the exam.".to_string(),
        GateDecision::MustDownloadConfig => "This exam must be taken in Safe Exam Browser. \
             Download the configuration file and open it to relaunch the exam."
            .to_string(),
        GateDecision::Blocked(BlockReason::ServerRequiresControlledBrowser(message))
            if !message.is_empty() =>
        {
            message.clone()
        }
        GateDecision::Blocked(reason) => format!("Exam start blocked: {reason}."),
    }
}

/// Countdown text as `mm:ss`; minutes are not wrapped into hours.
pub fn format_time_left(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Formats epoch milliseconds as RFC 3339 UTC.
///
/// # Errors
/// Returns [`UiError::Timestamp`] when the instant is out of range.
pub fn format_report_timestamp(epoch_ms: u64) -> Result<String, UiError> {
    let nanos = i128::from(epoch_ms) * 1_000_000;
    let instant = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|error| UiError::Timestamp(error.to_string()))?;
    instant
        .format(&Rfc3339)
        .map_err(|error| UiError::Timestamp(error.to_string()))
}

/// One line of the proctoring report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Human label for the anomaly.
    pub label: &'static str,
    /// Severity.
    pub severity: Severity,
    /// RFC 3339 timestamp.
    pub at: String,
}

/// Human label for an anomaly kind.
pub fn anomaly_label(kind: AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::Backgrounded => "App moved to background",
        AnomalyKind::WindowBlurred => "Exam window lost focus",
        AnomalyKind::TabHidden => "Exam tab hidden",
        AnomalyKind::CameraLost => "Camera stopped",
        AnomalyKind::MicrophoneLost => "Microphone stopped",
        AnomalyKind::LockdownLost => "Lockdown lost",
        AnomalyKind::CaptureShortcutPressed => "Screenshot shortcut pressed",
    }
}

/// Builds report rows in event order.
///
/// # Errors
/// Propagates [`UiError`] from timestamp formatting.
pub fn report_rows(events: &[AnomalyEvent]) -> Result<Vec<ReportRow>, UiError> {
    events
        .iter()
        .map(|event| {
            Ok(ReportRow {
                label: anomaly_label(event.kind),
                severity: event.severity,
                at: format_report_timestamp(event.timestamp_ms)?,
            })
        })
        .collect()
}

/// Aggregate exam-screen state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamUiState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Whether exam data loaded.
    pub exam_loaded: bool,
    /// Latest gate decision.
    pub gate: Option<GateDecision>,
    /// Lockdown stage.
    pub lockdown: StageStatus,
    /// Camera/microphone stage.
    pub proctoring: StageStatus,
    /// Whether the host requires media before start.
    pub proctoring_required: bool,
    /// Countdown text.
    pub time_left: String,
    /// Anomaly summary text.
    pub anomaly_status: String,
    /// Outstanding banners.
    pub banners: Vec<Banner>,
    /// Result after submission.
    pub result: Option<ResultView>,
}

impl ExamUiState {
    /// Creates the pre-load state.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            exam_loaded: false,
            gate: None,
            lockdown: StageStatus::Idle,
            proctoring: StageStatus::Idle,
            proctoring_required: false,
            time_left: format_time_left(0),
            anomaly_status: "No anomalies".to_string(),
            banners: Vec::new(),
            result: None,
        }
    }

    /// Appends a banner unless an identical one is showing.
    pub fn push_banner(&mut self, banner: Banner) {
        if !self.banners.contains(&banner) {
            self.banners.push(banner);
        }
    }

    /// Whether the start button is enabled.
    pub fn can_start_exam(&self) -> bool {
        let media_ok = !self.proctoring_required || self.proctoring == StageStatus::Running;
        self.exam_loaded
            && self.result.is_none()
            && self.gate.as_ref().is_some_and(GateDecision::permits_start)
            && media_ok
    }

    /// Guidance text for the current gate decision.
    pub fn guidance(&self) -> Option<String> {
        self.gate.as_ref().map(gate_guidance)
    }

    /// Updates the countdown text.
    pub fn set_time_left(&mut self, seconds: u64) {
        self.time_left = format_time_left(seconds);
    }

    /// Updates the anomaly summary.
    pub fn apply_anomalies(&mut self, events: &[AnomalyEvent]) {
        let Some(highest) = events.iter().map(|event| event.severity).max() else {
            self.anomaly_status = "No anomalies".to_string();
            return;
        };
        let level = match highest {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        self.anomaly_status = format!("{} anomalies (highest: {level})", events.len());
    }
}

/// UI errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UiError {
    /// Timestamp outside the representable range.
    #[error("timestamp cannot be formatted: {0}")]
    Timestamp(String),
}

impl UiError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::InvariantViolation
    }
}
