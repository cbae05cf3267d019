#![warn(missing_docs)]
//! # exam-guard-app
//!
//! ## Purpose
//! Orchestrates one secure exam screen: load, gate, start, monitored attempt,
//! optional lockdown and proctoring preview, submission and teardown.
//!
//! ## Responsibilities
//! - Load [`AppConfig`] from the environment with kill switches for lockdown
//!   and proctoring.
//! - Wire the gate, session, monitor, media and desktop bridge for one exam
//!   through [`ExamScreen`].
//! - Release the monitor subscription, media stream and lockdown exactly once,
//!   on submit or when the screen is dropped.
//! - Provide log redaction helpers.
//!
//! ## Data flow
//! [`ExamScreen::open`] loads and gates -> optional
//! [`ExamScreen::prepare_proctoring`] -> [`ExamScreen::start`] ->
//! ticks/answers/host events -> [`ExamScreen::submit`] or timer expiry ->
//! teardown -> [`ExamUiState`] result.
//!
//! ## Ownership and lifetimes
//! The screen owns the session, media session and bridge for its lifetime;
//! the lifecycle source and clock are shared with the host.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`] and categorized for
//! banners and runtime observability.
//!
//! ## Security and privacy notes
//! - Lockdown and proctoring can be disabled with environment kill switches.
//! - [`redact_sensitive`] and [`redact_url`] strip credentials from log
//!   lines.

use std::sync::Arc;

use exam_guard_api::{ApiError, ExamApiClient, validate_base_url};
use exam_guard_core::{AnomalyKind, AnswerValue, AttemptStatus, ErrorCategory};
use exam_guard_gate::{
    ClientIdentity, ConfigArtifact, ConfigPlatform, GateDecision, GateError, SebGate,
};
use exam_guard_lockdown::{BridgeError, DesktopBridge, QuitDirective, SebModeOptions};
use exam_guard_media::{
    AcquisitionTicket, CompleteOutcome, MediaDevices, MediaError, MediaStream,
    ProctoringMediaSession, StartOutcome, TrackKind,
};
use exam_guard_monitor::{AnomalyMonitor, Clock, LifecycleSource, MonitorError};
use exam_guard_platform::ShortcutId;
use exam_guard_restriction::CAPTURE_SHORTCUTS;
use exam_guard_session::{
    AttemptSession, SessionError, SubmitOutcome, SubmitTrigger, TickOutcome,
};
use exam_guard_ui::{Banner, ExamUiState, ResultView, StageStatus};
use thiserror::Error;
use url::Url;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("EXAM_GUARD_VERSION");

/// API base URL variable.
pub const ENV_API_BASE: &str = "EXAM_GUARD_API_BASE";
/// Lockdown kill switch variable.
pub const ENV_LOCKDOWN_ENABLED: &str = "EXAM_GUARD_LOCKDOWN_ENABLED";
/// Proctoring kill switch variable.
pub const ENV_PROCTORING_ENABLED: &str = "EXAM_GUARD_PROCTORING_ENABLED";
/// User-agent override variable.
pub const ENV_USER_AGENT: &str = "EXAM_GUARD_USER_AGENT";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Default self-reported identity.
pub fn default_user_agent() -> String {
    format!("exam-guard/{APP_VERSION}")
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Validated HTTPS API base.
    pub api_base: Url,
    /// Whether desktop lockdown may engage.
    pub lockdown_enabled: bool,
    /// Whether the camera/microphone preview may run.
    pub proctoring_enabled: bool,
    /// Identity sent as `User-Agent` and used by the gate.
    pub user_agent: String,
}

impl AppConfig {
    /// Loads configuration from process environment.
    ///
    /// # Errors
    /// See [`AppConfig::from_lookup`].
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] when the API base is missing or not
    /// HTTPS.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let raw_base = lookup(ENV_API_BASE)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::Config(format!("{ENV_API_BASE} is not set")))?;
        let api_base = validate_base_url(raw_base.trim())
            .map_err(|error| AppError::Config(format!("{ENV_API_BASE}: {error}")))?;

        Ok(Self {
            api_base,
            lockdown_enabled: flag_enabled(lookup(ENV_LOCKDOWN_ENABLED).as_deref()),
            proctoring_enabled: flag_enabled(lookup(ENV_PROCTORING_ENABLED).as_deref()),
            user_agent: lookup(ENV_USER_AGENT)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(default_user_agent),
        })
    }
}

/// Kill-switch semantics.
///
/// - Unset => enabled.
/// - `0`, `false`, `off` (case-insensitive) => disabled.
/// - Any other value => enabled.
pub fn flag_enabled(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        None => true,
    }
}

/// Redacts common secret markers in log-safe output.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in ["bearer", "password", "token", "authorization"] {
        redacted = redact_key_value(&redacted, key);
    }
    redacted
}

fn redact_key_value(input: &str, key: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(offset) = lower[cursor..].find(key) {
        let key_end = cursor + offset + key.len();
        let rest = &input[key_end..];
        let separator = rest.len() - rest.trim_start_matches([' ', '=', ':']).len();
        output.push_str(&input[cursor..key_end]);
        if separator == 0 {
            cursor = key_end;
            continue;
        }

        let value_start = key_end + separator;
        let value_len = input[value_start..]
            .find(|c: char| c.is_whitespace() || matches!(c, '&' | ',' | ';'))
            .unwrap_or(input.len() - value_start);
        output.push_str("=<redacted>");
        cursor = value_start + value_len;
    }

    output.push_str(&input[cursor..]);
    output
}

/// Renders `url` with the value of any `token` query parameter replaced.
pub fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key.eq_ignore_ascii_case("token") {
                "REDACTED".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Collaborators for one exam screen.
pub struct ScreenDeps {
    /// Exam API client; serves load, gate and submit.
    pub api: Arc<ExamApiClient>,
    /// Host lifecycle signals.
    pub lifecycle: Arc<dyn LifecycleSource>,
    /// Wall clock for attempt start and anomaly timestamps.
    pub clock: Arc<dyn Clock>,
    /// Desktop bridge, absent on browser/mobile hosts.
    pub bridge: Option<DesktopBridge>,
    /// Camera/microphone access, absent when the host has none.
    pub media: Option<Arc<dyn MediaDevices>>,
    /// Called when camera/microphone access is denied or fails.
    pub on_media_denied: Option<MediaDeniedHandler>,
}

/// Host callback for camera/microphone denial.
pub type MediaDeniedHandler = Box<dyn FnMut(&MediaError) + Send>;

/// One exam screen from load to teardown.
pub struct ExamScreen {
    token: String,
    lockdown_enabled: bool,
    proctoring_enabled: bool,
    gate: SebGate,
    session: AttemptSession,
    lifecycle: Arc<dyn LifecycleSource>,
    clock: Arc<dyn Clock>,
    bridge: Option<DesktopBridge>,
    media_devices: Option<Arc<dyn MediaDevices>>,
    on_media_denied: Option<MediaDeniedHandler>,
    media: Option<ProctoringMediaSession>,
    ui: ExamUiState,
    torn_down: bool,
}

impl ExamScreen {
    /// Loads the exam and evaluates the gate.
    ///
    /// # Errors
    /// Returns [`AppError::Session`] when exam data cannot be loaded; the
    /// host renders the empty state.
    pub fn open(
        config: &AppConfig,
        deps: ScreenDeps,
        exam_id: &str,
        token: &str,
    ) -> Result<Self, AppError> {
        let session = AttemptSession::load(deps.api.as_ref(), deps.api.clone(), exam_id, token)?;
        let gate = SebGate::new(
            deps.api.clone(),
            ClientIdentity::from_user_agent(config.user_agent.clone()),
        );

        let mut ui = ExamUiState::new(APP_VERSION);
        ui.exam_loaded = true;
        ui.gate = Some(gate.decision(session.exam()));
        ui.set_time_left(session.attempt().time_left_seconds);
        if !config.lockdown_enabled {
            ui.lockdown = StageStatus::Disabled;
        }
        if !config.proctoring_enabled {
            ui.proctoring = StageStatus::Disabled;
        }
        ui.proctoring_required = config.proctoring_enabled
            && deps.media.is_some()
            && session.exam().proctoring_enabled;

        tracing::info!(
            stage = "app",
            action = "open",
            exam_id,
            gate = ?ui.gate,
            "exam screen opened"
        );

        Ok(Self {
            token: token.to_string(),
            lockdown_enabled: config.lockdown_enabled,
            proctoring_enabled: config.proctoring_enabled,
            gate,
            session,
            lifecycle: deps.lifecycle,
            clock: deps.clock,
            bridge: deps.bridge,
            media_devices: deps.media,
            on_media_denied: deps.on_media_denied,
            media: None,
            ui,
            torn_down: false,
        })
    }

    /// Current gate decision.
    pub fn gate_decision(&self) -> GateDecision {
        self.gate.decision(self.session.exam())
    }

    /// Downloads the controlled-browser configuration for `platform`.
    ///
    /// # Errors
    /// Returns [`AppError::Gate`] when the download fails.
    pub fn download_config(&mut self, platform: ConfigPlatform) -> Result<ConfigArtifact, AppError> {
        let exam_id = self.session.exam().id.clone();
        match self.gate.download_config(&exam_id, platform, &self.token) {
            Ok(artifact) => Ok(artifact.clone()),
            Err(error) => {
                self.ui
                    .push_banner(Banner::new(error.category(), &error.to_string()));
                Err(error.into())
            }
        }
    }

    /// Requests the camera/microphone preview before the attempt starts.
    ///
    /// Returns `None` when proctoring does not apply to this screen or the
    /// attempt is no longer `NotStarted`. Repeated calls while a request is
    /// pending or live issue no new device request.
    pub fn prepare_proctoring(&mut self) -> Option<StartOutcome> {
        if self.torn_down || self.session.status() != AttemptStatus::NotStarted {
            return None;
        }
        let devices = self.media_devices.clone()?;
        if !self.proctoring_enabled || !self.session.exam().proctoring_enabled {
            return None;
        }
        let on_media_denied = &mut self.on_media_denied;
        let media = self.media.get_or_insert_with(|| {
            let session = ProctoringMediaSession::new(devices);
            match on_media_denied.take() {
                Some(handler) => session.on_permission_denied(handler),
                None => session,
            }
        });
        let outcome = media.start();
        if outcome == StartOutcome::Failed {
            self.ui.proctoring = StageStatus::Degraded;
            self.ui.push_banner(Banner::new(
                ErrorCategory::PermissionDenied,
                "camera and microphone are unavailable",
            ));
        }
        Some(outcome)
    }

    /// Lets the host decide whether a live preview is needed to start.
    pub fn set_proctoring_required(&mut self, required: bool) {
        self.ui.proctoring_required = required;
    }

    /// Requests the attempt and, once issued, engages monitoring and
    /// lockdown.
    ///
    /// When the preview is required but not live, the media request is
    /// issued (if idle) and the start is refused.
    ///
    /// # Errors
    /// - [`AppError::StartRefused`] once the attempt has started or the screen
    ///   is torn down, and while a required preview is not live.
    /// - [`AppError::Gate`] when the gate or the server refuses the start.
    /// - [`AppError::Monitor`] when lifecycle signals are unavailable; the
    ///   server is not contacted in that case.
    pub fn start(&mut self) -> Result<(), AppError> {
        if self.torn_down || self.session.status() != AttemptStatus::NotStarted {
            return Err(AppError::StartRefused("the attempt has already started"));
        }
        if self.ui.proctoring_required && self.ui.proctoring != StageStatus::Running {
            self.prepare_proctoring();
            return Err(AppError::StartRefused(
                "the camera and microphone preview is not live",
            ));
        }

        let mut monitor = AnomalyMonitor::disarmed(Arc::clone(&self.clock));
        monitor.attach(self.lifecycle.as_ref())?;

        let started = match self.gate.start_attempt(self.session.exam(), &self.token) {
            Ok(started) => started,
            Err(error) => {
                self.ui.gate = Some(self.gate.decision(self.session.exam()));
                self.ui
                    .push_banner(Banner::new(error.category(), &error.to_string()));
                return Err(error.into());
            }
        };

        if let Some(minutes) = started.duration_minutes {
            self.session.override_duration_minutes(minutes);
        }
        self.session.begin(started.id, self.clock.now_ms(), monitor);
        self.ui.set_time_left(self.session.attempt().time_left_seconds);

        self.engage_lockdown();
        Ok(())
    }

    fn engage_lockdown(&mut self) {
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        if !self.lockdown_enabled || !self.session.exam().seb_enabled {
            return;
        }
        let report = bridge.enable_seb_mode(SebModeOptions::default());
        if report.failed > 0 || report.window_flags_failed > 0 {
            self.ui.lockdown = StageStatus::Degraded;
            self.ui.push_banner(Banner::new(
                ErrorCategory::PermissionDenied,
                "some lockdown restrictions could not be applied",
            ));
        } else {
            self.ui.lockdown = StageStatus::Running;
        }
    }

    /// Delivers the host's answer to a media acquisition.
    pub fn complete_media(
        &mut self,
        ticket: AcquisitionTicket,
        result: Result<Box<dyn MediaStream>, MediaError>,
    ) -> CompleteOutcome {
        let Some(media) = self.media.as_mut() else {
            if let Ok(mut stream) = result {
                stream.stop_all();
            }
            return CompleteOutcome::Stale;
        };
        let outcome = media.complete(ticket, result);
        match outcome {
            CompleteOutcome::Live => self.ui.proctoring = StageStatus::Running,
            CompleteOutcome::Denied | CompleteOutcome::Failed => {
                self.ui.proctoring = StageStatus::Degraded;
                self.ui.push_banner(Banner::new(
                    ErrorCategory::PermissionDenied,
                    "camera and microphone access was not granted",
                ));
            }
            CompleteOutcome::Stale => {}
        }
        outcome
    }

    /// Handles a media track ending on its own.
    pub fn on_track_ended(&mut self, kind: TrackKind) -> bool {
        let Some(anomaly) = self
            .media
            .as_mut()
            .and_then(|media| media.on_track_ended(kind))
        else {
            return false;
        };
        self.ui.proctoring = StageStatus::Degraded;
        self.session.record_anomaly(anomaly)
    }

    /// Handles a fired platform shortcut. Returns whether it was ours.
    pub fn on_shortcut_fired(&mut self, id: ShortcutId) -> bool {
        let Some(combo) = self
            .bridge
            .as_ref()
            .and_then(|bridge| bridge.on_shortcut_fired(id))
        else {
            return false;
        };
        if CAPTURE_SHORTCUTS.contains(&combo) {
            self.session.record_anomaly(AnomalyKind::CaptureShortcutPressed);
        }
        true
    }

    /// Records that desktop lockdown was lost while the attempt was open.
    pub fn on_lockdown_lost(&mut self) -> bool {
        self.ui.lockdown = StageStatus::Degraded;
        self.session.record_anomaly(AnomalyKind::LockdownLost)
    }

    /// Records an answer.
    pub fn select_answer(&mut self, question_id: &str, value: AnswerValue) -> bool {
        self.session.select_answer(question_id, value)
    }

    /// Advances the countdown; expiry submits and tears down.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.session.tick();
        self.ui.set_time_left(self.session.attempt().time_left_seconds);
        if let TickOutcome::Expired(submit) = &outcome {
            self.finish(submit);
        }
        outcome
    }

    /// User-confirmed submission.
    pub fn submit(&mut self) -> SubmitOutcome {
        let outcome = self.session.submit(SubmitTrigger::User);
        self.finish(&outcome);
        outcome
    }

    /// Proctor quit: verifies the password, then releases everything without
    /// submitting.
    ///
    /// # Errors
    /// Returns [`AppError::Bridge`] when no bridge is present or the password
    /// is rejected; lockdown stays engaged.
    pub fn quit_with_password(&mut self, password: &str) -> Result<QuitDirective, AppError> {
        let bridge = self
            .bridge
            .as_mut()
            .ok_or(AppError::Bridge(BridgeError::PasswordQuitDisabled))?;
        let directive = bridge.quit_with_password(password)?;
        self.teardown();
        Ok(directive)
    }

    fn finish(&mut self, outcome: &SubmitOutcome) {
        match outcome {
            SubmitOutcome::Submitted(result) => {
                self.ui.result = Some(ResultView::new(
                    result,
                    self.session.exam().pass_percentage,
                    self.session.anomaly_count(),
                ));
            }
            SubmitOutcome::Failed(category) => {
                let detail = self
                    .session
                    .submit_failure()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.ui.push_banner(Banner::new(*category, &detail));
            }
            SubmitOutcome::Ignored(_) => return,
        }
        if let Some(snapshot) = self.session.anomaly_snapshot() {
            self.ui.apply_anomalies(&snapshot.events);
        }
        self.teardown();
    }

    /// Releases the monitor subscription, media stream and lockdown.
    ///
    /// Runs at most once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.session.detach_monitor();
        if let Some(media) = self.media.as_mut() {
            media.stop();
        }
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.release();
        }
        if self.ui.lockdown != StageStatus::Disabled {
            self.ui.lockdown = StageStatus::Idle;
        }
        if self.ui.proctoring != StageStatus::Disabled {
            self.ui.proctoring = StageStatus::Idle;
        }
        tracing::info!(
            stage = "app",
            action = "teardown",
            status = ?self.session.status(),
            "exam screen released"
        );
    }

    /// Whether teardown has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Attempt session.
    pub fn session(&self) -> &AttemptSession {
        &self.session
    }

    /// Desktop bridge, when present.
    pub fn bridge(&self) -> Option<&DesktopBridge> {
        self.bridge.as_ref()
    }

    /// Media session, once the preview has been requested.
    pub fn media(&self) -> Option<&ProctoringMediaSession> {
        self.media.as_ref()
    }

    /// Display state.
    pub fn ui(&self) -> &ExamUiState {
        &self.ui
    }
}

impl Drop for ExamScreen {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
    /// API error outside the session and gate paths.
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    /// Gate refused or failed.
    #[error("gate error: {0}")]
    Gate(#[from] GateError),
    /// Exam load failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    /// Lifecycle signals unavailable.
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    /// Desktop bridge refused the request.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),
    /// Start is not possible in the current screen state.
    #[error("start refused: {0}")]
    StartRefused(&'static str),
}

impl AppError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::StartRefused(_) => ErrorCategory::PreconditionFailed,
            Self::Api(error) => error.category(),
            Self::Gate(error) => error.category(),
            Self::Session(error) => error.category(),
            Self::Monitor(error) => error.category(),
            Self::Bridge(error) => error.category(),
        }
    }
}
