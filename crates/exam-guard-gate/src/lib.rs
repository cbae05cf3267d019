#![warn(missing_docs)]
//! # exam-guard-gate
//!
//! ## Purpose
//! Decides whether this client may start a locked exam before the server is
//! contacted.
//!
//! ## Responsibilities
//! - Derive [`GateDecision`] from the exam's controlled-browser flag and the
//!   client identity.
//! - Fetch and cache the platform-specific configuration artifact.
//! - Issue the start request only when the local decision is
//!   [`GateDecision::Allowed`], translating a server `SEB_REQUIRED` rejection
//!   into [`GateDecision::Blocked`].
//!
//! ## Data flow
//! Exam metadata + [`ClientIdentity`] -> [`evaluate_gate`] -> UI guidance, or
//! [`SebGate::download_config`] -> artifact, or [`SebGate::start_attempt`] ->
//! server attempt.
//!
//! ## Error model
//! [`GateError::NotAllowed`] carries the decision that refused a start;
//! transport and server failures pass through as [`GateError::Api`].
//!
//! ## Security and privacy notes
//! The identity marker is self-reported and spoofable. It only saves a round
//! trip; the server's `SEB_REQUIRED` check is authoritative.
//!
//! ## Example
//! ```rust
//! use exam_guard_gate::{GateDecision, evaluate_gate};
//!
//! assert_eq!(evaluate_gate(true, false), GateDecision::MustDownloadConfig);
//! assert_eq!(evaluate_gate(false, false), GateDecision::Allowed);
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use exam_guard_api::{ApiError, ExamApiClient, StartedAttempt};
use exam_guard_core::{ErrorCategory, ExamDefinition};
use thiserror::Error;

/// Substring identifying the controlled browser in a user-agent string.
pub const CONTROLLED_BROWSER_MARKER: &str = "SEB";

/// Self-reported identity of the running client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    user_agent: String,
    controlled: bool,
}

impl ClientIdentity {
    /// Inspects a user-agent string for [`CONTROLLED_BROWSER_MARKER`].
    pub fn from_user_agent(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let controlled = user_agent.contains(CONTROLLED_BROWSER_MARKER);
        Self {
            user_agent,
            controlled,
        }
    }

    /// Raw identity string.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Whether the marker is present.
    pub fn is_controlled_browser(&self) -> bool {
        self.controlled
    }
}

/// Why a start is refused even though local checks passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The server answered `SEB_REQUIRED`; carries its guidance text.
    ServerRequiresControlledBrowser(String),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerRequiresControlledBrowser(message) if message.is_empty() => {
                f.write_str("the server requires the controlled browser")
            }
            Self::ServerRequiresControlledBrowser(message) => f.write_str(message),
        }
    }
}

/// Outcome of the gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Start may be requested.
    Allowed,
    /// The client must obtain the configuration artifact and relaunch inside
    /// the controlled browser.
    MustDownloadConfig,
    /// Start is refused.
    Blocked(BlockReason),
}

impl GateDecision {
    /// Whether a start request may be issued.
    pub fn permits_start(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Pure decision table.
pub fn evaluate_gate(exam_requires_seb: bool, in_controlled_browser: bool) -> GateDecision {
    if !exam_requires_seb || in_controlled_browser {
        GateDecision::Allowed
    } else {
        GateDecision::MustDownloadConfig
    }
}

/// Target platform of the configuration artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigPlatform {
    /// macOS build.
    Mac,
    /// Windows build.
    Windows,
}

impl ConfigPlatform {
    /// Platform of the running binary; non-macOS hosts get the Windows
    /// artifact.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Mac
        } else {
            Self::Windows
        }
    }

    /// Query-string value.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Mac => "mac",
            Self::Windows => "win",
        }
    }
}

impl fmt::Display for ConfigPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for ConfigPlatform {
    type Err = GateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mac" | "macos" => Ok(Self::Mac),
            "win" | "windows" => Ok(Self::Windows),
            other => Err(GateError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Downloaded configuration artifact. Contents are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    /// Exam the artifact unlocks.
    pub exam_id: String,
    /// Target platform.
    pub platform: ConfigPlatform,
    /// Raw bytes as served.
    pub bytes: Vec<u8>,
}

impl ConfigArtifact {
    /// Suggested file name for presenting the download.
    pub fn file_name(&self) -> String {
        format!("exam-{}-{}.seb", self.exam_id, self.platform)
    }
}

/// Server operations the gate needs.
pub trait GateApi: Send + Sync {
    /// Fetches the configuration artifact.
    fn download_seb_config(
        &self,
        exam_id: &str,
        platform: ConfigPlatform,
        token: &str,
    ) -> Result<Vec<u8>, ApiError>;

    /// Requests a new attempt.
    fn start_attempt(&self, exam_id: &str, token: &str) -> Result<StartedAttempt, ApiError>;
}

impl GateApi for ExamApiClient {
    fn download_seb_config(
        &self,
        exam_id: &str,
        platform: ConfigPlatform,
        token: &str,
    ) -> Result<Vec<u8>, ApiError> {
        ExamApiClient::download_seb_config(self, exam_id, platform.as_wire(), token)
    }

    fn start_attempt(&self, exam_id: &str, token: &str) -> Result<StartedAttempt, ApiError> {
        ExamApiClient::start_attempt(self, exam_id, token)
    }
}

/// Gate with artifact cache and server rejection memory.
pub struct SebGate {
    api: Arc<dyn GateApi>,
    identity: ClientIdentity,
    configs: HashMap<(String, ConfigPlatform), ConfigArtifact>,
    server_blocks: HashMap<String, BlockReason>,
}

impl SebGate {
    /// Creates a gate for the given client identity.
    pub fn new(api: Arc<dyn GateApi>, identity: ClientIdentity) -> Self {
        Self {
            api,
            identity,
            configs: HashMap::new(),
            server_blocks: HashMap::new(),
        }
    }

    /// Client identity used for decisions.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Current decision for `exam`.
    ///
    /// A prior server rejection for the same exam wins over the local table.
    pub fn decision(&self, exam: &ExamDefinition) -> GateDecision {
        if let Some(reason) = self.server_blocks.get(&exam.id) {
            return GateDecision::Blocked(reason.clone());
        }
        evaluate_gate(exam.seb_enabled, self.identity.is_controlled_browser())
    }

    /// Returns the configuration artifact, downloading it at most once per
    /// exam and platform. Never starts an attempt.
    ///
    /// # Errors
    /// Returns [`GateError::Api`] when the download fails; nothing is cached
    /// in that case.
    pub fn download_config(
        &mut self,
        exam_id: &str,
        platform: ConfigPlatform,
        token: &str,
    ) -> Result<&ConfigArtifact, GateError> {
        match self.configs.entry((exam_id.to_string(), platform)) {
            Entry::Occupied(cached) => Ok(cached.into_mut()),
            Entry::Vacant(slot) => {
                let bytes = self.api.download_seb_config(exam_id, platform, token)?;
                tracing::info!(
                    stage = "gate",
                    action = "download_config",
                    exam_id,
                    %platform,
                    bytes = bytes.len(),
                    "controlled-browser config downloaded"
                );
                Ok(slot.insert(ConfigArtifact {
                    exam_id: exam_id.to_string(),
                    platform,
                    bytes,
                }))
            }
        }
    }

    /// Requests an attempt when the decision permits it.
    ///
    /// # Errors
    /// - [`GateError::NotAllowed`] without contacting the server when the
    ///   decision is not `Allowed`.
    /// - [`GateError::NotAllowed`] with [`GateDecision::Blocked`] when the
    ///   server answers `SEB_REQUIRED`; the rejection is remembered.
    /// - [`GateError::Api`] for other failures.
    pub fn start_attempt(
        &mut self,
        exam: &ExamDefinition,
        token: &str,
    ) -> Result<StartedAttempt, GateError> {
        let decision = self.decision(exam);
        if !decision.permits_start() {
            tracing::info!(stage = "gate", exam_id = %exam.id, ?decision, "start refused locally");
            return Err(GateError::NotAllowed(decision));
        }

        match self.api.start_attempt(&exam.id, token) {
            Ok(started) => Ok(started),
            Err(ApiError::SebRequired { message }) => {
                tracing::warn!(
                    stage = "gate",
                    exam_id = %exam.id,
                    "server requires the controlled browser"
                );
                let reason = BlockReason::ServerRequiresControlledBrowser(message);
                self.server_blocks.insert(exam.id.clone(), reason.clone());
                Err(GateError::NotAllowed(GateDecision::Blocked(reason)))
            }
            Err(error) => Err(GateError::Api(error)),
        }
    }
}

/// Gate failures.
#[derive(Debug, Error)]
pub enum GateError {
    /// Start refused by the decision carried.
    #[error("exam start not allowed: {0:?}")]
    NotAllowed(GateDecision),
    /// Platform string not recognised.
    #[error("unknown config platform: {0}")]
    UnknownPlatform(String),
    /// Server call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl GateError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAllowed(_) | Self::UnknownPlatform(_) => ErrorCategory::PreconditionFailed,
            Self::Api(error) => error.category(),
        }
    }
}
