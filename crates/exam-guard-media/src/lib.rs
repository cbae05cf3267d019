#![warn(missing_docs)]
//! # exam-guard-media
//!
//! ## Purpose
//! Local camera/microphone preview kept alive for the duration of a proctored
//! attempt.
//!
//! ## Responsibilities
//! - Allow a single outstanding device acquisition.
//! - Record granted capabilities and permission denial.
//! - Release every track exactly once, on every exit path.
//!
//! ## Data flow
//! [`ProctoringMediaSession::start`] -> [`MediaDevices::request`] (async on
//! the host) -> host calls [`ProctoringMediaSession::complete`] with the
//! ticket -> live [`MediaStream`] -> [`ProctoringMediaSession::stop`] or drop.
//!
//! ## Ownership and lifetimes
//! The session exclusively owns the live stream. A grant arriving for a
//! ticket that is no longer pending is released on arrival.
//!
//! ## Error model
//! [`MediaError`] values are delivered to the caller-supplied denial handler
//! and reflected in [`MediaStatus`]; they never tear down the attempt.
//!
//! ## Security and privacy notes
//! Stream handles are never logged.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use exam_guard_core::{AnomalyKind, ErrorCategory};
use thiserror::Error;

/// Track kinds of a preview stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Video input.
    Camera,
    /// Audio input.
    Microphone,
}

impl TrackKind {
    /// Anomaly recorded when this track ends unexpectedly.
    pub fn anomaly_kind(self) -> AnomalyKind {
        match self {
            Self::Camera => AnomalyKind::CameraLost,
            Self::Microphone => AnomalyKind::MicrophoneLost,
        }
    }
}

/// Requested capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Request video.
    pub video: bool,
    /// Request audio.
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Identifies one acquisition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AcquisitionTicket(pub u64);

/// Granted device stream.
pub trait MediaStream: Send {
    /// Whether the stream carries a live track of `kind`.
    fn has_track(&self, kind: TrackKind) -> bool;
    /// Stops every track.
    fn stop_all(&mut self);
}

/// Host device access.
pub trait MediaDevices: Send + Sync {
    /// Begins acquisition; the host answers later through
    /// [`ProctoringMediaSession::complete`].
    ///
    /// # Errors
    /// Returns [`MediaError`] when the request cannot even be issued.
    fn request(
        &self,
        ticket: AcquisitionTicket,
        constraints: MediaConstraints,
    ) -> Result<(), MediaError>;
}

/// Result of [`ProctoringMediaSession::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A device request was issued.
    Requested(AcquisitionTicket),
    /// A request is already outstanding; nothing issued.
    AlreadyPending(AcquisitionTicket),
    /// The preview is already live; nothing issued.
    AlreadyLive,
    /// The request could not be issued.
    Failed,
}

/// Result of [`ProctoringMediaSession::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// Stream stored.
    Live,
    /// User or platform refused access.
    Denied,
    /// Acquisition failed for another reason.
    Failed,
    /// Ticket no longer pending; any granted stream was released.
    Stale,
}

/// Preview presentation; has no effect on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presentation {
    /// Full preview.
    #[default]
    Expanded,
    /// Collapsed preview.
    Minimized,
}

/// Observable media state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaStatus {
    /// Live camera track present.
    pub has_camera: bool,
    /// Live microphone track present.
    pub has_mic: bool,
    /// Last acquisition was refused.
    pub permission_denied: bool,
    /// An acquisition is outstanding.
    pub pending: bool,
}

enum Acquisition {
    Idle,
    Pending(AcquisitionTicket),
    Live(Box<dyn MediaStream>),
}

type DenialHandler = Box<dyn FnMut(&MediaError) + Send>;

/// Camera/microphone preview session.
pub struct ProctoringMediaSession {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    acquisition: Acquisition,
    next_ticket: u64,
    status: MediaStatus,
    presentation: Presentation,
    on_denied: Option<DenialHandler>,
}

impl ProctoringMediaSession {
    /// Creates an idle session requesting camera and microphone.
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            constraints: MediaConstraints::default(),
            acquisition: Acquisition::Idle,
            next_ticket: 1,
            status: MediaStatus::default(),
            presentation: Presentation::default(),
            on_denied: None,
        }
    }

    /// Overrides the requested capabilities.
    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Installs the handler invoked when acquisition is refused or fails.
    pub fn on_permission_denied(mut self, handler: impl FnMut(&MediaError) + Send + 'static) -> Self {
        self.on_denied = Some(Box::new(handler));
        self
    }

    /// Requests the devices unless a request is pending or a stream is live.
    pub fn start(&mut self) -> StartOutcome {
        match &self.acquisition {
            Acquisition::Pending(ticket) => return StartOutcome::AlreadyPending(*ticket),
            Acquisition::Live(_) => return StartOutcome::AlreadyLive,
            Acquisition::Idle => {}
        }

        let ticket = AcquisitionTicket(self.next_ticket);
        self.next_ticket += 1;
        match self.devices.request(ticket, self.constraints) {
            Ok(()) => {
                self.acquisition = Acquisition::Pending(ticket);
                self.status.pending = true;
                tracing::debug!(stage = "media", ticket = ticket.0, "device request issued");
                StartOutcome::Requested(ticket)
            }
            Err(error) => {
                self.fail(&error);
                StartOutcome::Failed
            }
        }
    }

    /// Delivers the host's answer for `ticket`.
    pub fn complete(
        &mut self,
        ticket: AcquisitionTicket,
        result: Result<Box<dyn MediaStream>, MediaError>,
    ) -> CompleteOutcome {
        if !matches!(self.acquisition, Acquisition::Pending(pending) if pending == ticket) {
            if let Ok(mut stream) = result {
                stream.stop_all();
                tracing::debug!(stage = "media", ticket = ticket.0, "stale grant released");
            }
            return CompleteOutcome::Stale;
        }

        self.status.pending = false;
        match result {
            Ok(stream) => {
                self.status.has_camera = stream.has_track(TrackKind::Camera);
                self.status.has_mic = stream.has_track(TrackKind::Microphone);
                self.status.permission_denied = false;
                self.acquisition = Acquisition::Live(stream);
                tracing::info!(
                    stage = "media",
                    action = "start",
                    has_camera = self.status.has_camera,
                    has_mic = self.status.has_mic,
                    "proctoring preview live"
                );
                CompleteOutcome::Live
            }
            Err(error) => {
                self.acquisition = Acquisition::Idle;
                let denied = matches!(error, MediaError::PermissionDenied);
                self.fail(&error);
                if denied {
                    CompleteOutcome::Denied
                } else {
                    CompleteOutcome::Failed
                }
            }
        }
    }

    /// Releases the live stream. Returns `true` when tracks were stopped.
    ///
    /// A pending request is abandoned; its grant will be released as stale.
    pub fn stop(&mut self) -> bool {
        let released = match std::mem::replace(&mut self.acquisition, Acquisition::Idle) {
            Acquisition::Live(mut stream) => {
                stream.stop_all();
                true
            }
            Acquisition::Pending(_) | Acquisition::Idle => false,
        };
        self.status.pending = false;
        self.status.has_camera = false;
        self.status.has_mic = false;
        if released {
            tracing::info!(stage = "media", action = "stop", "proctoring preview released");
        }
        released
    }

    /// Handles a track ending without a stop request.
    ///
    /// Returns the anomaly to record when the track was live.
    pub fn on_track_ended(&mut self, kind: TrackKind) -> Option<AnomalyKind> {
        if !matches!(self.acquisition, Acquisition::Live(_)) {
            return None;
        }
        let flag = match kind {
            TrackKind::Camera => &mut self.status.has_camera,
            TrackKind::Microphone => &mut self.status.has_mic,
        };
        if !*flag {
            return None;
        }
        *flag = false;
        tracing::warn!(stage = "media", ?kind, "track ended unexpectedly");
        Some(kind.anomaly_kind())
    }

    /// Flips between expanded and minimized.
    pub fn toggle_presentation(&mut self) -> Presentation {
        self.presentation = match self.presentation {
            Presentation::Expanded => Presentation::Minimized,
            Presentation::Minimized => Presentation::Expanded,
        };
        self.presentation
    }

    /// Current presentation.
    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    /// Current status.
    pub fn status(&self) -> MediaStatus {
        self.status
    }

    /// Whether a stream is live.
    pub fn is_live(&self) -> bool {
        matches!(self.acquisition, Acquisition::Live(_))
    }

    fn fail(&mut self, error: &MediaError) {
        self.status.pending = false;
        if matches!(error, MediaError::PermissionDenied) {
            self.status.permission_denied = true;
        }
        tracing::warn!(stage = "media", %error, "proctoring preview unavailable");
        if let Some(handler) = self.on_denied.as_mut() {
            handler(error);
        }
    }
}

impl Drop for ProctoringMediaSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Media errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Access was refused.
    #[error("camera/microphone permission denied")]
    PermissionDenied,
    /// No matching input device.
    #[error("no camera or microphone available")]
    NoDevice,
    /// Host backend failure.
    #[error("media backend failure: {0}")]
    Backend(String),
}

impl MediaError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PermissionDenied | Self::Backend(_) => ErrorCategory::PermissionDenied,
            Self::NoDevice => ErrorCategory::PreconditionFailed,
        }
    }
}

/// Release counters shared by a synthetic stream and its test.
#[derive(Debug, Default)]
pub struct StreamProbe {
    stop_calls: AtomicU32,
    tracks_stopped: AtomicU32,
}

impl StreamProbe {
    /// Calls to `stop_all`.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Tracks moved from live to stopped.
    pub fn tracks_stopped(&self) -> u32 {
        self.tracks_stopped.load(Ordering::SeqCst)
    }
}

/// In-memory stream.
#[derive(Debug)]
pub struct SyntheticStream {
    camera: bool,
    mic: bool,
    probe: Arc<StreamProbe>,
}

impl SyntheticStream {
    /// Creates a stream with the given live tracks and its probe.
    pub fn new(camera: bool, mic: bool) -> (Box<dyn MediaStream>, Arc<StreamProbe>) {
        let probe = Arc::new(StreamProbe::default());
        let stream = Self {
            camera,
            mic,
            probe: Arc::clone(&probe),
        };
        (Box::new(stream), probe)
    }
}

impl MediaStream for SyntheticStream {
    fn has_track(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Camera => self.camera,
            TrackKind::Microphone => self.mic,
        }
    }

    fn stop_all(&mut self) {
        self.probe.stop_calls.fetch_add(1, Ordering::SeqCst);
        let live = u32::from(self.camera) + u32::from(self.mic);
        self.probe.tracks_stopped.fetch_add(live, Ordering::SeqCst);
        self.camera = false;
        self.mic = false;
    }
}

/// Device backend that records requests and never answers on its own.
#[derive(Debug, Default)]
pub struct SyntheticMediaDevices {
    requests: Mutex<Vec<AcquisitionTicket>>,
    refuse_with: Option<MediaError>,
}

impl SyntheticMediaDevices {
    /// Creates a backend accepting every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose `request` fails synchronously.
    pub fn refusing(error: MediaError) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            refuse_with: Some(error),
        }
    }

    /// Tickets requested so far.
    pub fn requests(&self) -> Vec<AcquisitionTicket> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MediaDevices for SyntheticMediaDevices {
    fn request(
        &self,
        ticket: AcquisitionTicket,
        _constraints: MediaConstraints,
    ) -> Result<(), MediaError> {
        if let Some(error) = &self.refuse_with {
            return Err(error.clone());
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ticket);
        Ok(())
    }
}
