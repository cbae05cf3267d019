#![warn(missing_docs)]
//! # exam-guard-monitor
//!
//! ## Purpose
//! Converts environment-lifecycle signals observed during one attempt into
//! timestamped, severity-tagged [`AnomalyEvent`] records.
//!
//! ## Responsibilities
//! - Map mobile app-state and web visibility changes onto
//!   [`LifecycleTransition`] values.
//! - Subscribe to a [`LifecycleSource`] with an explicit [`Subscription`]
//!   that unsubscribes exactly once.
//! - Drop transitions until the attempt is in progress
//!   ([`AnomalyMonitor::arm`]).
//! - Latch at submission ([`AnomalyMonitor::seal`]) so later transitions are
//!   dropped instead of counted.
//!
//! ## Data flow
//! Platform callback -> [`LifecycleSource`] listener ->
//! [`AnomalyMonitor::observe`] -> append-only event log -> sealed
//! [`AnomalySnapshot`] -> submission payload.
//!
//! ## Ownership and lifetimes
//! The event log is shared between the monitor and its listener closures
//! behind an `Arc<Mutex<_>>`. Subscriptions are owned by the monitor and
//! released when it seals, detaches or drops.
//!
//! ## Error model
//! Only subscribing can fail ([`MonitorError`]). Observing never fails and
//! never blocks the attempt.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use exam_guard_core::{AnomalyEvent, AnomalyKind, ErrorCategory};
use thiserror::Error;

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    /// Epoch milliseconds.
    fn now_ms(&self) -> u64;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Mobile application state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// In the foreground and receiving input.
    Active,
    /// Transitioning, e.g. the app switcher is shown.
    Inactive,
    /// Not visible.
    Background,
}

/// Environment change relevant to proctoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    /// App left the foreground.
    Backgrounded,
    /// App returned to the foreground.
    Foregrounded,
    /// Browser window lost focus.
    WindowBlurred,
    /// Browser window regained focus.
    WindowFocused,
    /// Document became hidden.
    TabHidden,
    /// Document became visible.
    TabVisible,
    /// Camera track ended without a stop request.
    CameraEnded,
    /// Microphone track ended without a stop request.
    MicrophoneEnded,
    /// Desktop lockdown dropped while the attempt was open.
    LockdownLost,
    /// A blocked capture shortcut was pressed.
    CaptureShortcutPressed,
}

impl LifecycleTransition {
    /// Anomaly recorded for this transition, if it qualifies.
    pub fn anomaly_kind(self) -> Option<AnomalyKind> {
        match self {
            Self::Backgrounded => Some(AnomalyKind::Backgrounded),
            Self::WindowBlurred => Some(AnomalyKind::WindowBlurred),
            Self::TabHidden => Some(AnomalyKind::TabHidden),
            Self::CameraEnded => Some(AnomalyKind::CameraLost),
            Self::MicrophoneEnded => Some(AnomalyKind::MicrophoneLost),
            Self::LockdownLost => Some(AnomalyKind::LockdownLost),
            Self::CaptureShortcutPressed => Some(AnomalyKind::CaptureShortcutPressed),
            Self::Foregrounded | Self::WindowFocused | Self::TabVisible => None,
        }
    }
}

/// Maps an app-state change onto a transition.
///
/// Only leaving `Active` counts as backgrounding; `Inactive -> Background`
/// is the same departure and yields `None`.
pub fn transition_for_app_state(previous: AppState, next: AppState) -> Option<LifecycleTransition> {
    match (previous, next) {
        (AppState::Active, AppState::Inactive | AppState::Background) => {
            Some(LifecycleTransition::Backgrounded)
        }
        (AppState::Inactive | AppState::Background, AppState::Active) => {
            Some(LifecycleTransition::Foregrounded)
        }
        _ => None,
    }
}

/// Maps a `visibilitychange` reading onto a transition.
pub fn transition_for_visibility(hidden: bool) -> LifecycleTransition {
    if hidden {
        LifecycleTransition::TabHidden
    } else {
        LifecycleTransition::TabVisible
    }
}

/// Listener invoked for each emitted transition.
pub type LifecycleListener = Arc<dyn Fn(LifecycleTransition) + Send + Sync>;

/// Handle returned by [`LifecycleSource::subscribe`].
///
/// The unsubscribe action runs once, on [`Subscription::cancel`] or drop.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps an unsubscribe action.
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unsubscribes now.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Event producer for lifecycle transitions.
pub trait LifecycleSource: Send + Sync {
    /// Registers `listener` until the returned subscription is released.
    ///
    /// # Errors
    /// Returns [`MonitorError::SourceUnavailable`] when the host cannot
    /// provide the signal.
    fn subscribe(&self, listener: LifecycleListener) -> Result<Subscription, MonitorError>;
}

#[derive(Default)]
struct SourceRegistry {
    next_id: u64,
    listeners: BTreeMap<u64, LifecycleListener>,
    unsubscribed: u32,
    unavailable: bool,
}

/// In-process source driven by explicit [`ManualLifecycleSource::emit`]
/// calls; used by host shells and tests.
#[derive(Default, Clone)]
pub struct ManualLifecycleSource {
    registry: Arc<Mutex<SourceRegistry>>,
}

impl ManualLifecycleSource {
    /// Creates a source with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source whose `subscribe` always fails.
    pub fn unavailable() -> Self {
        let source = Self::default();
        lock(&source.registry).unavailable = true;
        source
    }

    /// Delivers `transition` to every current listener.
    pub fn emit(&self, transition: LifecycleTransition) {
        let listeners: Vec<LifecycleListener> =
            lock(&self.registry).listeners.values().cloned().collect();
        for listener in listeners {
            listener(transition);
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    /// Number of completed unsubscribes.
    pub fn unsubscribe_count(&self) -> u32 {
        lock(&self.registry).unsubscribed
    }
}

impl LifecycleSource for ManualLifecycleSource {
    fn subscribe(&self, listener: LifecycleListener) -> Result<Subscription, MonitorError> {
        let id = {
            let mut registry = lock(&self.registry);
            if registry.unavailable {
                return Err(MonitorError::SourceUnavailable(
                    "lifecycle signal not provided by host".to_string(),
                ));
            }
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.insert(id, listener);
            id
        };

        let registry: Weak<Mutex<SourceRegistry>> = Arc::downgrade(&self.registry);
        Ok(Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                let mut registry = lock(&registry);
                if registry.listeners.remove(&id).is_some() {
                    registry.unsubscribed += 1;
                }
            }
        }))
    }
}

/// Events frozen at the submit latch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnomalySnapshot {
    /// Events in arrival order.
    pub events: Vec<AnomalyEvent>,
    /// `events.len()` as sent to the server.
    pub count: u32,
}

struct MonitorLog {
    events: Vec<AnomalyEvent>,
    armed: bool,
    sealed: bool,
    dropped_before_arm: u32,
    dropped_after_seal: u32,
}

impl MonitorLog {
    fn new(armed: bool) -> Self {
        Self {
            events: Vec::new(),
            armed,
            sealed: false,
            dropped_before_arm: 0,
            dropped_after_seal: 0,
        }
    }

    fn append(&mut self, kind: AnomalyKind, timestamp_ms: u64) -> bool {
        if !self.armed {
            self.dropped_before_arm += 1;
            tracing::debug!(stage = "monitor", ?kind, "anomaly before arm dropped");
            return false;
        }
        if self.sealed {
            self.dropped_after_seal += 1;
            tracing::debug!(stage = "monitor", ?kind, "anomaly after seal dropped");
            return false;
        }
        let event = AnomalyEvent::new(kind, timestamp_ms);
        tracing::info!(
            stage = "monitor",
            ?kind,
            severity = ?event.severity,
            "anomaly recorded"
        );
        self.events.push(event);
        true
    }
}

/// Append-only anomaly log for one attempt.
pub struct AnomalyMonitor {
    log: Arc<Mutex<MonitorLog>>,
    clock: Arc<dyn Clock>,
    subscriptions: Vec<Subscription>,
}

impl AnomalyMonitor {
    /// Creates an empty, armed monitor.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_log(clock, MonitorLog::new(true))
    }

    /// Creates a monitor that drops every event until [`AnomalyMonitor::arm`].
    ///
    /// Lets a caller subscribe before the attempt is issued without counting
    /// what happens while the start request is in flight.
    pub fn disarmed(clock: Arc<dyn Clock>) -> Self {
        Self::with_log(clock, MonitorLog::new(false))
    }

    fn with_log(clock: Arc<dyn Clock>, log: MonitorLog) -> Self {
        Self {
            log: Arc::new(Mutex::new(log)),
            clock,
            subscriptions: Vec::new(),
        }
    }

    /// Starts counting. No-op when already armed or sealed.
    pub fn arm(&self) {
        let mut log = lock(&self.log);
        if !log.armed && !log.sealed {
            log.armed = true;
            tracing::debug!(
                stage = "monitor",
                dropped = log.dropped_before_arm,
                "anomaly log armed"
            );
        }
    }

    /// Whether events are being counted.
    pub fn is_armed(&self) -> bool {
        lock(&self.log).armed
    }

    /// Subscribes to `source` until seal, detach or drop.
    ///
    /// No-op once sealed.
    ///
    /// # Errors
    /// Propagates [`MonitorError`] from the source.
    pub fn attach(&mut self, source: &dyn LifecycleSource) -> Result<(), MonitorError> {
        if self.is_sealed() {
            return Ok(());
        }
        let log = Arc::clone(&self.log);
        let clock = Arc::clone(&self.clock);
        let subscription = source.subscribe(Arc::new(move |transition| {
            if let Some(kind) = transition.anomaly_kind() {
                lock(&log).append(kind, clock.now_ms());
            }
        }))?;
        self.subscriptions.push(subscription);
        Ok(())
    }

    /// Records `transition` if it qualifies. Returns whether it was appended.
    pub fn observe(&self, transition: LifecycleTransition) -> bool {
        transition
            .anomaly_kind()
            .is_some_and(|kind| self.record(kind))
    }

    /// Appends an anomaly unless sealed. Returns whether it was appended.
    pub fn record(&self, kind: AnomalyKind) -> bool {
        lock(&self.log).append(kind, self.clock.now_ms())
    }

    /// Latches the log, releases subscriptions and returns the frozen events.
    ///
    /// Repeated calls return the same snapshot.
    pub fn seal(&mut self) -> AnomalySnapshot {
        let snapshot = {
            let mut log = lock(&self.log);
            log.sealed = true;
            AnomalySnapshot {
                count: log.events.len() as u32,
                events: log.events.clone(),
            }
        };
        self.detach();
        snapshot
    }

    /// Releases subscriptions without sealing.
    pub fn detach(&mut self) {
        if !self.subscriptions.is_empty() {
            tracing::debug!(
                stage = "monitor",
                released = self.subscriptions.len(),
                "lifecycle subscriptions released"
            );
        }
        self.subscriptions.clear();
    }

    /// Whether [`AnomalyMonitor::seal`] has run.
    pub fn is_sealed(&self) -> bool {
        lock(&self.log).sealed
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<AnomalyEvent> {
        lock(&self.log).events.clone()
    }

    /// Number of events recorded so far.
    pub fn count(&self) -> u32 {
        lock(&self.log).events.len() as u32
    }

    /// Qualifying transitions dropped because they arrived before arming.
    pub fn dropped_before_arm(&self) -> u32 {
        lock(&self.log).dropped_before_arm
    }

    /// Qualifying transitions dropped because they arrived after the seal.
    pub fn dropped_after_seal(&self) -> u32 {
        lock(&self.log).dropped_after_seal
    }

    /// Live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Monitor errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// The host cannot deliver lifecycle signals.
    #[error("lifecycle source unavailable: {0}")]
    SourceUnavailable(String),
}

impl MonitorError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::PermissionDenied
    }
}
