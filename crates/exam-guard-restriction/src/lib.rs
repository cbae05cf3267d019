#![warn(missing_docs)]
//! # exam-guard-restriction
//!
//! ## Purpose
//! Best-effort denial of copy and screen-capture primitives on the desktop
//! exam surface.
//!
//! ## Responsibilities
//! - Empty the clipboard immediately on enable and then on a fixed period.
//! - Register the capture-shortcut denylist platform-wide and empty the
//!   clipboard again whenever one of them fires.
//! - Release exactly the shortcuts this instance registered on disable.
//!
//! ## Data flow
//! Host calls [`RestrictionEnforcer::enable`] -> worker thread clears the
//! clipboard every [`RestrictionConfig::clear_period`] -> `WM_HOTKEY`-style
//! notifications are forwarded to [`RestrictionEnforcer::on_shortcut_fired`]
//! -> [`RestrictionEnforcer::disable`] joins the worker and unregisters.
//!
//! ## Ownership and lifetimes
//! The enforcer owns its worker thread handle and its [`RegisteredSet`]; drop
//! performs the same teardown as `disable`.
//!
//! ## Error model
//! Nothing here fails to the caller. Per-shortcut registration refusals and
//! clipboard errors are logged and degrade a single capability.
//!
//! ## Security and privacy notes
//! Clipboard content present before `enable` is destroyed irretrievably.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use exam_guard_platform::{
    Clipboard, Key, KeyCombo, Modifiers, RegisteredSet, RegistrationReport, ShortcutId,
    ShortcutRegistry, register_all, unregister_all,
};

/// Default clipboard clearing period.
pub const DEFAULT_CLEAR_PERIOD: Duration = Duration::from_secs(1);

const SUPER_SHIFT: Modifiers = Modifiers::SUPER.union(Modifiers::SHIFT);
const CTRL_SUPER_SHIFT: Modifiers = Modifiers::CTRL.union(SUPER_SHIFT);

/// Screenshot and screen-record shortcuts blocked while restricted.
pub const CAPTURE_SHORTCUTS: [KeyCombo; 12] = [
    KeyCombo::bare(Key::PrintScreen),
    KeyCombo::new(Modifiers::ALT, Key::PrintScreen),
    KeyCombo::new(Modifiers::CTRL, Key::PrintScreen),
    KeyCombo::new(Modifiers::SHIFT, Key::PrintScreen),
    KeyCombo::new(Modifiers::SUPER, Key::PrintScreen),
    KeyCombo::new(SUPER_SHIFT, Key::Letter('S')),
    KeyCombo::new(Modifiers::SUPER.union(Modifiers::ALT), Key::Letter('R')),
    KeyCombo::new(SUPER_SHIFT, Key::Digit(3)),
    KeyCombo::new(SUPER_SHIFT, Key::Digit(4)),
    KeyCombo::new(SUPER_SHIFT, Key::Digit(5)),
    KeyCombo::new(CTRL_SUPER_SHIFT, Key::Digit(3)),
    KeyCombo::new(CTRL_SUPER_SHIFT, Key::Digit(4)),
];

/// Enforcer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionConfig {
    /// Interval between background clipboard clears.
    pub clear_period: Duration,
    /// Shortcuts registered on enable.
    pub shortcuts: Vec<KeyCombo>,
}

impl RestrictionConfig {
    /// Creates a configuration with the default denylist.
    ///
    /// A zero period is raised to one millisecond.
    pub fn new(clear_period: Duration) -> Self {
        Self {
            clear_period: clear_period.max(Duration::from_millis(1)),
            shortcuts: CAPTURE_SHORTCUTS.to_vec(),
        }
    }
}

impl Default for RestrictionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAR_PERIOD)
    }
}

/// Snapshot returned by [`RestrictionEnforcer::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestrictionStatus {
    /// Whether the enforcer is enabled.
    pub active: bool,
    /// Whether the periodic clipboard job is running.
    pub clipboard_blocked: bool,
}

enum JobCommand {
    Shutdown,
}

struct ClipboardJob {
    command_tx: Sender<JobCommand>,
    join: JoinHandle<()>,
}

impl ClipboardJob {
    fn spawn(clipboard: Arc<dyn Clipboard>, period: Duration) -> std::io::Result<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let join = std::thread::Builder::new()
            .name("exam-guard-clipboard".to_string())
            .spawn(move || {
                loop {
                    match command_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(error) = clipboard.clear() {
                                tracing::debug!(%error, "periodic clipboard clear failed");
                            }
                        }
                        Ok(JobCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Self { command_tx, join })
    }

    fn stop(self) {
        let _ = self.command_tx.send(JobCommand::Shutdown);
        if self.join.join().is_err() {
            tracing::warn!(stage = "restriction", "clipboard worker panicked");
        }
    }
}

#[derive(Default)]
struct RestrictionState {
    active: bool,
    job: Option<ClipboardJob>,
    blocked: RegisteredSet,
}

/// Clipboard and capture-shortcut enforcer.
pub struct RestrictionEnforcer {
    registry: Arc<dyn ShortcutRegistry>,
    clipboard: Arc<dyn Clipboard>,
    config: RestrictionConfig,
    state: RestrictionState,
}

impl RestrictionEnforcer {
    /// Creates an inactive enforcer.
    pub fn new(
        registry: Arc<dyn ShortcutRegistry>,
        clipboard: Arc<dyn Clipboard>,
        config: RestrictionConfig,
    ) -> Self {
        Self {
            registry,
            clipboard,
            config,
            state: RestrictionState::default(),
        }
    }

    /// Starts clipboard clearing and registers capture shortcuts.
    ///
    /// No-op returning an empty report when already active.
    pub fn enable(&mut self) -> RegistrationReport {
        if self.state.active {
            return RegistrationReport::default();
        }
        self.state.active = true;

        if let Err(error) = self.clipboard.clear() {
            tracing::warn!(stage = "restriction", %error, "initial clipboard clear failed");
        }

        match ClipboardJob::spawn(Arc::clone(&self.clipboard), self.config.clear_period) {
            Ok(job) => self.state.job = Some(job),
            Err(error) => {
                tracing::warn!(stage = "restriction", %error, "clipboard worker did not start");
            }
        }

        let report = register_all(
            self.registry.as_ref(),
            &self.config.shortcuts,
            &mut self.state.blocked,
        );
        tracing::info!(
            stage = "restriction",
            action = "enable",
            registered = report.registered,
            failed = report.failed.len(),
            "capture restriction enabled"
        );
        report
    }

    /// Stops clipboard clearing and releases this instance's shortcuts.
    ///
    /// No-op returning `0` when inactive.
    pub fn disable(&mut self) -> usize {
        if !self.state.active {
            return 0;
        }
        if let Some(job) = self.state.job.take() {
            job.stop();
        }
        let released = unregister_all(self.registry.as_ref(), &mut self.state.blocked);
        self.state.active = false;
        tracing::info!(
            stage = "restriction",
            action = "disable",
            released,
            "capture restriction disabled"
        );
        released
    }

    /// Current status.
    pub fn status(&self) -> RestrictionStatus {
        RestrictionStatus {
            active: self.state.active,
            clipboard_blocked: self.state.job.is_some(),
        }
    }

    /// Handles a fired platform shortcut.
    ///
    /// Returns the combination when `id` belongs to this instance, after
    /// clearing the clipboard; `None` otherwise.
    pub fn on_shortcut_fired(&self, id: ShortcutId) -> Option<KeyCombo> {
        if !self.state.active {
            return None;
        }
        let combo = self.state.blocked.combo_for(id)?;
        if let Err(error) = self.clipboard.clear() {
            tracing::debug!(%error, "clipboard clear after capture shortcut failed");
        }
        tracing::info!(stage = "restriction", %combo, "capture shortcut intercepted");
        Some(combo)
    }

    /// Clears the clipboard for a capture combination fired through another
    /// owner's registration.
    ///
    /// Returns `true` when the enforcer is active and `combo` is one of its
    /// configured shortcuts.
    pub fn clear_for_capture(&self, combo: &KeyCombo) -> bool {
        if !self.state.active || !self.config.shortcuts.contains(combo) {
            return false;
        }
        if let Err(error) = self.clipboard.clear() {
            tracing::debug!(%error, "clipboard clear after capture shortcut failed");
        }
        tracing::info!(stage = "restriction", %combo, "capture shortcut intercepted");
        true
    }

    /// Combinations currently held by this instance.
    pub fn blocked_shortcuts(&self) -> Vec<KeyCombo> {
        self.state.blocked.combos()
    }
}

impl Drop for RestrictionEnforcer {
    fn drop(&mut self) {
        self.disable();
    }
}
