#![warn(missing_docs)]
//! # exam-guard-lockdown
//!
//! ## Purpose
//! Enters and exits the exclusive, input-restricted desktop mode used for
//! locked exams, and exposes the desktop bridge consumed by the exam shell.
//!
//! ## Responsibilities
//! - Apply full-screen, chrome-free, always-on-top window flags.
//! - Register the OS-global shortcut denylist one combination at a time.
//! - Reverse both exactly on disable, tolerating repeated calls.
//! - Pair the controller with the restriction enforcer behind
//!   [`DesktopBridge`], including password-protected quit.
//!
//! ## Data flow
//! Exam shell -> [`DesktopBridge::enable_seb_mode`] ->
//! [`LockdownController::enable`] + `RestrictionEnforcer::enable` -> student
//! works -> [`DesktopBridge::quit_with_password`] / [`DesktopBridge::release`]
//! -> both disabled.
//!
//! ## Ownership and lifetimes
//! [`LockdownState`] is owned by the controller alone and reset on disable or
//! drop.
//!
//! ## Error model
//! Window and shortcut refusals are counted in [`LockdownReport`] and logged.
//! Only quit-with-password reports [`BridgeError`] to the caller.
//!
//! ## Security and privacy notes
//! The quit password is compared as a SHA-256 digest and never logged.

use std::sync::Arc;

use exam_guard_core::ErrorCategory;
use exam_guard_platform::{
    Key, KeyCombo, Modifiers, RegisteredSet, ShortcutId, ShortcutRegistry, WindowControl,
    WindowFlag, register_all, unregister_all,
};
use exam_guard_restriction::{RestrictionEnforcer, RestrictionStatus};
use sha2::{Digest, Sha256};
use thiserror::Error;

const ALT_SHIFT: Modifiers = Modifiers::ALT.union(Modifiers::SHIFT);
const CTRL_SHIFT: Modifiers = Modifiers::CTRL.union(Modifiers::SHIFT);
const SUPER_ALT: Modifiers = Modifiers::SUPER.union(Modifiers::ALT);
const SUPER_SHIFT: Modifiers = Modifiers::SUPER.union(Modifiers::SHIFT);

/// OS-global shortcuts blocked while locked down: task switching, quitting,
/// developer tools, screenshots and a bare Escape.
pub const LOCKDOWN_SHORTCUTS: [KeyCombo; 20] = [
    // task switch
    KeyCombo::new(Modifiers::ALT, Key::Tab),
    KeyCombo::new(ALT_SHIFT, Key::Tab),
    KeyCombo::new(Modifiers::SUPER, Key::Tab),
    KeyCombo::new(Modifiers::ALT, Key::Escape),
    KeyCombo::new(Modifiers::CTRL, Key::Escape),
    KeyCombo::new(Modifiers::SUPER, Key::Letter('D')),
    KeyCombo::new(Modifiers::SUPER, Key::Letter('H')),
    KeyCombo::new(Modifiers::SUPER, Key::Letter('M')),
    // quit
    KeyCombo::new(Modifiers::ALT, Key::F4),
    KeyCombo::new(Modifiers::CTRL, Key::Letter('Q')),
    KeyCombo::new(Modifiers::SUPER, Key::Letter('Q')),
    KeyCombo::new(Modifiers::CTRL, Key::Letter('W')),
    KeyCombo::new(Modifiers::SUPER, Key::Letter('W')),
    // dev tools
    KeyCombo::bare(Key::F12),
    KeyCombo::new(CTRL_SHIFT, Key::Letter('I')),
    KeyCombo::new(CTRL_SHIFT, Key::Letter('J')),
    KeyCombo::new(SUPER_ALT, Key::Letter('I')),
    // screenshot
    KeyCombo::bare(Key::PrintScreen),
    KeyCombo::new(SUPER_SHIFT, Key::Digit(3)),
    KeyCombo::bare(Key::Escape),
];

/// Controller state: active flag plus the shortcuts this controller holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockdownState {
    /// Whether lockdown is engaged.
    pub active: bool,
    /// Shortcuts registered by this controller.
    pub blocked: RegisteredSet,
}

/// Outcome of one [`LockdownController::enable`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockdownReport {
    /// Window flags applied.
    pub window_flags_applied: usize,
    /// Window flags the platform refused.
    pub window_flags_failed: usize,
    /// Shortcuts newly registered.
    pub registered: usize,
    /// Shortcuts the platform refused.
    pub failed: usize,
}

/// Desktop lockdown state machine: `Inactive -> Active -> Inactive`.
pub struct LockdownController {
    registry: Arc<dyn ShortcutRegistry>,
    window: Arc<dyn WindowControl>,
    shortcuts: Vec<KeyCombo>,
    state: LockdownState,
}

impl LockdownController {
    /// Creates an inactive controller with the default denylist.
    pub fn new(registry: Arc<dyn ShortcutRegistry>, window: Arc<dyn WindowControl>) -> Self {
        Self::with_shortcuts(registry, window, LOCKDOWN_SHORTCUTS.to_vec())
    }

    /// Creates an inactive controller with a caller-supplied denylist.
    pub fn with_shortcuts(
        registry: Arc<dyn ShortcutRegistry>,
        window: Arc<dyn WindowControl>,
        shortcuts: Vec<KeyCombo>,
    ) -> Self {
        Self {
            registry,
            window,
            shortcuts,
            state: LockdownState::default(),
        }
    }

    /// Engages lockdown. No-op returning an empty report when already active.
    pub fn enable(&mut self) -> LockdownReport {
        if self.state.active {
            return LockdownReport::default();
        }
        self.state.active = true;

        let mut report = LockdownReport::default();
        for (flag, value) in WindowFlag::LOCKED {
            match self.window.set_flag(flag, value) {
                Ok(()) => report.window_flags_applied += 1,
                Err(error) => {
                    report.window_flags_failed += 1;
                    tracing::warn!(stage = "lockdown", ?flag, %error, "window flag refused");
                }
            }
        }

        let registration = register_all(
            self.registry.as_ref(),
            &self.shortcuts,
            &mut self.state.blocked,
        );
        report.registered = registration.registered;
        report.failed = registration.failed.len();

        tracing::info!(
            stage = "lockdown",
            action = "enable",
            registered = report.registered,
            failed = report.failed,
            window_flags_failed = report.window_flags_failed,
            "lockdown engaged"
        );
        report
    }

    /// Releases lockdown. No-op returning `0` when inactive.
    ///
    /// Returns the number of shortcuts released.
    pub fn disable(&mut self) -> usize {
        if !self.state.active {
            return 0;
        }

        for (flag, value) in WindowFlag::LOCKED.iter().rev() {
            if let Err(error) = self.window.set_flag(*flag, !*value) {
                tracing::warn!(stage = "lockdown", ?flag, %error, "window flag restore refused");
            }
        }
        let released = unregister_all(self.registry.as_ref(), &mut self.state.blocked);
        self.state.active = false;

        tracing::info!(
            stage = "lockdown",
            action = "disable",
            released,
            "lockdown released"
        );
        released
    }

    /// Returns `true` while engaged.
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Current state snapshot.
    pub fn state(&self) -> &LockdownState {
        &self.state
    }

    /// Returns the combination when a fired id belongs to this controller.
    pub fn on_shortcut_fired(&self, id: ShortcutId) -> Option<KeyCombo> {
        if !self.state.active {
            return None;
        }
        self.state.blocked.combo_for(id)
    }
}

impl Drop for LockdownController {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Static configuration exposed by [`DesktopBridge::config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Platform tag (`win`, `mac`, ...), matching the config-download query.
    pub platform: String,
    /// Desktop shell version.
    pub app_version: String,
    /// Lowercase hex SHA-256 of the proctor quit password, if quitting with a
    /// password is allowed.
    pub quit_password_sha256: Option<String>,
}

/// Options for [`DesktopBridge::enable_seb_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SebModeOptions {
    /// Also run the clipboard/capture restriction enforcer.
    pub block_clipboard: bool,
}

impl Default for SebModeOptions {
    fn default() -> Self {
        Self {
            block_clipboard: true,
        }
    }
}

/// Instruction returned to the host after a successful quit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitDirective {
    /// Lockdown is released; the host should exit the process.
    Exit,
}

/// Desktop bridge surface backed by one controller and one enforcer.
pub struct DesktopBridge {
    config: BridgeConfig,
    lockdown: LockdownController,
    restriction: RestrictionEnforcer,
}

impl DesktopBridge {
    /// Creates a bridge in the unlocked state.
    pub fn new(
        config: BridgeConfig,
        lockdown: LockdownController,
        restriction: RestrictionEnforcer,
    ) -> Self {
        Self {
            config,
            lockdown,
            restriction,
        }
    }

    /// Returns bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Engages lockdown and, when requested, capture restriction.
    pub fn enable_seb_mode(&mut self, options: SebModeOptions) -> LockdownReport {
        let report = self.lockdown.enable();
        if options.block_clipboard {
            self.restriction.enable();
        }
        report
    }

    /// Returns `true` while lockdown is engaged.
    pub fn is_seb_locked(&self) -> bool {
        self.lockdown.is_active()
    }

    /// Restriction enforcer status.
    pub fn restriction_status(&self) -> RestrictionStatus {
        self.restriction.status()
    }

    /// Releases lockdown after verifying the proctor password.
    ///
    /// # Errors
    /// Returns [`BridgeError::PasswordQuitDisabled`] when no password hash is
    /// configured and [`BridgeError::WrongPassword`] on mismatch; lockdown
    /// stays engaged in both cases.
    pub fn quit_with_password(&mut self, password: &str) -> Result<QuitDirective, BridgeError> {
        let expected = self
            .config
            .quit_password_sha256
            .as_deref()
            .ok_or(BridgeError::PasswordQuitDisabled)?;

        if !hash_quit_password(password).eq_ignore_ascii_case(expected.trim()) {
            tracing::warn!(stage = "bridge", action = "quit", "quit password rejected");
            return Err(BridgeError::WrongPassword);
        }

        self.release();
        tracing::info!(stage = "bridge", action = "quit", "quit password accepted");
        Ok(QuitDirective::Exit)
    }

    /// Releases lockdown unconditionally.
    pub fn force_quit(&mut self) -> QuitDirective {
        self.release();
        tracing::warn!(stage = "bridge", action = "force_quit", "lockdown force-released");
        QuitDirective::Exit
    }

    /// Releases lockdown and restriction without exiting, for navigation away
    /// from the exam screen.
    pub fn release(&mut self) {
        self.restriction.disable();
        self.lockdown.disable();
    }

    /// Routes a fired platform shortcut to whichever component owns it.
    ///
    /// Capture combinations held by the controller still clear the clipboard
    /// while restriction is active.
    pub fn on_shortcut_fired(&self, id: ShortcutId) -> Option<KeyCombo> {
        if let Some(combo) = self.restriction.on_shortcut_fired(id) {
            return Some(combo);
        }
        let combo = self.lockdown.on_shortcut_fired(id)?;
        self.restriction.clear_for_capture(&combo);
        Some(combo)
    }
}

/// Returns lowercase hex SHA-256 of a quit password.
pub fn hash_quit_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Desktop bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No quit password is configured for this exam.
    #[error("quitting with a password is not enabled")]
    PasswordQuitDisabled,
    /// Password digest mismatch.
    #[error("quit password is incorrect")]
    WrongPassword,
}

impl BridgeError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::PermissionDenied
    }
}
