#![warn(missing_docs)]
//! # exam-guard-platform
//!
//! ## Purpose
//! Provides the OS seams used by desktop lockdown: global shortcut
//! registration, clipboard clearing and window chrome control.
//!
//! ## Responsibilities
//! - Model key combinations ([`KeyCombo`]) and the per-owner set of
//!   registrations ([`RegisteredSet`]).
//! - Define backend-agnostic traits ([`ShortcutRegistry`], [`Clipboard`],
//!   [`WindowControl`]).
//! - Expose real Win32 backends on supported platforms.
//! - Expose deterministic synthetic backends for CI and unit tests.
//!
//! ## Data flow
//! Lockdown components hold `Arc<dyn ..>` backends -> register combos one by
//! one into their own [`RegisteredSet`] -> unregister exactly that set on
//! teardown.
//!
//! ## Ownership and lifetimes
//! Registration state lives in the owning component's [`RegisteredSet`], never
//! in ambient globals, so two components sharing one registry cannot release
//! each other's entries.
//!
//! ## Error model
//! Per-call platform refusals are [`PlatformError`] values. Bulk helpers
//! ([`register_all`], [`unregister_all`]) absorb them per combination and
//! report counts instead of failing.
//!
//! ## Security and privacy notes
//! Clipboard contents are never read by real backends; they are only emptied.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use exam_guard_core::ErrorCategory;
use thiserror::Error;

/// Modifier key bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    /// No modifiers.
    pub const NONE: Self = Self(0);
    /// Control key.
    pub const CTRL: Self = Self(1);
    /// Alt / Option key.
    pub const ALT: Self = Self(1 << 1);
    /// Shift key.
    pub const SHIFT: Self = Self(1 << 2);
    /// Windows / Command key.
    pub const SUPER: Self = Self(1 << 3);

    /// Union of two modifier sets, usable in constants.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` when every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Non-modifier key of a combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Tab.
    Tab,
    /// Escape.
    Escape,
    /// F4.
    F4,
    /// F11.
    F11,
    /// F12.
    F12,
    /// Print Screen.
    PrintScreen,
    /// ASCII letter, stored uppercase.
    Letter(char),
    /// Digit `0..=9`.
    Digit(u8),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tab => f.write_str("Tab"),
            Self::Escape => f.write_str("Escape"),
            Self::F4 => f.write_str("F4"),
            Self::F11 => f.write_str("F11"),
            Self::F12 => f.write_str("F12"),
            Self::PrintScreen => f.write_str("PrintScreen"),
            Self::Letter(letter) => write!(f, "{letter}"),
            Self::Digit(digit) => write!(f, "{digit}"),
        }
    }
}

/// One keyboard shortcut: modifiers plus a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyCombo {
    /// Held modifiers.
    pub modifiers: Modifiers,
    /// Triggering key.
    pub key: Key,
}

impl KeyCombo {
    /// Creates a combination.
    pub const fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    /// Creates a combination without modifiers.
    pub const fn bare(key: Key) -> Self {
        Self {
            modifiers: Modifiers::NONE,
            key,
        }
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, label) in [
            (Modifiers::CTRL, "Ctrl+"),
            (Modifiers::ALT, "Alt+"),
            (Modifiers::SHIFT, "Shift+"),
            (Modifiers::SUPER, "Super+"),
        ] {
            if self.modifiers.contains(flag) {
                f.write_str(label)?;
            }
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for KeyCombo {
    type Err = PlatformError;

    /// Parses `"Ctrl+Shift+I"`-style strings. Modifier aliases: `control`,
    /// `option`, `win`, `cmd`, `meta`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || PlatformError::InvalidCombo(raw.to_string());
        let mut modifiers = Modifiers::NONE;
        let mut key = None;

        for token in raw.split('+').map(str::trim) {
            let lower = token.to_ascii_lowercase();
            let modifier = match lower.as_str() {
                "ctrl" | "control" => Some(Modifiers::CTRL),
                "alt" | "option" => Some(Modifiers::ALT),
                "shift" => Some(Modifiers::SHIFT),
                "super" | "win" | "cmd" | "meta" => Some(Modifiers::SUPER),
                _ => None,
            };
            if let Some(modifier) = modifier {
                modifiers = modifiers | modifier;
                continue;
            }

            if key.is_some() {
                return Err(invalid());
            }
            key = Some(match lower.as_str() {
                "tab" => Key::Tab,
                "esc" | "escape" => Key::Escape,
                "f4" => Key::F4,
                "f11" => Key::F11,
                "f12" => Key::F12,
                "printscreen" | "prtsc" | "print" => Key::PrintScreen,
                _ => {
                    let mut chars = token.chars();
                    match (chars.next(), chars.next()) {
                        (Some(digit @ '0'..='9'), None) => Key::Digit(digit as u8 - b'0'),
                        (Some(letter), None) if letter.is_ascii_alphabetic() => {
                            Key::Letter(letter.to_ascii_uppercase())
                        }
                        _ => return Err(invalid()),
                    }
                }
            });
        }

        key.map(|key| Self { modifiers, key }).ok_or_else(invalid)
    }
}

/// Platform handle of one registered shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortcutId(pub i32);

/// Shortcuts currently registered by one owner.
///
/// Each combination appears at most once; the set is the only source of truth
/// for what its owner must release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisteredSet {
    entries: BTreeMap<KeyCombo, ShortcutId>,
}

impl RegisteredSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a registration. Returns `false` if `combo` was already held.
    pub fn insert(&mut self, combo: KeyCombo, id: ShortcutId) -> bool {
        if self.entries.contains_key(&combo) {
            return false;
        }
        self.entries.insert(combo, id);
        true
    }

    /// Removes a combination, returning its platform id.
    pub fn remove(&mut self, combo: &KeyCombo) -> Option<ShortcutId> {
        self.entries.remove(combo)
    }

    /// Returns `true` when `combo` is held.
    pub fn contains(&self, combo: &KeyCombo) -> bool {
        self.entries.contains_key(combo)
    }

    /// Looks up which combination a fired platform id belongs to.
    pub fn combo_for(&self, id: ShortcutId) -> Option<KeyCombo> {
        self.entries
            .iter()
            .find(|(_, held)| **held == id)
            .map(|(combo, _)| *combo)
    }

    /// Held combinations in canonical order.
    pub fn combos(&self) -> Vec<KeyCombo> {
        self.entries.keys().copied().collect()
    }

    /// Number of held combinations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every entry.
    pub fn drain(&mut self) -> Vec<(KeyCombo, ShortcutId)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}

/// Global shortcut registration backend.
pub trait ShortcutRegistry: Send + Sync {
    /// Registers one combination platform-wide.
    ///
    /// # Errors
    /// Returns [`PlatformError::AlreadyRegistered`] when another owner holds
    /// the combination and [`PlatformError::Unsupported`] when the platform
    /// cannot register it.
    fn register(&self, combo: &KeyCombo) -> Result<ShortcutId, PlatformError>;

    /// Releases one registration.
    ///
    /// # Errors
    /// Returns [`PlatformError::NotRegistered`] for unknown ids.
    fn unregister(&self, id: ShortcutId) -> Result<(), PlatformError>;
}

/// System clipboard backend.
pub trait Clipboard: Send + Sync {
    /// Empties the clipboard.
    ///
    /// # Errors
    /// Returns [`PlatformError::Backend`] when the clipboard cannot be opened.
    fn clear(&self) -> Result<(), PlatformError>;
}

/// Window chrome affordance toggled by lockdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WindowFlag {
    /// Exclusive full-screen presentation.
    Fullscreen,
    /// Close button / system close.
    Closable,
    /// Minimize affordance.
    Minimizable,
    /// Maximize affordance.
    Maximizable,
    /// Border resize.
    Resizable,
    /// Title-bar drag.
    Movable,
    /// Pinned above other windows.
    AlwaysOnTop,
}

impl WindowFlag {
    /// Flag values applied while locked down, in application order.
    pub const LOCKED: [(WindowFlag, bool); 7] = [
        (WindowFlag::Fullscreen, true),
        (WindowFlag::Closable, false),
        (WindowFlag::Minimizable, false),
        (WindowFlag::Maximizable, false),
        (WindowFlag::Resizable, false),
        (WindowFlag::Movable, false),
        (WindowFlag::AlwaysOnTop, true),
    ];
}

/// Window control backend for the exam window.
pub trait WindowControl: Send + Sync {
    /// Sets one affordance.
    ///
    /// # Errors
    /// Returns [`PlatformError::Backend`] when the window refuses the change.
    fn set_flag(&self, flag: WindowFlag, enabled: bool) -> Result<(), PlatformError>;
}

/// Outcome of a bulk registration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Newly registered combinations.
    pub registered: usize,
    /// Combinations skipped because the owner already held them.
    pub already_held: usize,
    /// Combinations the platform refused.
    pub failed: Vec<KeyCombo>,
}

/// Registers every combination not yet in `held`, one at a time.
///
/// Individual refusals are logged and reported; they never abort the pass.
pub fn register_all(
    registry: &dyn ShortcutRegistry,
    combos: &[KeyCombo],
    held: &mut RegisteredSet,
) -> RegistrationReport {
    let mut report = RegistrationReport::default();
    for combo in combos {
        if held.contains(combo) {
            report.already_held += 1;
            continue;
        }
        match registry.register(combo) {
            Ok(id) => {
                held.insert(*combo, id);
                report.registered += 1;
            }
            Err(error) => {
                tracing::debug!(%combo, %error, "shortcut registration refused");
                report.failed.push(*combo);
            }
        }
    }
    report
}

/// Releases every entry of `held`, leaving it empty.
///
/// Returns the number of successful unregistrations. Failures are logged and
/// the entry is dropped anyway, since the platform no longer tracks it.
pub fn unregister_all(registry: &dyn ShortcutRegistry, held: &mut RegisteredSet) -> usize {
    let mut released = 0;
    for (combo, id) in held.drain() {
        match registry.unregister(id) {
            Ok(()) => released += 1,
            Err(error) => tracing::debug!(%combo, %error, "shortcut unregistration refused"),
        }
    }
    released
}

/// Win32 global hotkey registry bound to the calling thread's message queue.
///
/// Hotkeys fire as `WM_HOTKEY` with the returned [`ShortcutId`] as `wParam`.
#[derive(Debug, Default)]
pub struct NativeShortcutRegistry {
    _private: (),
}

impl NativeShortcutRegistry {
    /// Creates the native registry.
    ///
    /// # Errors
    /// Returns [`PlatformError::Unsupported`] on non-Windows targets.
    pub fn new() -> Result<Self, PlatformError> {
        #[cfg(windows)]
        {
            Ok(Self { _private: () })
        }

        #[cfg(not(windows))]
        {
            Err(PlatformError::Unsupported(
                "native shortcut registry is currently implemented for Windows only".to_string(),
            ))
        }
    }
}

impl ShortcutRegistry for NativeShortcutRegistry {
    fn register(&self, combo: &KeyCombo) -> Result<ShortcutId, PlatformError> {
        #[cfg(windows)]
        {
            win32::register_hotkey(combo)
        }

        #[cfg(not(windows))]
        {
            Err(PlatformError::Unsupported(combo.to_string()))
        }
    }

    fn unregister(&self, id: ShortcutId) -> Result<(), PlatformError> {
        #[cfg(windows)]
        {
            win32::unregister_hotkey(id)
        }

        #[cfg(not(windows))]
        {
            Err(PlatformError::NotRegistered(id.0))
        }
    }
}

/// Win32 clipboard backend.
#[derive(Debug, Default)]
pub struct NativeClipboard {
    _private: (),
}

impl NativeClipboard {
    /// Creates the native clipboard backend.
    ///
    /// # Errors
    /// Returns [`PlatformError::Unsupported`] on non-Windows targets.
    pub fn new() -> Result<Self, PlatformError> {
        #[cfg(windows)]
        {
            Ok(Self { _private: () })
        }

        #[cfg(not(windows))]
        {
            Err(PlatformError::Unsupported(
                "native clipboard is currently implemented for Windows only".to_string(),
            ))
        }
    }
}

impl Clipboard for NativeClipboard {
    fn clear(&self) -> Result<(), PlatformError> {
        #[cfg(windows)]
        {
            win32::empty_clipboard()
        }

        #[cfg(not(windows))]
        {
            Err(PlatformError::Unsupported("clipboard".to_string()))
        }
    }
}

/// Win32 window control for one top-level window.
#[derive(Debug)]
pub struct NativeWindow {
    #[cfg_attr(not(windows), allow(dead_code))]
    hwnd: isize,
}

impl NativeWindow {
    /// Wraps a raw window handle value.
    ///
    /// # Errors
    /// Returns [`PlatformError::Backend`] for a null handle and
    /// [`PlatformError::Unsupported`] on non-Windows targets.
    pub fn from_raw(hwnd: isize) -> Result<Self, PlatformError> {
        if hwnd == 0 {
            return Err(PlatformError::Backend("window handle is null".to_string()));
        }

        #[cfg(windows)]
        {
            Ok(Self { hwnd })
        }

        #[cfg(not(windows))]
        {
            Err(PlatformError::Unsupported(
                "native window control is currently implemented for Windows only".to_string(),
            ))
        }
    }
}

impl WindowControl for NativeWindow {
    fn set_flag(&self, flag: WindowFlag, enabled: bool) -> Result<(), PlatformError> {
        #[cfg(windows)]
        {
            win32::set_window_flag(self.hwnd, flag, enabled)
        }

        #[cfg(not(windows))]
        {
            let _ = (flag, enabled);
            Err(PlatformError::Unsupported("window control".to_string()))
        }
    }
}

#[cfg(windows)]
mod win32 {
    //! Raw Win32 calls behind the native backends.

    use std::ffi::c_void;
    use std::ptr::null_mut;
    use std::sync::atomic::{AtomicI32, Ordering};

    use windows_sys::Win32::System::DataExchange::{CloseClipboard, EmptyClipboard, OpenClipboard};
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
        MOD_ALT, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, MOD_WIN, RegisterHotKey, UnregisterHotKey,
        VK_ESCAPE, VK_F4, VK_F11, VK_F12, VK_SNAPSHOT, VK_TAB,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        EnableMenuItem, GWL_STYLE, GetSystemMenu, GetWindowLongW, HWND_NOTOPMOST, HWND_TOPMOST,
        MF_BYCOMMAND, MF_ENABLED, MF_GRAYED, SC_CLOSE, SW_MAXIMIZE, SW_RESTORE, SWP_FRAMECHANGED,
        SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SetWindowLongW, SetWindowPos, ShowWindow,
        WS_CAPTION, WS_MAXIMIZEBOX, WS_MINIMIZEBOX, WS_THICKFRAME,
    };

    use super::{Key, KeyCombo, Modifiers, PlatformError, ShortcutId, WindowFlag};

    // Application-defined hotkey ids must stay within 0x0000..=0xBFFF.
    static NEXT_HOTKEY_ID: AtomicI32 = AtomicI32::new(0x0100);

    pub(super) fn register_hotkey(combo: &KeyCombo) -> Result<ShortcutId, PlatformError> {
        let id = NEXT_HOTKEY_ID.fetch_add(1, Ordering::Relaxed);
        if id > 0xBFFF {
            return Err(PlatformError::Backend("hotkey id space exhausted".to_string()));
        }

        let mut modifiers = MOD_NOREPEAT;
        if combo.modifiers.contains(Modifiers::CTRL) {
            modifiers |= MOD_CONTROL;
        }
        if combo.modifiers.contains(Modifiers::ALT) {
            modifiers |= MOD_ALT;
        }
        if combo.modifiers.contains(Modifiers::SHIFT) {
            modifiers |= MOD_SHIFT;
        }
        if combo.modifiers.contains(Modifiers::SUPER) {
            modifiers |= MOD_WIN;
        }

        let ok = unsafe {
            // Safety:
            // - A null window binds the hotkey to the calling thread's queue.
            // - `id` is unique for this process.
            RegisterHotKey(null_mut(), id, modifiers, virtual_key(combo.key))
        };
        if ok == 0 {
            return Err(PlatformError::AlreadyRegistered(combo.to_string()));
        }
        Ok(ShortcutId(id))
    }

    pub(super) fn unregister_hotkey(id: ShortcutId) -> Result<(), PlatformError> {
        let ok = unsafe {
            // Safety:
            // - Releases a thread-bound hotkey id; unknown ids fail cleanly.
            UnregisterHotKey(null_mut(), id.0)
        };
        if ok == 0 {
            return Err(PlatformError::NotRegistered(id.0));
        }
        Ok(())
    }

    pub(super) fn empty_clipboard() -> Result<(), PlatformError> {
        let opened = unsafe {
            // Safety:
            // - A null owner opens the clipboard for the current task.
            OpenClipboard(null_mut())
        };
        if opened == 0 {
            return Err(PlatformError::Backend("OpenClipboard failed".to_string()));
        }

        let emptied = unsafe {
            // Safety:
            // - Clipboard is open on this thread.
            EmptyClipboard()
        };
        unsafe {
            // Safety:
            // - Balances the successful `OpenClipboard` above.
            CloseClipboard();
        }

        if emptied == 0 {
            return Err(PlatformError::Backend("EmptyClipboard failed".to_string()));
        }
        Ok(())
    }

    pub(super) fn set_window_flag(
        hwnd_value: isize,
        flag: WindowFlag,
        enabled: bool,
    ) -> Result<(), PlatformError> {
        let hwnd = hwnd_value as *mut c_void;
        match flag {
            WindowFlag::Fullscreen => {
                toggle_style(hwnd, WS_CAPTION | WS_THICKFRAME, !enabled)?;
                unsafe {
                    // Safety:
                    // - `hwnd` is the exam window handle supplied by the host.
                    ShowWindow(hwnd, if enabled { SW_MAXIMIZE } else { SW_RESTORE });
                }
                Ok(())
            }
            WindowFlag::Closable => {
                let menu = unsafe {
                    // Safety:
                    // - Returns the window's own system menu, not a copy.
                    GetSystemMenu(hwnd, 0)
                };
                if menu.is_null() {
                    return Err(PlatformError::Backend("GetSystemMenu failed".to_string()));
                }
                let state = if enabled { MF_ENABLED } else { MF_GRAYED };
                unsafe {
                    // Safety:
                    // - `menu` is a valid system menu handle.
                    EnableMenuItem(menu, SC_CLOSE, MF_BYCOMMAND | state);
                }
                Ok(())
            }
            WindowFlag::Minimizable => toggle_style(hwnd, WS_MINIMIZEBOX, enabled),
            WindowFlag::Maximizable => toggle_style(hwnd, WS_MAXIMIZEBOX, enabled),
            WindowFlag::Resizable => toggle_style(hwnd, WS_THICKFRAME, enabled),
            WindowFlag::Movable => toggle_style(hwnd, WS_CAPTION, enabled),
            WindowFlag::AlwaysOnTop => {
                let insert_after = if enabled { HWND_TOPMOST } else { HWND_NOTOPMOST };
                let ok = unsafe {
                    // Safety:
                    // - Position and size are preserved by the flags.
                    SetWindowPos(hwnd, insert_after, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE)
                };
                if ok == 0 {
                    return Err(PlatformError::Backend("SetWindowPos failed".to_string()));
                }
                Ok(())
            }
        }
    }

    fn toggle_style(hwnd: *mut c_void, bits: u32, set: bool) -> Result<(), PlatformError> {
        let current = unsafe {
            // Safety:
            // - Reads the style of a valid window handle.
            GetWindowLongW(hwnd, GWL_STYLE)
        } as u32;
        let next = if set { current | bits } else { current & !bits };
        if next == current {
            return Ok(());
        }

        unsafe {
            // Safety:
            // - Style values come from the window's own style word.
            SetWindowLongW(hwnd, GWL_STYLE, next as i32);
        }
        let ok = unsafe {
            // Safety:
            // - Forces a non-client repaint without moving the window.
            SetWindowPos(
                hwnd,
                null_mut(),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_FRAMECHANGED,
            )
        };
        if ok == 0 {
            return Err(PlatformError::Backend("SetWindowPos failed".to_string()));
        }
        Ok(())
    }

    fn virtual_key(key: Key) -> u32 {
        match key {
            Key::Tab => u32::from(VK_TAB),
            Key::Escape => u32::from(VK_ESCAPE),
            Key::F4 => u32::from(VK_F4),
            Key::F11 => u32::from(VK_F11),
            Key::F12 => u32::from(VK_F12),
            Key::PrintScreen => u32::from(VK_SNAPSHOT),
            Key::Letter(letter) => letter as u32,
            Key::Digit(digit) => u32::from(b'0' + digit),
        }
    }
}

#[derive(Debug, Default)]
struct SyntheticRegistryState {
    next_id: i32,
    active: BTreeMap<ShortcutId, KeyCombo>,
    foreign: BTreeSet<KeyCombo>,
    unsupported: BTreeSet<KeyCombo>,
    register_calls: usize,
    unregister_calls: usize,
}

/// Deterministic in-memory shortcut registry shared by all of its users, the
/// way the OS registry is shared by all processes.
#[derive(Debug, Default)]
pub struct SyntheticShortcutRegistry {
    state: Mutex<SyntheticRegistryState>,
}

impl SyntheticShortcutRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks combinations as owned by another process.
    pub fn with_foreign(self, combos: &[KeyCombo]) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.foreign.extend(combos.iter().copied());
        }
        self
    }

    /// Marks combinations as unsupported by the platform.
    pub fn with_unsupported(self, combos: &[KeyCombo]) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.unsupported.extend(combos.iter().copied());
        }
        self
    }

    /// Currently registered combinations, sorted.
    pub fn active_combos(&self) -> Vec<KeyCombo> {
        self.state
            .lock()
            .map(|state| {
                let mut combos: Vec<KeyCombo> = state.active.values().copied().collect();
                combos.sort();
                combos
            })
            .unwrap_or_default()
    }

    /// Platform id of a registered combination, for simulating a key press.
    pub fn id_for(&self, combo: &KeyCombo) -> Option<ShortcutId> {
        self.state.lock().ok().and_then(|state| {
            state
                .active
                .iter()
                .find(|(_, held)| *held == combo)
                .map(|(id, _)| *id)
        })
    }

    /// Total `register` calls observed.
    pub fn register_calls(&self) -> usize {
        self.state.lock().map(|state| state.register_calls).unwrap_or(0)
    }

    /// Total `unregister` calls observed.
    pub fn unregister_calls(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.unregister_calls)
            .unwrap_or(0)
    }
}

impl ShortcutRegistry for SyntheticShortcutRegistry {
    fn register(&self, combo: &KeyCombo) -> Result<ShortcutId, PlatformError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PlatformError::Backend("synthetic registry lock poisoned".to_string()))?;
        state.register_calls += 1;

        if state.unsupported.contains(combo) {
            return Err(PlatformError::Unsupported(combo.to_string()));
        }
        if state.foreign.contains(combo) || state.active.values().any(|held| held == combo) {
            return Err(PlatformError::AlreadyRegistered(combo.to_string()));
        }

        state.next_id += 1;
        let id = ShortcutId(state.next_id);
        state.active.insert(id, *combo);
        Ok(id)
    }

    fn unregister(&self, id: ShortcutId) -> Result<(), PlatformError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PlatformError::Backend("synthetic registry lock poisoned".to_string()))?;
        state.unregister_calls += 1;
        state
            .active
            .remove(&id)
            .map(|_| ())
            .ok_or(PlatformError::NotRegistered(id.0))
    }
}

/// In-memory clipboard with observable contents and clear count.
#[derive(Debug, Default)]
pub struct SyntheticClipboard {
    contents: Mutex<Option<String>>,
    clears: AtomicUsize,
}

impl SyntheticClipboard {
    /// Creates an empty clipboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the user copying text.
    pub fn set_contents(&self, text: impl Into<String>) {
        if let Ok(mut contents) = self.contents.lock() {
            *contents = Some(text.into());
        }
    }

    /// Current clipboard text.
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|contents| contents.clone())
    }

    /// Number of successful clears.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl Clipboard for SyntheticClipboard {
    fn clear(&self) -> Result<(), PlatformError> {
        let mut contents = self
            .contents
            .lock()
            .map_err(|_| PlatformError::Backend("synthetic clipboard lock poisoned".to_string()))?;
        *contents = None;
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory window recording the last value of each flag.
#[derive(Debug, Default)]
pub struct SyntheticWindow {
    flags: Mutex<BTreeMap<WindowFlag, bool>>,
    refused: BTreeSet<WindowFlag>,
}

impl SyntheticWindow {
    /// Creates a window that accepts every flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a window that refuses the given flags.
    pub fn refusing(flags: &[WindowFlag]) -> Self {
        Self {
            flags: Mutex::new(BTreeMap::new()),
            refused: flags.iter().copied().collect(),
        }
    }

    /// Last value set for `flag`, if any.
    pub fn flag(&self, flag: WindowFlag) -> Option<bool> {
        self.flags
            .lock()
            .ok()
            .and_then(|flags| flags.get(&flag).copied())
    }
}

impl WindowControl for SyntheticWindow {
    fn set_flag(&self, flag: WindowFlag, enabled: bool) -> Result<(), PlatformError> {
        if self.refused.contains(&flag) {
            return Err(PlatformError::Backend(format!("{flag:?} refused")));
        }
        let mut flags = self
            .flags
            .lock()
            .map_err(|_| PlatformError::Backend("synthetic window lock poisoned".to_string()))?;
        flags.insert(flag, enabled);
        Ok(())
    }
}

/// Platform layer error type.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Another owner already holds the combination.
    #[error("shortcut already registered: {0}")]
    AlreadyRegistered(String),
    /// Platform cannot perform the request.
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),
    /// Id is not registered.
    #[error("shortcut id {0} is not registered")]
    NotRegistered(i32),
    /// Combination string could not be parsed.
    #[error("invalid key combination: {0}")]
    InvalidCombo(String),
    /// Backend runtime failure.
    #[error("platform backend failure: {0}")]
    Backend(String),
}

impl PlatformError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyRegistered(_) | Self::Unsupported(_) | Self::Backend(_) => {
                ErrorCategory::PermissionDenied
            }
            Self::NotRegistered(_) => ErrorCategory::InvariantViolation,
            Self::InvalidCombo(_) => ErrorCategory::PreconditionFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for combo parsing and synthetic registry semantics.

    use super::*;

    #[test]
    fn parses_and_displays_combos() {
        let combo: KeyCombo = "ctrl+shift+i".parse().expect("combo should parse");
        assert_eq!(
            combo,
            KeyCombo::new(Modifiers::CTRL | Modifiers::SHIFT, Key::Letter('I'))
        );
        assert_eq!(combo.to_string(), "Ctrl+Shift+I");
        assert_eq!("Cmd+Shift+3".parse::<KeyCombo>().unwrap().key, Key::Digit(3));
        assert!("Ctrl+".parse::<KeyCombo>().is_err());
        assert!("Ctrl+A+B".parse::<KeyCombo>().is_err());
    }

    #[test]
    fn synthetic_registry_rejects_second_owner() {
        let registry = SyntheticShortcutRegistry::new();
        let combo = KeyCombo::bare(Key::PrintScreen);
        let id = registry.register(&combo).expect("first owner registers");
        assert!(matches!(
            registry.register(&combo),
            Err(PlatformError::AlreadyRegistered(_))
        ));
        registry.unregister(id).expect("owner releases");
        assert!(matches!(
            registry.unregister(id),
            Err(PlatformError::NotRegistered(_))
        ));
    }
}
