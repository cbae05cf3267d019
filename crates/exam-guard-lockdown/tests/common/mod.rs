//! Shared fixtures for lockdown integration tests.

use std::sync::Arc;
use std::time::Duration;

use exam_guard_lockdown::{BridgeConfig, DesktopBridge, LockdownController, hash_quit_password};
use exam_guard_platform::{SyntheticClipboard, SyntheticShortcutRegistry, SyntheticWindow};
use exam_guard_restriction::{RestrictionConfig, RestrictionEnforcer};

/// Synthetic OS collaborators shared by one bridge.
#[allow(dead_code)]
pub struct Fixture {
    pub registry: Arc<SyntheticShortcutRegistry>,
    pub clipboard: Arc<SyntheticClipboard>,
    pub window: Arc<SyntheticWindow>,
}

/// Creates a fresh set of synthetic collaborators.
#[allow(dead_code)]
pub fn fixture() -> Fixture {
    Fixture {
        registry: Arc::new(SyntheticShortcutRegistry::new()),
        clipboard: Arc::new(SyntheticClipboard::new()),
        window: Arc::new(SyntheticWindow::new()),
    }
}

/// Builds a bridge over the fixture with quit password `proctor-42`.
#[allow(dead_code)]
pub fn bridge(fixture: &Fixture) -> DesktopBridge {
    let lockdown = LockdownController::new(fixture.registry.clone(), fixture.window.clone());
    let restriction = RestrictionEnforcer::new(
        fixture.registry.clone(),
        fixture.clipboard.clone(),
        RestrictionConfig::new(Duration::from_secs(60)),
    );
    DesktopBridge::new(
        BridgeConfig {
            platform: "win".to_string(),
            app_version: "0.1.0".to_string(),
            quit_password_sha256: Some(hash_quit_password("proctor-42")),
        },
        lockdown,
        restriction,
    )
}
