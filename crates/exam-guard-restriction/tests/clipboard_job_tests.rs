//! Integration tests for the periodic clipboard job.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use exam_guard_platform::{SyntheticClipboard, SyntheticShortcutRegistry};
use exam_guard_restriction::{RestrictionConfig, RestrictionEnforcer};

#[test]
fn clipboard_job_tests_clears_periodically_and_stops_on_disable() {
    let clipboard = Arc::new(SyntheticClipboard::new());
    let mut enforcer = RestrictionEnforcer::new(
        Arc::new(SyntheticShortcutRegistry::new()),
        clipboard.clone(),
        RestrictionConfig::new(Duration::from_millis(5)),
    );

    enforcer.enable();
    sleep(Duration::from_millis(100));
    assert!(clipboard.clear_count() >= 2, "job should have run repeatedly");

    enforcer.disable();
    assert!(!enforcer.status().clipboard_blocked);
    let after_disable = clipboard.clear_count();
    sleep(Duration::from_millis(50));
    assert_eq!(clipboard.clear_count(), after_disable);
}

#[test]
fn clipboard_job_tests_fired_capture_shortcut_clears_again() {
    let registry = Arc::new(SyntheticShortcutRegistry::new());
    let clipboard = Arc::new(SyntheticClipboard::new());
    let mut enforcer = RestrictionEnforcer::new(
        registry.clone(),
        clipboard.clone(),
        RestrictionConfig::new(Duration::from_secs(60)),
    );
    enforcer.enable();

    clipboard.set_contents("copied during exam");
    let combo = enforcer.blocked_shortcuts()[0];
    let id = registry.id_for(&combo).expect("combo should be registered");
    assert_eq!(enforcer.on_shortcut_fired(id), Some(combo));
    assert_eq!(clipboard.contents(), None);
}

#[test]
fn clipboard_job_tests_drop_releases_shortcuts() {
    let registry = Arc::new(SyntheticShortcutRegistry::new());
    {
        let mut enforcer = RestrictionEnforcer::new(
            registry.clone(),
            Arc::new(SyntheticClipboard::new()),
            RestrictionConfig::default(),
        );
        enforcer.enable();
        assert!(!registry.active_combos().is_empty());
    }
    assert!(registry.active_combos().is_empty());
}
