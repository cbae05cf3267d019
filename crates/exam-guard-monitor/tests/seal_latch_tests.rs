//! Integration tests for the submit latch on the anomaly log.

use std::sync::Arc;

use exam_guard_core::{AnomalyKind, Severity};
use exam_guard_monitor::{
    AnomalyMonitor, AppState, LifecycleTransition, ManualClock, ManualLifecycleSource,
    transition_for_app_state,
};

fn monitor() -> (AnomalyMonitor, ManualLifecycleSource, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(10_000));
    let source = ManualLifecycleSource::new();
    let mut monitor = AnomalyMonitor::new(clock.clone());
    monitor.attach(&source).expect("manual source should subscribe");
    (monitor, source, clock)
}

#[test]
fn seal_latch_tests_two_backgrounds_then_seal_counts_two() {
    let (mut monitor, source, clock) = monitor();

    for _ in 0..2 {
        let leaving = transition_for_app_state(AppState::Active, AppState::Background)
            .expect("leaving active should qualify");
        source.emit(leaving);
        clock.advance(5_000);
        if let Some(back) = transition_for_app_state(AppState::Background, AppState::Active) {
            source.emit(back);
        }
    }

    let snapshot = monitor.seal();
    assert_eq!(snapshot.count, 2);
    assert_eq!(snapshot.events[0].timestamp_ms, 10_000);
    assert_eq!(snapshot.events[1].timestamp_ms, 15_000);
    assert!(snapshot.events.iter().all(|event| event.severity == Severity::Medium));

    source.emit(LifecycleTransition::Backgrounded);
    assert_eq!(monitor.count(), 2);
    assert_eq!(monitor.seal(), snapshot);
}

#[test]
fn seal_latch_tests_events_after_seal_are_dropped_and_counted_for_diagnostics() {
    let (mut monitor, _source, _clock) = monitor();
    assert!(monitor.observe(LifecycleTransition::CameraEnded));
    monitor.seal();

    assert!(!monitor.observe(LifecycleTransition::WindowBlurred));
    assert!(!monitor.record(AnomalyKind::LockdownLost));
    assert!(!monitor.observe(LifecycleTransition::TabVisible));

    assert_eq!(monitor.count(), 1);
    assert_eq!(monitor.events()[0].severity, Severity::High);
    assert_eq!(monitor.dropped_after_seal(), 2);
}

#[test]
fn seal_latch_tests_every_blur_and_hide_counts_separately() {
    let (mut monitor, source, _clock) = monitor();
    source.emit(LifecycleTransition::WindowBlurred);
    source.emit(LifecycleTransition::TabHidden);
    source.emit(LifecycleTransition::WindowFocused);
    source.emit(LifecycleTransition::WindowBlurred);
    assert_eq!(monitor.seal().count, 3);
}

#[test]
fn seal_latch_tests_disarmed_monitor_drops_until_armed() {
    let clock = Arc::new(ManualClock::new(0));
    let source = ManualLifecycleSource::new();
    let mut monitor = AnomalyMonitor::disarmed(clock);
    monitor.attach(&source).expect("manual source should subscribe");
    assert!(!monitor.is_armed());

    source.emit(LifecycleTransition::Backgrounded);
    assert!(!monitor.record(AnomalyKind::LockdownLost));
    assert_eq!(monitor.count(), 0);
    assert_eq!(monitor.dropped_before_arm(), 2);

    monitor.arm();
    source.emit(LifecycleTransition::WindowBlurred);
    assert_eq!(monitor.count(), 1);

    monitor.seal();
    monitor.arm();
    source.emit(LifecycleTransition::WindowBlurred);
    assert_eq!(monitor.count(), 1);
    assert_eq!(monitor.dropped_before_arm(), 2);
}
