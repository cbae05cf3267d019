//! End-to-end anomaly counting across the submit latch.

mod common;

use std::sync::Arc;

use exam_guard_core::AnomalyKind;
use exam_guard_monitor::{
    AnomalyMonitor, AppState, LifecycleTransition, ManualClock, ManualLifecycleSource,
    transition_for_app_state,
};
use exam_guard_session::{AttemptSession, SubmitTrigger};

#[test]
fn anomaly_count_tests_backgrounding_twice_then_submit_sends_two() {
    let exam = common::exam(10, 2);
    let backend = common::backend_for(&exam);
    let source = ManualLifecycleSource::new();
    let mut monitor = AnomalyMonitor::new(Arc::new(ManualClock::new(0)));
    monitor.attach(&source).expect("subscribe");

    let mut session = AttemptSession::new(exam, backend.clone(), "token");
    session.begin("attempt-1", 0, monitor);

    let mut state = AppState::Active;
    for next in [
        AppState::Inactive,
        AppState::Background,
        AppState::Active,
        AppState::Background,
        AppState::Active,
    ] {
        if let Some(transition) = transition_for_app_state(state, next) {
            source.emit(transition);
        }
        state = next;
    }
    assert_eq!(session.anomaly_count(), 2);

    session.submit(SubmitTrigger::User);
    assert_eq!(backend.requests()[0].anomaly_count, 2);
    assert_eq!(source.listener_count(), 0);

    if let Some(transition) = transition_for_app_state(AppState::Active, AppState::Background) {
        source.emit(transition);
        session.observe(transition);
    }
    assert!(!session.record_anomaly(AnomalyKind::LockdownLost));
    assert_eq!(session.anomaly_count(), 2);
    assert_eq!(
        session.anomaly_snapshot().map(|snapshot| snapshot.events.len()),
        Some(2)
    );
    assert_eq!(backend.requests().len(), 1);
}

#[test]
fn anomaly_count_tests_dropping_session_before_submit_unsubscribes_monitor() {
    let exam = common::exam(10, 1);
    let backend = common::backend_for(&exam);
    let source = ManualLifecycleSource::new();
    let mut monitor = AnomalyMonitor::new(Arc::new(ManualClock::new(0)));
    monitor.attach(&source).expect("subscribe");

    let mut session = AttemptSession::new(exam, backend.clone(), "token");
    session.begin("attempt-1", 0, monitor);
    assert_eq!(source.listener_count(), 1);
    drop(session);

    assert_eq!(source.listener_count(), 0);
    assert!(backend.requests().is_empty());
}

#[test]
fn anomaly_count_tests_transitions_before_begin_are_not_counted() {
    let exam = common::exam(10, 1);
    let backend = common::backend_for(&exam);
    let source = ManualLifecycleSource::new();
    let mut monitor = AnomalyMonitor::disarmed(Arc::new(ManualClock::new(0)));
    monitor.attach(&source).expect("subscribe");

    source.emit(LifecycleTransition::Backgrounded);
    let mut session = AttemptSession::new(exam, backend.clone(), "token");
    assert!(session.begin("attempt-1", 0, monitor));
    assert_eq!(session.anomaly_count(), 0);

    source.emit(LifecycleTransition::WindowBlurred);
    session.submit(SubmitTrigger::User);
    assert_eq!(backend.requests()[0].anomaly_count, 1);
}
