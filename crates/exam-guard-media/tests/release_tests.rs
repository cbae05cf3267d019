//! Integration tests for single acquisition and exactly-once release.

use std::sync::Arc;

use exam_guard_media::{
    CompleteOutcome, ProctoringMediaSession, StartOutcome, SyntheticMediaDevices,
    SyntheticStream,
};

fn session() -> (ProctoringMediaSession, Arc<SyntheticMediaDevices>) {
    let devices = Arc::new(SyntheticMediaDevices::new());
    (ProctoringMediaSession::new(devices.clone()), devices)
}

#[test]
fn release_tests_concurrent_starts_issue_one_device_request() {
    let (mut session, devices) = session();
    let first = session.start();
    let second = session.start();

    let StartOutcome::Requested(ticket) = first else {
        panic!("first start should request, got {first:?}");
    };
    assert_eq!(second, StartOutcome::AlreadyPending(ticket));
    assert_eq!(devices.requests(), vec![ticket]);

    let (stream, _probe) = SyntheticStream::new(true, true);
    assert_eq!(session.complete(ticket, Ok(stream)), CompleteOutcome::Live);
    assert_eq!(session.start(), StartOutcome::AlreadyLive);
    assert_eq!(devices.requests().len(), 1);
}

#[test]
fn release_tests_stop_after_start_releases_all_tracks_once() {
    let (mut session, _devices) = session();
    let StartOutcome::Requested(ticket) = session.start() else {
        panic!("start should request");
    };
    let (stream, probe) = SyntheticStream::new(true, true);
    session.complete(ticket, Ok(stream));

    assert!(session.stop());
    assert!(!session.stop());
    drop(session);

    assert_eq!(probe.stop_calls(), 1);
    assert_eq!(probe.tracks_stopped(), 2);
}

#[test]
fn release_tests_stop_without_start_is_noop() {
    let (mut session, devices) = session();
    assert!(!session.stop());
    assert!(devices.requests().is_empty());
    assert!(!session.status().has_camera);
}

#[test]
fn release_tests_rapid_start_stop_start_releases_stale_grant() {
    let (mut session, devices) = session();
    let StartOutcome::Requested(first) = session.start() else {
        panic!("start should request");
    };
    assert!(!session.stop());
    let StartOutcome::Requested(second) = session.start() else {
        panic!("restart should request");
    };
    assert_ne!(first, second);
    assert_eq!(devices.requests().len(), 2);

    let (stale, stale_probe) = SyntheticStream::new(true, true);
    assert_eq!(session.complete(first, Ok(stale)), CompleteOutcome::Stale);
    assert_eq!(stale_probe.stop_calls(), 1);
    assert!(!session.is_live());

    let (fresh, fresh_probe) = SyntheticStream::new(true, false);
    assert_eq!(session.complete(second, Ok(fresh)), CompleteOutcome::Live);
    assert!(session.status().has_camera);
    assert!(!session.status().has_mic);

    drop(session);
    assert_eq!(fresh_probe.stop_calls(), 1);
    assert_eq!(stale_probe.stop_calls(), 1);
}

#[test]
fn release_tests_drop_releases_live_stream() {
    let (mut session, _devices) = session();
    let StartOutcome::Requested(ticket) = session.start() else {
        panic!("start should request");
    };
    let (stream, probe) = SyntheticStream::new(false, true);
    session.complete(ticket, Ok(stream));
    drop(session);
    assert_eq!(probe.stop_calls(), 1);
    assert_eq!(probe.tracks_stopped(), 1);
}
