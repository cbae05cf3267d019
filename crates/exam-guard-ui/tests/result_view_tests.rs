//! Integration tests for result and guidance projection.

use exam_guard_core::SubmissionResult;
use exam_guard_gate::{BlockReason, GateDecision};
use exam_guard_ui::{DEFAULT_PASS_PERCENTAGE, ResultView, gate_guidance};

fn result(score: u32, total: u32) -> SubmissionResult {
    SubmissionResult {
        score,
        total,
        status: None,
    }
}

#[test]
fn result_view_tests_default_threshold_is_half() {
    assert_eq!(DEFAULT_PASS_PERCENTAGE, 50);
    assert!(ResultView::new(&result(5, 10), None, 0).passed);
    assert!(!ResultView::new(&result(4, 10), None, 0).passed);
}

#[test]
fn result_view_tests_declared_threshold_overrides_default() {
    let view = ResultView::new(&result(7, 10), Some(80), 3);
    assert_eq!(view.percentage, 70);
    assert!(!view.passed);
    assert_eq!(view.summary(), "7/10 (70%) - Not passed - 3 anomalies");
}

#[test]
fn result_view_tests_empty_exam_result_never_passes() {
    let view = ResultView::new(&result(0, 0), Some(0), 0);
    assert_eq!(view.percentage, 0);
    assert!(!view.passed);
}

#[test]
fn result_view_tests_guidance_prefers_server_message() {
    let server = GateDecision::Blocked(BlockReason::ServerRequiresControlledBrowser(
        "Open this exam in Safe Exam Browser".to_string(),
    ));
    assert_eq!(gate_guidance(&server), "Open this exam in Safe Exam Browser");

    let generic = GateDecision::Blocked(BlockReason::ServerRequiresControlledBrowser(String::new()));
    assert!(gate_guidance(&generic).contains("requires the controlled browser"));
    assert!(gate_guidance(&GateDecision::MustDownloadConfig).contains("Download the configuration"));
}
