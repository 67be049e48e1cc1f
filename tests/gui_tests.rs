mod common;

use common::*;
use egui_kittest::Harness;
use egui_kittest::kittest::Queryable;
use pcb_inspect::app::{Panel, StatusKind};
use pcb_inspect::labels::DefectKind;

fn harness(app: InspectionApp) -> Harness<'static, InspectionApp> {
    Harness::new_state(|ctx, app: &mut InspectionApp| app.ui(ctx), app)
}

fn status_text(harness: &Harness<'_, InspectionApp>) -> String {
    harness
        .state()
        .status_message
        .as_ref()
        .map(|s| s.text.clone())
        .unwrap_or_default()
}

#[test]
fn test_controls_render() {
    let mut harness = harness(app_with(ScriptedDetector::new(board_detections())));
    harness.run();

    harness.get_by_label("Defects");
    harness.get_by_label("Threshold");
    harness.get_by_label("0.5");
    harness.get_by_label("Change Score");
    harness.get_by_label("Add Image");
    harness.get_by_label("Run Detection");
    harness.get_by_label("No image loaded");
    for kind in DefectKind::ALL {
        harness.get_by_label(kind.display_name());
    }
}

#[test]
fn test_run_without_image_asks_for_one() {
    let mut harness = harness(app_with(ScriptedDetector::new(board_detections())));
    harness.run();

    harness.get_by_label("Run Detection").click();
    harness.run();

    assert!(!harness.state().is_detecting());
    assert_eq!(status_text(&harness), "Add an image first");
    harness.get_by_label("Add an image first");
}

#[test]
fn test_invalid_threshold_is_rejected() {
    let mut harness = harness(app_with(ScriptedDetector::new(board_detections())));
    harness.run();

    harness.state_mut().score_input = "high".to_string();
    harness.get_by_label("Change Score").click();
    harness.run();

    assert_eq!(harness.state().score_threshold, 0.5);
    let status = harness.state().status_message.clone().unwrap();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.text.starts_with("Invalid threshold"));

    harness.state_mut().score_input = "1.5".to_string();
    harness.get_by_label("Change Score").click();
    harness.run();
    assert_eq!(harness.state().score_threshold, 0.5);
}

#[test]
fn test_valid_threshold_is_applied_and_shown() {
    let mut harness = harness(app_with(ScriptedDetector::new(board_detections())));
    harness.run();

    harness.state_mut().score_input = "0.75".to_string();
    harness.get_by_label("Change Score").click();
    harness.run();

    assert_eq!(harness.state().score_threshold, 0.75);
    assert_eq!(status_text(&harness), "Threshold set to 0.75");
}

#[test]
fn test_detection_updates_counts_and_preview() {
    let image = create_test_image();
    let mut harness = harness(app_with(ScriptedDetector::new(board_detections())));
    harness.state_mut().load_image(image.path()).unwrap();
    harness.run();

    harness.get_by_label("Run Detection").click();
    harness.step();
    assert!(harness.state().is_detecting());

    harness.state_mut().poll_detection(true);
    harness.run();

    let app = harness.state();
    assert!(!app.is_detecting());
    assert!(app.predicted.is_some());
    assert_eq!(app.counts.get(DefectKind::ShortCircuit), 2);
    assert_eq!(app.counts.get(DefectKind::Spur), 1);
    assert_eq!(app.counts.total(), 3);
    assert_eq!(status_text(&harness), "Found 3 defects (3 boxes)");
}

#[test]
fn test_threshold_filters_detections() {
    let image = create_test_image();
    let mut app = app_with(ScriptedDetector::new(board_detections()));
    app.load_image(image.path()).unwrap();
    app.score_input = "0.7".to_string();
    app.change_score();

    app.run_detection();
    app.poll_detection(true);

    assert_eq!(app.counts.get(DefectKind::ShortCircuit), 2);
    assert_eq!(app.counts.get(DefectKind::Spur), 0);
}

#[test]
fn test_no_defects_message() {
    let image = create_test_image();
    let mut app = app_with(ScriptedDetector::new(Vec::new()));
    app.load_image(image.path()).unwrap();

    app.run_detection();
    app.poll_detection(true);

    assert_eq!(app.counts.total(), 0);
    assert!(app.predicted.is_some());
    assert_eq!(
        app.status_message.as_ref().map(|s| s.text.as_str()),
        Some("No defects detected")
    );
}

#[test]
fn test_new_image_resets_counts_and_prediction() {
    let first = create_test_image();
    let second = create_test_image();
    let mut app = app_with(ScriptedDetector::new(board_detections()));
    app.load_image(first.path()).unwrap();
    app.run_detection();
    app.poll_detection(true);
    assert_eq!(app.counts.total(), 3);

    app.load_image(second.path()).unwrap();
    assert_eq!(app.counts.total(), 0);
    assert!(app.predicted.is_none());
    assert_eq!(app.current_image_path.as_deref(), Some(second.path()));
}

#[test]
fn test_result_for_replaced_image_is_discarded() {
    let first = create_test_image();
    let second = create_test_image();
    let mut app = app_with(ScriptedDetector::new(board_detections()));
    app.load_image(first.path()).unwrap();

    app.run_detection();
    app.load_image(second.path()).unwrap();
    app.poll_detection(true);

    assert!(!app.is_detecting());
    assert!(app.predicted.is_none());
    assert_eq!(app.counts.total(), 0);
}

#[test]
fn test_unreadable_image_keeps_previous_state() {
    let image = create_test_image();
    let mut app = app_with(ScriptedDetector::new(board_detections()));
    app.load_image(image.path()).unwrap();

    let bogus = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    std::fs::write(bogus.path(), b"not an image").unwrap();
    let err = app.load_image(bogus.path()).unwrap_err();

    assert!(err.is_file_error());
    assert_eq!(app.current_image_path.as_deref(), Some(image.path()));
    assert_eq!(
        app.status_message.as_ref().map(|s| s.kind),
        Some(StatusKind::Error)
    );
}

#[test]
fn test_missing_model_is_reported_on_run() {
    let image = create_test_image();
    let mut harness = harness(InspectionApp::new(
        test_config(),
        Err(DetectError::ModelMissing("/nonexistent/best.onnx".into())),
    ));
    harness.run();
    harness.get_by_label("Model unavailable");

    harness.state_mut().load_image(image.path()).unwrap();
    harness.get_by_label("Run Detection").click();
    harness.run();

    let app = harness.state();
    assert!(!app.is_detecting());
    let status = app.status_message.clone().unwrap();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.text.starts_with("Model not loaded"));
}

#[test]
fn test_detection_failure_is_reported() {
    let image = create_test_image();
    let mut app = app_with(ScriptedDetector::failing());
    app.load_image(image.path()).unwrap();

    app.run_detection();
    app.poll_detection(true);

    let status = app.status_message.clone().unwrap();
    assert_eq!(status.kind, StatusKind::Error);
    assert!(status.text.starts_with("Detection failed"));
    assert!(app.predicted.is_none());
}

#[test]
fn test_detection_recovers_after_a_panicked_run() {
    let image = create_test_image();
    let mut app = app_with(ScriptedDetector::panicking_once(board_detections()));
    app.load_image(image.path()).unwrap();

    app.run_detection();
    app.poll_detection(true);
    assert!(!app.is_detecting());
    assert_eq!(
        app.status_message.as_ref().map(|s| s.kind),
        Some(StatusKind::Error)
    );

    app.run_detection();
    app.poll_detection(true);
    assert_eq!(app.counts.total(), 3);
    assert_eq!(
        app.status_message.as_ref().map(|s| s.text.as_str()),
        Some("Found 3 defects (3 boxes)")
    );
}

#[test]
fn test_viewer_needs_an_image() {
    let mut app = app_with(ScriptedDetector::new(board_detections()));
    app.open_viewer(Panel::Original);
    app.open_viewer(Panel::Predicted);
    assert!(app.viewers().is_empty());
}

#[test]
fn test_each_click_opens_a_new_viewer() {
    let image = create_test_image();
    let mut harness = harness(app_with(ScriptedDetector::new(board_detections())));
    harness.state_mut().load_image(image.path()).unwrap();
    harness.state_mut().open_viewer(Panel::Original);
    harness.state_mut().open_viewer(Panel::Original);
    harness.step();

    let viewers = harness.state().viewers();
    assert_eq!(viewers.len(), 2);
    assert!(viewers.iter().all(|v| v.title() == "Original Image"));
    assert!(viewers.iter().all(|v| v.is_open()));
    assert!(viewers.iter().all(|v| v.zoom_pan().zoom() == 1.0));
}
