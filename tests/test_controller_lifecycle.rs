//! Integration tests for the processor controller lifecycle
//!
//! These tests run the processor on its worker thread and verify the observable
//! state across start, stop, toggle, reset and fatal failures.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::mock_decoder::{Call, MockBackend, MockStreams, Script};
use common::mock_engine::RecordingEngineProvider;
use common::{code_frame, rgb_frame, rgb_info, wait_until};
use stream_scan::config::DEFAULT_LOCATOR;
use stream_scan::session::{ProcessorController, ProcessorEvent, Status};

const TIMEOUT: Duration = Duration::from_secs(5);

fn endless() -> Script {
    Script::new(rgb_info(4, 4)).endless(rgb_frame(4, 4))
}

fn controller(
    backend: &Arc<MockBackend>,
    engine: &RecordingEngineProvider,
) -> ProcessorController {
    ProcessorController::builder()
        .locator("rtsp://cam/live")
        .reconnect_delay(Duration::from_millis(10))
        .decoder_arc(backend.clone())
        .byte_streams(MockStreams::default())
        .engine_provider(engine.clone())
        .build()
        .expect("controller should build")
}

#[test]
fn test_start_stream_and_stop() {
    let backend = Arc::new(MockBackend::new([endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    assert_eq!(controller.status(), Status::Idle);
    assert!(controller.start().unwrap());
    assert!(controller.is_running());
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    assert!(wait_until(TIMEOUT, || engine.frames().len() >= 3));

    controller.stop().unwrap();

    assert!(!controller.is_running());
    assert_eq!(controller.status(), Status::Stopped);
    assert_eq!(backend.closes(), 1);
}

#[test]
fn test_start_while_running_is_noop() {
    let backend = Arc::new(MockBackend::new([endless(), endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    assert!(controller.start().unwrap());
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    assert!(!controller.start().unwrap());

    controller.stop().unwrap();
    assert_eq!(engine.created().len(), 1);
    assert_eq!(backend.opens(), 1);
}

#[test]
fn test_stop_is_idempotent() {
    let backend = Arc::new(MockBackend::new([endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));

    controller.stop().unwrap();
    controller.stop().unwrap();

    assert!(!controller.is_running());
    assert_eq!(controller.status(), Status::Stopped);
}

#[test]
fn test_stop_without_start_is_noop() {
    let backend = Arc::new(MockBackend::new([]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    controller.stop().unwrap();

    assert_eq!(controller.status(), Status::Idle);
    assert!(backend.calls().is_empty());
}

#[test]
fn test_stop_publishes_stopping_then_stopped() {
    let backend = Arc::new(MockBackend::new([endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);
    let events = controller.state().subscribe();

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    controller.stop().unwrap();

    let statuses: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            ProcessorEvent::Status(status) => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        [
            Status::Starting,
            Status::Streaming,
            Status::Stopping,
            Status::Stopped,
        ]
    );
}

#[test]
fn test_engine_failure_ends_run_with_terminal_status() {
    let backend = Arc::new(MockBackend::new([endless()]));
    let engine = RecordingEngineProvider::failing_on_frame(3);
    let controller = controller(&backend, &engine);
    let events = controller.state().subscribe();

    controller.start().unwrap();

    assert!(wait_until(TIMEOUT, || !controller.is_running()));
    assert_eq!(controller.status(), Status::Stopped);
    assert_eq!(backend.closes(), 1);
    let last_error = controller.state().last_error().unwrap();
    assert!(last_error.contains("engine rejected frame 3"), "{last_error}");
    assert!(
        events
            .try_iter()
            .any(|event| matches!(event, ProcessorEvent::Failed(_)))
    );

    // Stopping a run that already ended keeps the terminal status
    controller.stop().unwrap();
    assert_eq!(controller.status(), Status::Stopped);
}

#[test]
fn test_restart_after_failure() {
    let backend = Arc::new(MockBackend::new([
        Script::new(rgb_info(2, 2)).fail("corrupt packet"),
        endless(),
    ]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || !controller.is_running()));
    assert!(controller.state().last_error().is_some());

    assert!(controller.start().unwrap());
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    assert_eq!(controller.state().last_error(), None);
    controller.stop().unwrap();
    assert_eq!(engine.created().len(), 2);
}

#[test]
fn test_toggle() {
    let backend = Arc::new(MockBackend::new([endless(), endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    assert!(controller.toggle().unwrap());
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    assert!(!controller.toggle().unwrap());
    assert_eq!(controller.status(), Status::Stopped);
    assert!(!controller.is_running());
}

#[test]
fn test_recognized_code_is_observable() {
    let script = Script::new(rgb_info(2, 2))
        .frame(code_frame("https://example.org/item/42"))
        .endless(vec![0; 12]);
    let backend = Arc::new(MockBackend::new([script]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || controller.recognized_code().is_some()));
    assert_eq!(
        controller.recognized_code().as_deref(),
        Some("https://example.org/item/42")
    );
    controller.stop().unwrap();
}

#[test]
fn test_settings_apply_to_next_run_only() {
    let backend = Arc::new(MockBackend::new([endless(), endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    controller.set_locator("rtsp://other/live");
    controller.set_credential("license-key");
    assert_eq!(controller.config().locator, "rtsp://other/live");
    controller.stop().unwrap();

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    controller.stop().unwrap();

    let urls: Vec<_> = backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::OpenUrl(url) => Some(url),
            _ => None,
        })
        .collect();
    assert_eq!(urls, ["rtsp://cam/live", "rtsp://other/live"]);
    let created = engine.created();
    assert_eq!(created[0].credential, "");
    assert_eq!(created[1].credential, "license-key");
}

#[test]
fn test_reset_restores_defaults_without_touching_run() {
    let backend = Arc::new(MockBackend::new([endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    controller.set_locator("rtsp://other/live");
    controller.set_credential("license-key");
    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));

    controller.reset();

    assert_eq!(controller.config().locator, "rtsp://cam/live");
    assert_eq!(controller.config().credential, "");
    assert!(controller.is_running());
    assert_eq!(controller.status(), Status::Streaming);
    controller.stop().unwrap();
    assert_eq!(backend.calls()[0], Call::OpenUrl("rtsp://other/live".into()));
}

#[test]
fn test_request_stop_without_join() {
    let backend = Arc::new(MockBackend::new([endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || controller.status() == Status::Streaming));
    controller.request_stop();

    assert!(wait_until(TIMEOUT, || !controller.is_running()));
    assert_eq!(controller.status(), Status::Stopped);
    controller.stop().unwrap();
}

#[test]
fn test_drop_stops_worker() {
    let backend = Arc::new(MockBackend::new([endless()]));
    let engine = RecordingEngineProvider::new();
    let controller = controller(&backend, &engine);
    let state = controller.state();

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || state.status() == Status::Streaming));
    drop(controller);

    assert!(!state.is_running());
    assert_eq!(state.status(), Status::Stopped);
    assert_eq!(backend.closes(), 1);
}

#[test]
fn test_builder_requires_decoder() {
    let error = ProcessorController::builder()
        .engine_provider(RecordingEngineProvider::new())
        .build()
        .err()
        .expect("building without a decoder must fail");
    assert_eq!(error.category(), "config");
}

#[test]
fn test_builder_defaults() {
    let backend = Arc::new(MockBackend::new([]));
    let controller = ProcessorController::builder()
        .decoder_arc(backend)
        .byte_streams(MockStreams::default())
        .build()
        .unwrap();

    let config = controller.config();
    assert_eq!(config.locator, DEFAULT_LOCATOR);
    assert_eq!(config.session_clear_cycle, 4096);
    assert_eq!(config.duplicate_filter, Duration::from_millis(5000));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_byte_streams_build_inside_async_runtime() {
    let backend = Arc::new(MockBackend::new([]));
    let controller = ProcessorController::builder()
        .decoder_arc(backend)
        .engine_provider(RecordingEngineProvider::new())
        .build()
        .unwrap();

    assert_eq!(controller.status(), Status::Idle);
    drop(controller);
}
