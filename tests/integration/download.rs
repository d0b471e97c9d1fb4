use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use dwl_client::{ControlFlags, DownloadController, FileSinkFactory};
use dwl_core::config::DwlConfig;
use dwl_core::credentials::FileCredentialStore;
use dwl_core::event::{Event, EventSink, NoopEventSink};
use dwl_core::wire::{UpdateResult, UpdateType};
use dwl_core::workspace::WorkspaceStore;

use crate::infra::unique_tmp;
use crate::origin::{build_signed_package, MockOrigin};

fn test_config(workspace_path: std::path::PathBuf, key_path: std::path::PathBuf) -> DwlConfig {
    let mut config = DwlConfig::default();
    config.workspace.path = workspace_path;
    config.keys.firmware_public_key_path = Some(key_path);
    config
}

fn new_controller(
    config: &DwlConfig,
    credentials: &Arc<FileCredentialStore>,
    package_path: &std::path::Path,
    flags: &ControlFlags,
) -> DownloadController {
    new_controller_with_sink(config, credentials, package_path, flags, Arc::new(NoopEventSink))
}

fn new_controller_with_sink(
    config: &DwlConfig,
    credentials: &Arc<FileCredentialStore>,
    package_path: &std::path::Path,
    flags: &ControlFlags,
    event_sink: Arc<dyn EventSink>,
) -> DownloadController {
    DownloadController::new(
        config.clone(),
        credentials.clone(),
        Arc::new(FileSinkFactory { path: package_path.to_path_buf() }),
        event_sink,
        flags.clone(),
    )
}

/// Records every event handed to it, for asserting on the exact sequence
/// a run produced.
#[derive(Default)]
struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl EventSink for RecordingEventSink {
    fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn full_download_verifies_and_writes_binary() {
    let binary = b"firmware-image-bytes-exceeding-a-single-read-chunk-".repeat(400);
    let package = build_signed_package(&binary);
    let origin = MockOrigin::spawn(package.bytes.clone(), true, None);

    let workspace_path = unique_tmp("happy-ws");
    let key_path = unique_tmp("happy-key");
    let package_path = unique_tmp("happy-pkg");
    std::fs::write(&key_path, &package.public_key_der).unwrap();

    let config = test_config(workspace_path.clone(), key_path.clone());
    let credentials = Arc::new(FileCredentialStore::new(config.keys.clone()));
    let flags = ControlFlags::new();

    let sink = Arc::new(RecordingEventSink::default());
    let mut controller =
        new_controller_with_sink(&config, &credentials, &package_path, &flags, sink.clone());
    let uri = format!("http://127.0.0.1:{}/pkg.dwl", origin.port);
    controller.initiate(&uri, UpdateType::Firmware).unwrap();

    let event = controller.run().await;
    assert!(matches!(event, Event::DownloadFinished), "unexpected event: {event:?}");

    let written = std::fs::read(&package_path).unwrap();
    assert_eq!(written, package.binary);
    assert!(WorkspaceStore::new(&workspace_path).load().is_none(), "workspace should be cleared on success");

    let events = sink.events.lock().unwrap();
    assert!(
        events.iter().any(|e| matches!(e, Event::HttpStatus { status: 200 })),
        "expected an HttpStatus{{200}} event somewhere in the run: {events:?}"
    );
    let last_progress = events.iter().rev().find_map(|e| match e {
        Event::DownloadProgress { percent } => Some(*percent),
        _ => None,
    });
    assert_eq!(last_progress, Some(100), "last progress before DownloadFinished must be 100");

    let _ = std::fs::remove_file(&key_path);
    let _ = std::fs::remove_file(&package_path);
}

#[tokio::test]
async fn tampered_signature_is_rejected_as_integrity_failure() {
    let binary = b"short-firmware-payload".to_vec();
    let mut package = build_signed_package(&binary);
    // Flip a byte inside the signature trailer so verification fails but
    // the envelope itself still parses and CRC-checks cleanly.
    let last = package.bytes.len() - 1;
    package.bytes[last] ^= 0xff;
    let origin = MockOrigin::spawn(package.bytes.clone(), true, None);

    let workspace_path = unique_tmp("bad-sig-ws");
    let key_path = unique_tmp("bad-sig-key");
    let package_path = unique_tmp("bad-sig-pkg");
    std::fs::write(&key_path, &package.public_key_der).unwrap();

    let config = test_config(workspace_path.clone(), key_path.clone());
    let credentials = Arc::new(FileCredentialStore::new(config.keys.clone()));
    let flags = ControlFlags::new();

    let mut controller = new_controller(&config, &credentials, &package_path, &flags);
    let uri = format!("http://127.0.0.1:{}/pkg.dwl", origin.port);
    controller.initiate(&uri, UpdateType::Firmware).unwrap();

    let event = controller.run().await;
    assert!(
        matches!(event, Event::DownloadFailed { reason: UpdateResult::IntegrityFailure }),
        "unexpected event: {event:?}"
    );

    let _ = std::fs::remove_file(&key_path);
    let _ = std::fs::remove_file(&package_path);
}

#[tokio::test]
async fn suspend_then_resume_completes_from_saved_offset() {
    let binary = b"resumable-firmware-chunk-".repeat(800);
    let package = build_signed_package(&binary);
    // Split the body roughly in half and pause, giving the test time to
    // flip the suspend flag mid-transfer.
    let split_at = package.bytes.len() / 2;
    let origin = MockOrigin::spawn(package.bytes.clone(), true, Some(split_at));

    let workspace_path = unique_tmp("resume-ws");
    let key_path = unique_tmp("resume-key");
    let package_path = unique_tmp("resume-pkg");
    std::fs::write(&key_path, &package.public_key_der).unwrap();

    let config = test_config(workspace_path.clone(), key_path.clone());
    let credentials = Arc::new(FileCredentialStore::new(config.keys.clone()));
    let flags = ControlFlags::new();

    let mut first = new_controller(&config, &credentials, &package_path, &flags);
    let uri = format!("http://127.0.0.1:{}/pkg.dwl", origin.port);
    first.initiate(&uri, UpdateType::Firmware).unwrap();

    let suspend_flags = flags.clone();
    let run_handle = tokio::spawn(async move { first.run().await });

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    suspend_flags.suspend.store(true, Ordering::SeqCst);

    let event = run_handle.await.unwrap();
    assert!(matches!(event, Event::SessionFinished), "unexpected event: {event:?}");

    let suspended = WorkspaceStore::new(&workspace_path)
        .load()
        .expect("workspace must survive a suspend");
    assert!(suspended.offset > 0, "suspend should have persisted partial progress");
    assert!(
        suspended.offset < package.bytes.len() as u64,
        "suspend before the transfer actually completed"
    );

    flags.suspend.store(false, Ordering::SeqCst);
    flags.abort.store(false, Ordering::SeqCst);
    let mut second = new_controller(&config, &credentials, &package_path, &flags);
    let final_event = second.run().await;
    assert!(matches!(final_event, Event::DownloadFinished), "unexpected event: {final_event:?}");

    let written = std::fs::read(&package_path).unwrap();
    assert_eq!(written, package.binary);

    let _ = std::fs::remove_file(&key_path);
    let _ = std::fs::remove_file(&package_path);
}

#[tokio::test]
async fn abort_clears_workspace_and_folds_facade_to_default() {
    let binary = b"abort-me".to_vec();
    let package = build_signed_package(&binary);
    let origin = MockOrigin::spawn(package.bytes.clone(), true, None);

    let workspace_path = unique_tmp("abort-ws");
    let key_path = unique_tmp("abort-key");
    let package_path = unique_tmp("abort-pkg");
    std::fs::write(&key_path, &package.public_key_der).unwrap();

    let config = test_config(workspace_path.clone(), key_path.clone());
    let credentials = Arc::new(FileCredentialStore::new(config.keys.clone()));
    let flags = ControlFlags::new();

    let mut controller = new_controller(&config, &credentials, &package_path, &flags);
    let uri = format!("http://127.0.0.1:{}/pkg.dwl", origin.port);
    controller.initiate(&uri, UpdateType::Firmware).unwrap();

    flags.abort.store(true, Ordering::SeqCst);
    let event = controller.run().await;
    assert!(
        matches!(event, Event::DownloadFailed { reason: UpdateResult::Default }),
        "unexpected event: {event:?}"
    );
    assert!(WorkspaceStore::new(&workspace_path).load().is_none());

    let _ = std::fs::remove_file(&key_path);
    let _ = std::fs::remove_file(&package_path);
}

#[tokio::test]
async fn range_not_honoured_realigns_from_zero() {
    let binary = b"realign-payload-bytes".to_vec();
    let package = build_signed_package(&binary);
    // honour_range=false: the origin always answers with a plain 200
    // carrying the whole body, ignoring any Range header.
    let origin = MockOrigin::spawn(package.bytes.clone(), false, None);

    let workspace_path = unique_tmp("realign-ws");
    let key_path = unique_tmp("realign-key");
    let package_path = unique_tmp("realign-pkg");
    std::fs::write(&key_path, &package.public_key_der).unwrap();

    let config = test_config(workspace_path.clone(), key_path.clone());
    let credentials = Arc::new(FileCredentialStore::new(config.keys.clone()));
    let flags = ControlFlags::new();

    // Pre-seed a workspace as though a prior attempt had already consumed
    // some bytes, so the first GET in this run carries a non-zero Range.
    let store = WorkspaceStore::new(&workspace_path);
    let mut seeded = dwl_core::workspace::Workspace::new(
        format!("http://127.0.0.1:{}/pkg.dwl", origin.port),
        UpdateType::Firmware,
    );
    seeded.package_size = package.bytes.len() as u64;
    seeded.offset = 10;
    store.save(&seeded).unwrap();

    let mut controller = new_controller(&config, &credentials, &package_path, &flags);
    let event = controller.run().await;
    assert!(matches!(event, Event::DownloadFinished), "unexpected event: {event:?}");

    let written = std::fs::read(&package_path).unwrap();
    assert_eq!(written, package.binary);

    let _ = std::fs::remove_file(&key_path);
    let _ = std::fs::remove_file(&package_path);
}

#[tokio::test]
async fn origin_404_surfaces_last_http_status_and_invalid_uri() {
    let port = crate::infra::spawn_404_origin();

    let workspace_path = unique_tmp("404-ws");
    let key_path = unique_tmp("404-key");
    let package_path = unique_tmp("404-pkg");
    std::fs::write(&key_path, [0u8; 32]).unwrap();

    let config = test_config(workspace_path, key_path.clone());
    let credentials = Arc::new(FileCredentialStore::new(config.keys.clone()));
    let flags = ControlFlags::new();

    let sink = Arc::new(RecordingEventSink::default());
    let mut controller =
        new_controller_with_sink(&config, &credentials, &package_path, &flags, sink.clone());
    let uri = format!("http://127.0.0.1:{port}/pkg.dwl");
    controller.initiate(&uri, UpdateType::Firmware).unwrap();

    let event = controller.run().await;
    assert!(
        matches!(event, Event::DownloadFailed { reason: UpdateResult::InvalidUri }),
        "unexpected event: {event:?}"
    );

    let events = sink.events.lock().unwrap();
    assert!(
        events.iter().any(|e| matches!(e, Event::HttpStatus { status: 404 })),
        "expected an HttpStatus{{404}} event: {events:?}"
    );

    let _ = std::fs::remove_file(&key_path);
}
