//! End-to-end tests over the real native and polling backends.

use filewatch::{
    AckPayload, EntryKind, EventSignal, FileSystemAction, FileSystemPayload, HostSignal, Hub,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct NullSignal;

impl HostSignal for NullSignal {
    fn raise(&self) {}
}

#[derive(Clone, Default)]
struct Recorder {
    acks: Arc<Mutex<Vec<AckPayload>>>,
    events: Arc<Mutex<Vec<FileSystemPayload>>>,
}

impl Recorder {
    fn ack_callback(&self) -> filewatch::AckCallback {
        let acks = Arc::clone(&self.acks);
        Box::new(move |ack| acks.lock().unwrap().push(ack))
    }

    fn event_callback(&self) -> filewatch::EventCallback {
        let events = Arc::clone(&self.events);
        Box::new(move |batch| events.lock().unwrap().extend_from_slice(batch))
    }

    fn acks(&self) -> Vec<AckPayload> {
        self.acks.lock().unwrap().clone()
    }

    fn events(&self) -> Vec<FileSystemPayload> {
        self.events.lock().unwrap().clone()
    }
}

fn pump_until(hub: &mut Hub, mut done: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() && Instant::now() < deadline {
        hub.handle_events();
        std::thread::sleep(Duration::from_millis(10));
    }
    hub.handle_events();
    assert!(done(), "timed out waiting for {what}");
}

fn fast_polling_hub(recorder: &Recorder) -> Hub {
    let mut hub = Hub::new(Arc::new(NullSignal)).expect("hub should start");
    hub.set_polling_interval(25, recorder.ack_callback())
        .unwrap();
    hub
}

#[test]
fn test_polling_watch_reports_create_modify_delete() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let mut hub = fast_polling_hub(&recorder);

    let channel_id = hub
        .watch(
            dir.path(),
            true,
            recorder.ack_callback(),
            recorder.event_callback(),
        )
        .unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 2, "interval + ADD acks");
    assert!(recorder.acks().iter().all(|ack| ack.success));

    let file = dir.path().canonicalize().unwrap().join("x");
    std::fs::write(&file, b"v1").unwrap();
    pump_until(&mut hub, || !recorder.events().is_empty(), "the create event");
    let created = &recorder.events()[0];
    assert_eq!(created.action, FileSystemAction::Created);
    assert_eq!(created.entry_kind, EntryKind::File);
    assert_eq!(created.path, file);
    assert_eq!(created.channel_id, channel_id);

    std::fs::write(&file, b"a longer second version").unwrap();
    pump_until(
        &mut hub,
        || {
            recorder
                .events()
                .iter()
                .any(|e| e.action == FileSystemAction::Modified && e.path == file)
        },
        "the modify event",
    );

    std::fs::remove_file(&file).unwrap();
    pump_until(
        &mut hub,
        || {
            recorder
                .events()
                .iter()
                .any(|e| e.action == FileSystemAction::Deleted && e.path == file)
        },
        "the delete event",
    );
}

#[test]
fn test_native_watch_reports_create() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let mut hub = Hub::new(Arc::new(NullSignal)).expect("hub should start");

    let channel_id = hub
        .watch(
            dir.path(),
            false,
            recorder.ack_callback(),
            recorder.event_callback(),
        )
        .unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 1, "the ADD ack");
    assert!(recorder.acks()[0].success);

    let file = dir.path().canonicalize().unwrap().join("x");
    std::fs::write(&file, b"hello").unwrap();

    pump_until(
        &mut hub,
        || {
            recorder
                .events()
                .iter()
                .any(|e| e.action == FileSystemAction::Created && e.path == file)
        },
        "the native create event",
    );
    let created = recorder
        .events()
        .into_iter()
        .find(|e| e.action == FileSystemAction::Created)
        .unwrap();
    assert_eq!(created.channel_id, channel_id);
    assert_eq!(created.entry_kind, EntryKind::File);

    // Only the original ADD ack, nothing extra.
    assert_eq!(recorder.acks().len(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn test_native_watch_reports_rename_pair_as_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let old = root.join("x");
    std::fs::write(&old, b"content").unwrap();

    let recorder = Recorder::default();
    let mut hub = Hub::new(Arc::new(NullSignal)).expect("hub should start");
    hub.watch(
        dir.path(),
        false,
        recorder.ack_callback(),
        recorder.event_callback(),
    )
    .unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 1, "the ADD ack");

    let new = root.join("y");
    std::fs::rename(&old, &new).unwrap();

    pump_until(
        &mut hub,
        || {
            recorder
                .events()
                .iter()
                .any(|e| e.action == FileSystemAction::Renamed)
        },
        "the rename event",
    );
    let renamed = recorder
        .events()
        .into_iter()
        .find(|e| e.action == FileSystemAction::Renamed)
        .unwrap();
    assert_eq!(renamed.old_path, Some(old));
    assert_eq!(renamed.path, new);
    assert_eq!(renamed.entry_kind, EntryKind::File);
}

#[test]
fn test_unwatch_acks_then_stops_events() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let mut hub = fast_polling_hub(&recorder);

    let channel_id = hub
        .watch(
            dir.path(),
            true,
            recorder.ack_callback(),
            recorder.event_callback(),
        )
        .unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 2, "interval + ADD acks");

    hub.unwatch(channel_id, recorder.ack_callback()).unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 3, "the REMOVE ack");
    assert!(recorder.acks()[2].success);

    // Changes after the REMOVE ack reach no sink.
    std::fs::write(dir.path().join("after"), b"x").unwrap();
    let settle = Instant::now() + Duration::from_millis(300);
    while Instant::now() < settle {
        hub.handle_events();
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(recorder.events().is_empty());
}

#[test]
fn test_throttled_polling_delivers_everything() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let mut hub = fast_polling_hub(&recorder);
    hub.set_polling_throttle(2, recorder.ack_callback()).unwrap();

    hub.watch(
        dir.path(),
        true,
        recorder.ack_callback(),
        recorder.event_callback(),
    )
    .unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 3, "tunable + ADD acks");

    for i in 0..5 {
        std::fs::write(dir.path().join(format!("f{i}")), b"x").unwrap();
    }

    // Two events per tick at most, but every creation arrives.
    pump_until(
        &mut hub,
        || {
            recorder
                .events()
                .iter()
                .filter(|e| e.action == FileSystemAction::Created)
                .count()
                == 5
        },
        "all five creations",
    );
}

#[test]
fn test_worker_log_file_reconfiguration_acks() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("worker.log");
    let recorder = Recorder::default();
    let mut hub = Hub::new(Arc::new(NullSignal)).expect("hub should start");

    hub.use_worker_log_file(&log_path, recorder.ack_callback())
        .unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 1, "the log ack");
    assert!(recorder.acks()[0].success);
    assert!(log_path.exists());

    // A log path in a missing directory is a failure ack, and the thread
    // keeps serving commands afterwards.
    hub.use_worker_log_file(dir.path().join("no/such/dir/w.log"), recorder.ack_callback())
        .unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 2, "the failure ack");
    assert!(!recorder.acks()[1].success);

    hub.disable_worker_log(recorder.ack_callback()).unwrap();
    pump_until(&mut hub, || recorder.acks().len() == 3, "the disable ack");
    assert!(recorder.acks()[2].success);
}

#[test]
fn test_main_log_file_takes_effect_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("main.log");
    let mut hub = Hub::new(Arc::new(NullSignal)).expect("hub should start");

    hub.use_main_log_file(&log_path).unwrap();
    tracing::info!("host-side marker");
    hub.disable_main_log().unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("host-side marker"));
}

#[tokio::test]
async fn test_event_signal_drives_async_host() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let signal = EventSignal::new();
    let mut hub = Hub::new(Arc::new(signal.clone())).expect("hub should start");

    hub.watch(
        dir.path(),
        true,
        recorder.ack_callback(),
        recorder.event_callback(),
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while recorder.acks().is_empty() && Instant::now() < deadline {
        let _ = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
        hub.handle_events();
    }
    assert_eq!(recorder.acks().len(), 1, "the ADD ack arrived via the signal");

    let file = dir.path().canonicalize().unwrap().join("signalled");
    std::fs::write(&file, b"x").unwrap();
    while recorder.events().is_empty() && Instant::now() < deadline {
        let _ = tokio::time::timeout(Duration::from_millis(100), signal.wait()).await;
        hub.handle_events();
    }
    let events = recorder.events();
    assert!(
        events
            .iter()
            .any(|e| e.action == FileSystemAction::Created && e.path == file),
        "the creation surfaced through the async signal: {events:?}"
    );

    hub.shutdown();
}
