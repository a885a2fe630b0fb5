//! Tests for the fill worker and its control messages
//!
//! These tests verify:
//! - Start → progress → done over the event channel
//! - Sequential start commands top up instead of duplicating
//! - Cancellation stops only the running fill
//! - Version changes from another opener surface as a notice
//! - Degraded mode when persistent storage is unavailable
//! - Event JSON shape

use std::fs;

use stringdb::batch::BatchPolicy;
use stringdb::config::Config;
use stringdb::{
    ControlMessage, RecordStore, StartCommand, Worker, WorkerEvent, WorkerHandle,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .string_length(12)
        .batch_policy(BatchPolicy::FixedSize { size: 50 })
        .build()
}

fn spawn(config: Config) -> WorkerHandle {
    Worker::spawn(config).unwrap()
}

fn progress_count(events: &[WorkerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, WorkerEvent::Progress(_)))
        .count()
}

// =============================================================================
// Worker Tests
// =============================================================================

#[test]
fn test_start_reports_progress_then_done() {
    let temp = TempDir::new().unwrap();
    let handle = spawn(test_config(&temp));

    handle.start(230).unwrap();
    let events = handle.wait_for_outcome().unwrap();

    assert_eq!(progress_count(&events), 5);
    match events.last().unwrap() {
        WorkerEvent::Done(report) => {
            assert_eq!(report.target, 230);
            assert_eq!(report.inserted, 230);
            assert_eq!(report.final_count, 230);
        }
        other => panic!("expected Done, got {:?}", other),
    }
    handle.shutdown().unwrap();
}

#[test]
fn test_sequential_starts_top_up() {
    let temp = TempDir::new().unwrap();
    let handle = spawn(test_config(&temp));

    handle.start(100).unwrap();
    handle.wait_for_outcome().unwrap();
    handle
        .send(StartCommand::parse(r#"{"stringArraySize": 160}"#).unwrap())
        .unwrap();
    let events = handle.wait_for_outcome().unwrap();

    match events.last().unwrap() {
        WorkerEvent::Done(report) => {
            assert_eq!(report.initial_count, 100);
            assert_eq!(report.inserted, 60);
        }
        other => panic!("expected Done, got {:?}", other),
    }
    handle.shutdown().unwrap();

    let store = RecordStore::open(test_config(&temp)).unwrap();
    assert_eq!(store.count().unwrap(), 160);
}

#[test]
fn test_start_below_count_is_done_without_progress() {
    let temp = TempDir::new().unwrap();
    let handle = spawn(test_config(&temp));
    handle.start(80).unwrap();
    handle.wait_for_outcome().unwrap();

    handle.start(20).unwrap();
    let events = handle.wait_for_outcome().unwrap();

    assert_eq!(progress_count(&events), 0);
    assert!(matches!(
        events.last(),
        Some(WorkerEvent::Done(report)) if report.inserted == 0 && report.final_count == 80
    ));
}

#[test]
fn test_cancel_stops_running_fill_not_queued_start() {
    let temp = TempDir::new().unwrap();
    let handle = spawn(test_config(&temp));

    handle.start(1_000_000).unwrap();
    handle.start(300).unwrap();

    // Wait until the first fill is under way
    loop {
        match handle.events().recv().unwrap() {
            WorkerEvent::Progress(_) => break,
            WorkerEvent::Notice { .. } => {}
            other => panic!("expected progress, got {:?}", other),
        }
    }
    handle.cancel();

    let first = handle.wait_for_outcome().unwrap();
    match first.last().unwrap() {
        WorkerEvent::Failed { error } => assert!(error.contains("cancelled")),
        other => panic!("expected Failed, got {:?}", other),
    }

    let second = handle.wait_for_outcome().unwrap();
    match second.last().unwrap() {
        WorkerEvent::Done(report) => assert!(report.final_count >= 300),
        other => panic!("expected Done, got {:?}", other),
    }
    handle.shutdown().unwrap();
}

#[test]
fn test_version_change_elsewhere_is_reported() {
    let temp = TempDir::new().unwrap();
    let handle = spawn(test_config(&temp));
    handle.start(100).unwrap();
    handle.wait_for_outcome().unwrap();

    // Another opener in this process moves the schema to v2
    let mut newer = test_config(&temp);
    newer.schema_version = 2;
    let v2 = RecordStore::open(newer).unwrap();

    handle.start(200).unwrap();
    let events = handle.wait_for_outcome().unwrap();

    assert!(events.iter().any(|e| matches!(
        e,
        WorkerEvent::Notice { message } if message.contains("outdated")
    )));
    // Reopening at v1 while v2 is open is a downgrade
    match events.last().unwrap() {
        WorkerEvent::Failed { error } => assert!(error.contains("lower than stored version")),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(v2.count().unwrap(), 100);
    handle.shutdown().unwrap();
}

#[test]
fn test_degraded_mode_without_storage() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("file");
    fs::write(&blocker, b"").unwrap();
    let config = Config::builder().data_dir(blocker.join("data")).build();

    let handle = spawn(config);
    handle.start(500).unwrap();
    let events = handle.wait_for_outcome().unwrap();

    assert!(matches!(events.first(), Some(WorkerEvent::Notice { .. })));
    match events.last().unwrap() {
        WorkerEvent::Done(report) => {
            assert_eq!(report.inserted, 0);
            assert_eq!(report.final_count, 0);
        }
        other => panic!("expected Done, got {:?}", other),
    }
}

#[test]
fn test_shutdown_message_ends_event_stream() {
    let temp = TempDir::new().unwrap();
    let handle = spawn(test_config(&temp));

    handle.send(ControlMessage::Shutdown).unwrap();

    // The worker thread exits and drops its event sender
    assert!(handle.wait_for_outcome().is_err());
}

#[test]
fn test_spawn_rejects_invalid_config() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.max_in_flight = 0;

    assert!(Worker::spawn(config).is_err());
}

// =============================================================================
// Event Encoding Tests
// =============================================================================

#[test]
fn test_event_json_tags() {
    let temp = TempDir::new().unwrap();
    let handle = spawn(test_config(&temp));
    handle.start(50).unwrap();
    let events = handle.wait_for_outcome().unwrap();

    let progress = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(progress["event"], "checkProgress");
    assert_eq!(progress["inserted"], 50);

    let done = serde_json::to_value(events.last().unwrap()).unwrap();
    assert_eq!(done["event"], "done");
    assert_eq!(done["final_count"], 50);

    let failed = serde_json::to_value(WorkerEvent::Failed {
        error: "boom".into(),
    })
    .unwrap();
    assert_eq!(failed["event"], "failed");
    assert_eq!(failed["error"], "boom");
}
