#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::{fmt, EnvFilter};

use taskengine::{Event, EventType, WorkError, WorkResult};
use taskengine_test_utils::{ScriptedError, ScriptedOutcome};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Drain a stream to completion, failing the test if the run never
/// terminates.
pub async fn drain<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
    timeout(Duration::from_secs(10), async {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    })
    .await
    .expect("stream closes when the run terminates")
}

/// Compact (type, worker, task) view of an event for assertions.
pub type EventKey = (EventType, String, String);

pub fn summarize(events: &[Event<ScriptedOutcome>]) -> Vec<EventKey> {
    events
        .iter()
        .map(|e| {
            (
                e.event_type(),
                e.worker_id.to_string(),
                e.task.task_id().to_string(),
            )
        })
        .collect()
}

/// Classify a filtered result the way events are classified.
pub fn result_kind(result: &WorkResult<ScriptedOutcome>) -> EventType {
    match result {
        Ok(_) => EventType::Success,
        Err(err) if err.is_canceled() => EventType::Canceled,
        Err(_) => EventType::Error,
    }
}

/// Worker that produced the result, where the payload carries it: always for
/// successes and scripted errors, never for canceled attempts (the sentinel
/// has no payload; identity for those lives on the event stream).
pub fn result_worker(result: &WorkResult<ScriptedOutcome>) -> Option<String> {
    match result {
        Ok(outcome) => Some(outcome.worker_id.to_string()),
        Err(WorkError::Other(err)) => err
            .downcast_ref::<ScriptedError>()
            .map(|e| e.worker_id.to_string()),
        Err(WorkError::Canceled) => None,
    }
}

/// Assert that `actual` is exactly the concatenation of `groups`, where the
/// order *inside* each group is free but every member of a group precedes
/// every member of the next one.
pub fn assert_grouped(actual: &[EventKey], groups: &[&[(EventType, &str, &str)]]) {
    let expected_len: usize = groups.iter().map(|g| g.len()).sum();
    assert_eq!(
        actual.len(),
        expected_len,
        "event count mismatch; got {actual:?}"
    );

    let mut idx = 0;
    for group in groups {
        let window = &actual[idx..idx + group.len()];
        for want in *group {
            assert!(
                window
                    .iter()
                    .any(|(t, w, tid)| *t == want.0 && w == want.1 && tid == want.2),
                "expected {want:?} within events {idx}..{}; got {window:?}",
                idx + group.len()
            );
        }
        for got in window {
            assert!(
                group
                    .iter()
                    .any(|(t, w, tid)| got.0 == *t && got.1 == *w && got.2 == *tid),
                "unexpected {got:?} within events {idx}..{}; wanted {group:?}",
                idx + group.len()
            );
        }
        idx += group.len();
    }
}
