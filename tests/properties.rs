//! Structural properties of the raw event stream, checked over a fan-out
//! scenario with several workers, instance counts and task overlaps.

mod common;

use std::collections::HashMap;

use common::{drain, init_tracing};

use tokio_util::sync::CancellationToken;

use taskengine::{execute, Engine, Event, EventType, Mode, TaskStat};
use taskengine_test_utils::{ScenarioBuilder, ScriptedOutcome};

/// Attempt durations are spaced ≥15ms apart per task so first-success
/// cancellation always lands while the losers are still sleeping.
fn fan_out() -> ScenarioBuilder {
    ScenarioBuilder::new()
        .worker("w1", 2)
        .worker("w2", 1)
        .worker("w3", 3)
        .worker("w4", 2)
        .task("w1", "t1", 25, true)
        .task("w1", "t2", 40, false)
        .task("w1", "t3", 10, true)
        .task("w1", "t4", 35, false)
        .task("w2", "t1", 60, false)
        .task("w2", "t3", 30, true)
        .task("w2", "t5", 10, true)
        .task("w3", "t2", 15, true)
        .task("w3", "t4", 15, true)
        .task("w3", "t5", 35, false)
        .task("w3", "t6", 10, false)
        .task("w4", "t6", 30, false)
        .task("w4", "t1", 55, true)
}

/// Workers listing each task in the scenario above.
fn occurrences() -> HashMap<String, usize> {
    [
        ("t1", 3),
        ("t2", 2),
        ("t3", 2),
        ("t4", 2),
        ("t5", 2),
        ("t6", 2),
    ]
    .into_iter()
    .map(|(t, n)| (t.to_string(), n))
    .collect()
}

fn task_of(event: &Event<ScriptedOutcome>) -> String {
    event.task.task_id().to_string()
}

#[tokio::test]
async fn every_attempt_starts_once_and_ends_once() {
    init_tracing();

    let events = drain(fan_out().build_engine().execute_events(CancellationToken::new())).await;

    let mut starts: HashMap<(String, String), usize> = HashMap::new();
    let mut terminals: HashMap<(String, String), usize> = HashMap::new();

    for event in &events {
        let key = (event.worker_id.to_string(), task_of(event));
        match event.event_type() {
            EventType::Start => {
                *starts.entry(key.clone()).or_default() += 1;
                assert!(
                    !terminals.contains_key(&key),
                    "start after terminal for {key:?}"
                );
            }
            _ => {
                assert_eq!(
                    starts.get(&key),
                    Some(&1),
                    "terminal without preceding start for {key:?}"
                );
                *terminals.entry(key).or_default() += 1;
            }
        }
    }

    assert_eq!(starts, terminals, "every start pairs with one terminal");
    for (key, n) in &terminals {
        assert_eq!(*n, 1, "more than one terminal for {key:?}");
    }
}

#[tokio::test]
async fn every_assignment_is_eventually_done() {
    init_tracing();

    let events = drain(fan_out().build_engine().execute_events(CancellationToken::new())).await;

    // final done per task == number of workers listing it
    let mut final_stat: HashMap<String, TaskStat> = HashMap::new();
    for event in &events {
        if event.is_result() {
            final_stat.insert(task_of(event), event.stat);
        }
    }

    let occurrences = occurrences();
    assert_eq!(final_stat.len(), occurrences.len());
    for (task, stat) in &final_stat {
        assert_eq!(stat.done as usize, occurrences[task], "task {task}");
        assert!(stat.completed(), "task {task} left incomplete: {stat}");
        assert!(stat.success <= stat.done, "task {task}: {stat}");
    }
}

#[tokio::test]
async fn first_success_is_marked_and_final() {
    init_tracing();

    let events = drain(fan_out().build_engine().execute_events(CancellationToken::new())).await;

    let mut seen_success: HashMap<String, bool> = HashMap::new();
    for event in &events {
        let task = task_of(event);
        match event.event_type() {
            EventType::Success => {
                if !seen_success.get(&task).copied().unwrap_or(false) {
                    // the first success of a task observes itself as #1
                    assert_eq!(event.stat.success, 1, "task {task}");
                    seen_success.insert(task, true);
                }
            }
            EventType::Error | EventType::Canceled => {
                // once a task succeeded, later terminals can only be the
                // cancelled or failed stragglers
                if seen_success.get(&task).copied().unwrap_or(false) {
                    assert!(event.stat.success >= 1, "task {task}");
                }
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn retention_predicates_partition_the_stream() {
    init_tracing();

    let events = drain(fan_out().build_engine().execute_events(CancellationToken::new())).await;
    let occurrences = occurrences();

    // AllResults keeps exactly `done` results per task
    let mut all_kept: HashMap<String, usize> = HashMap::new();
    for event in events.iter().filter(|e| Mode::AllResults.retains(e)) {
        *all_kept.entry(task_of(event)).or_default() += 1;
    }
    assert_eq!(
        all_kept,
        occurrences
            .iter()
            .map(|(t, n)| (t.clone(), *n))
            .collect::<HashMap<_, _>>()
    );

    // SuccessOrErrorResults never keeps a canceled attempt
    assert!(events
        .iter()
        .filter(|e| Mode::SuccessOrErrorResults.retains(e))
        .all(|e| e.event_type() != EventType::Canceled));

    // ResultsUntilFirstSuccess keeps at most one success per task
    let mut successes_kept: HashMap<String, usize> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| Mode::ResultsUntilFirstSuccess.retains(e))
    {
        if event.event_type() == EventType::Success {
            *successes_kept.entry(task_of(event)).or_default() += 1;
        }
    }
    assert!(successes_kept.values().all(|&n| n == 1));

    // FirstSuccessOrLastResult keeps exactly one result per attempted task
    let mut kept: HashMap<String, usize> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| Mode::FirstSuccessOrLastResult.retains(e))
    {
        *kept.entry(task_of(event)).or_default() += 1;
    }
    assert_eq!(kept.len(), occurrences.len());
    assert!(kept.values().all(|&n| n == 1), "{kept:?}");
}

#[tokio::test]
async fn engine_runs_are_independent() {
    init_tracing();

    let engine = fan_out().build_engine();

    let first = drain(engine.execute_events(CancellationToken::new())).await;
    let second = drain(engine.execute_events(CancellationToken::new())).await;

    let terminals = |events: &[Event<ScriptedOutcome>]| {
        events.iter().filter(|e| e.is_result()).count()
    };
    let total: usize = occurrences().values().sum();
    assert_eq!(terminals(&first), total);
    assert_eq!(terminals(&second), total);
}

#[tokio::test]
async fn one_shot_execute_builds_and_runs() {
    init_tracing();

    let (workers, tasks) = ScenarioBuilder::new()
        .worker("w1", 1)
        .task("w1", "t1", 10, true)
        .build();

    let rx = execute(
        CancellationToken::new(),
        workers,
        tasks,
        Mode::FirstSuccessOrLastResult,
    )
    .expect("valid setup");

    let results = drain(rx).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
}

#[tokio::test]
async fn one_shot_execute_surfaces_setup_errors() {
    let (workers, tasks) = ScenarioBuilder::new()
        .worker("w1", 1)
        .worker("w1", 1)
        .build();

    let err = execute(CancellationToken::new(), workers, tasks, Mode::AllResults)
        .expect_err("duplicate worker");
    assert_eq!(err.to_string(), "duplicate worker: WorkerID=\"w1\"");
}

#[tokio::test]
async fn event_display_is_stable() {
    init_tracing();

    let engine = ScenarioBuilder::new()
        .worker("w1", 1)
        .task("w1", "t1", 10, true)
        .build_engine();

    let events = drain(engine.execute_events(CancellationToken::new())).await;
    let rendered: Vec<String> = events.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "w1[0] t1[0 1 0(0)] start".to_string(),
            "w1[0] t1[0 0 1(1)] success".to_string(),
        ]
    );
}

// Engines are shared across tasks and threads; keep them Send + Sync.
#[allow(dead_code)]
fn engine_is_send_and_sync(engine: Engine<ScriptedOutcome>) {
    fn check<T: Send + Sync>(_: T) {}
    check(engine);
}
