// src/engine/dispatch.rs

//! The fan-out/fan-in fabric behind one execute call.
//!
//! Actors and channels per run:
//! - one instance actor per (worker, instance), all instances of a worker
//!   sharing that worker's input channel;
//! - a bootstrap actor that reports every instance as idle once, so the main
//!   loop has an output to react to before any work exists;
//! - the main loop, sole owner of the stat map, the remaining task lists and
//!   the open input senders: it drains job outputs, updates the counters,
//!   cancels a task's scope on its first success, emits terminal events and
//!   dispatches the next pick, or closes the worker's input when nothing is
//!   left for it.
//!
//! All channels are bounded with capacity 1, so the fabric runs at the pace
//! of the event consumer. Sends to a consumer that went away are ignored;
//! the loop always drains to termination and channel closure is simply the
//! drop of the corresponding senders.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::Event;
use crate::stat::{TaskStat, TaskStatMap};
use crate::types::{Task, TaskId, Worker, WorkerId, WorkerTasks, WorkResult};

/// One job handed to a worker instance.
struct JobInput<T> {
    /// Child scope of the task; cancelled on the task's first success.
    cancel: CancellationToken,
    task: Arc<dyn Task>,
    /// Where the completion goes: the run's shared output channel.
    reply: mpsc::Sender<JobOutput<T>>,
    /// Stat snapshot at dispatch time, echoed in the Start event.
    stat: TaskStat,
}

/// What a worker instance reports back. `completion == None` is the idle
/// signal sent once per instance by the bootstrap actor.
struct JobOutput<T> {
    worker_id: WorkerId,
    instance: usize,
    completion: Option<Completion<T>>,
}

struct Completion<T> {
    task: Arc<dyn Task>,
    result: WorkResult<T>,
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
}

/// Wire up the channels, spawn the actors and return the event stream of
/// the run.
pub(super) fn spawn_run<T: Send + 'static>(
    workers: Vec<Worker<T>>,
    wid_tasks: WorkerTasks,
    cancel: CancellationToken,
) -> mpsc::Receiver<Event<T>> {
    let (event_tx, event_rx) = mpsc::channel::<Event<T>>(1);
    let (output_tx, output_rx) = mpsc::channel::<JobOutput<T>>(1);

    // Per-worker input channel; the receiver is shared by the worker's
    // instances behind an async mutex.
    let mut input_txs: HashMap<WorkerId, mpsc::Sender<JobInput<T>>> = HashMap::new();
    for worker in &workers {
        let (input_tx, input_rx) = mpsc::channel::<JobInput<T>>(1);
        input_txs.insert(worker.worker_id.clone(), input_tx);

        let shared_rx = Arc::new(Mutex::new(input_rx));
        for instance in 0..worker.instances {
            tokio::spawn(instance_loop(
                worker.clone(),
                instance,
                Arc::clone(&shared_rx),
                event_tx.clone(),
            ));
        }
    }

    // One child cancellation scope per distinct task id.
    let mut task_tokens: HashMap<TaskId, CancellationToken> = HashMap::new();
    for (_, tasks) in wid_tasks.iter() {
        for task in tasks {
            task_tokens
                .entry(task.task_id())
                .or_insert_with(|| cancel.child_token());
        }
    }

    // Bootstrap: report every instance as idle, in declared worker order.
    {
        let roster: Vec<(WorkerId, usize)> = workers
            .iter()
            .map(|w| (w.worker_id.clone(), w.instances))
            .collect();
        let output_tx = output_tx.clone();
        tokio::spawn(async move {
            for (worker_id, instances) in roster {
                for instance in 0..instances {
                    let idle = JobOutput {
                        worker_id: worker_id.clone(),
                        instance,
                        completion: None,
                    };
                    if output_tx.send(idle).await.is_err() {
                        // the run already wound down
                        return;
                    }
                }
            }
        });
    }

    tokio::spawn(main_loop(
        wid_tasks, task_tokens, input_txs, output_tx, output_rx, event_tx,
    ));

    event_rx
}

/// One worker instance: take a job, announce it, run it, report back.
async fn instance_loop<T: Send + 'static>(
    worker: Worker<T>,
    instance: usize,
    input_rx: Arc<Mutex<mpsc::Receiver<JobInput<T>>>>,
    event_tx: mpsc::Sender<Event<T>>,
) {
    loop {
        // Hold the lock only while waiting for a job, so sibling instances
        // can take the next one while this attempt runs.
        let job = { input_rx.lock().await.recv().await };
        let Some(job) = job else {
            // input closed and drained: the worker is retired
            break;
        };

        let time_start = Utc::now();
        let start = Event {
            worker_id: worker.worker_id.clone(),
            worker_inst: instance,
            task: Arc::clone(&job.task),
            result: None,
            stat: job.stat,
            time_start,
            time_end: time_start,
        };
        let _ = event_tx.send(start).await;

        let result = (worker.work)(
            job.cancel.clone(),
            worker.worker_id.clone(),
            instance,
            Arc::clone(&job.task),
        )
        .await;

        let output = JobOutput {
            worker_id: worker.worker_id.clone(),
            instance,
            completion: Some(Completion {
                task: job.task,
                result,
                time_start,
                time_end: Utc::now(),
            }),
        };
        if job.reply.send(output).await.is_err() {
            break;
        }
    }
}

/// The single consumer of job outputs; owns all mutable per-run state.
async fn main_loop<T: Send + 'static>(
    wid_tasks: WorkerTasks,
    task_tokens: HashMap<TaskId, CancellationToken>,
    mut input_txs: HashMap<WorkerId, mpsc::Sender<JobInput<T>>>,
    output_tx: mpsc::Sender<JobOutput<T>>,
    mut output_rx: mpsc::Receiver<JobOutput<T>>,
    event_tx: mpsc::Sender<Event<T>>,
) {
    // Fresh copy of the task lists: the engine stays reusable across runs.
    let mut remaining = wid_tasks.clone();
    let mut stats = TaskStatMap::from_worker_tasks(&wid_tasks);

    while !stats.completed() {
        let Some(output) = output_rx.recv().await else {
            break;
        };

        if let Some(done) = output.completion {
            let task_id = done.task.task_id();
            let success = done.result.is_ok();

            stats.done(&task_id, success);

            if success {
                // First success wins: ask the concurrent attempts at this
                // task to stop. Cooperative, so late non-cancel results are
                // still possible and classified as they come.
                if let Some(token) = task_tokens.get(&task_id) {
                    token.cancel();
                }
            }

            let event = Event {
                worker_id: output.worker_id.clone(),
                worker_inst: output.instance,
                task: done.task,
                result: Some(done.result),
                stat: stats.get(&task_id),
                time_start: done.time_start,
                time_end: done.time_end,
            };
            let _ = event_tx.send(event).await;
        }

        // Choose the worker's next task from what it has not taken yet.
        let next = remaining.get_mut(&output.worker_id).and_then(|tasks| {
            let i = stats.pick(tasks)?;
            // order is not preserved; pick rescans the list every round
            Some(tasks.swap_remove(i))
        });

        match next {
            Some(task) => {
                let task_id = task.task_id();
                stats.doing(&task_id);
                debug!(worker = %output.worker_id, task = %task_id, "dispatching task");

                let job = JobInput {
                    cancel: task_tokens
                        .get(&task_id)
                        .cloned()
                        .unwrap_or_default(),
                    stat: stats.get(&task_id),
                    task,
                    reply: output_tx.clone(),
                };
                if let Some(input_tx) = input_txs.get(&output.worker_id) {
                    let _ = input_tx.send(job).await;
                }
            }
            None => {
                // At-most-once close: removing the sender drops it, which
                // closes the channel and drains the worker's instances.
                if input_txs.remove(&output.worker_id).is_some() {
                    debug!(worker = %output.worker_id, "no tasks left; closing worker input");
                }
            }
        }
    }

    // Dropping `input_txs` here closes any input channel still open (a
    // worker whose idle signal never arrived), which in turn releases the
    // instance actors and, with them, the event senders.
}
