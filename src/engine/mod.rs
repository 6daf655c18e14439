// src/engine/mod.rs

//! The dispatch engine.
//!
//! An [`Engine`] holds a validated set of workers and the tasks assigned to
//! each of them. Every call to [`Engine::execute`] or
//! [`Engine::execute_events`] runs the whole set once:
//! - each idle worker instance is handed the pending task whose global
//!   success coverage is weakest (see [`crate::stat`]),
//! - the first success of a task cancels the other in-flight attempts at it,
//! - the run terminates once every assignment has finished in some way.
//!
//! The engine itself is immutable after construction and reusable: all
//! per-run state lives inside one execute call.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::EngineError;
use crate::event::Event;
use crate::types::{Worker, WorkerId, WorkerTasks, WorkResult, MAX_INSTANCES};

mod dispatch;

/// Retention policy applied to the terminal events of each task to derive
/// the user-visible result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every terminal result of every attempt, canceled ones included.
    /// More than one success per task is possible.
    AllResults,
    /// Every success and error; canceled attempts are dropped.
    SuccessOrErrorResults,
    /// For each task, the results up to and including its first success;
    /// at most one success per task.
    ResultsUntilFirstSuccess,
    /// Exactly one result per attempted task: its first success, or its
    /// last result when nothing succeeded.
    FirstSuccessOrLastResult,
}

impl Mode {
    /// Whether the mode keeps this event's result.
    pub fn retains<T>(&self, event: &Event<T>) -> bool {
        match self {
            Mode::AllResults => event.is_result(),
            Mode::SuccessOrErrorResults => event.is_success_or_error(),
            Mode::ResultsUntilFirstSuccess => event.is_result_until_first_success(),
            Mode::FirstSuccessOrLastResult => event.is_first_success_or_last_result(),
        }
    }
}

/// Validated, immutable worker set plus worker→tasks mapping.
pub struct Engine<T> {
    workers: HashMap<WorkerId, Worker<T>>,
    wid_tasks: WorkerTasks,
    /// Worker ids in declaration order; instance actors and the bootstrap
    /// walk this order.
    worker_order: Vec<WorkerId>,
}

impl<T: Send + 'static> Engine<T> {
    /// Build an engine from the worker list and the tasks of each worker.
    ///
    /// Workers are validated in declaration order and the first problem
    /// wins: a duplicate id, or an instance count outside `1..=100`.
    /// Mapping entries for unknown workers are rejected, except that an
    /// empty task list for any worker is simply dropped.
    pub fn new(workers: Vec<Worker<T>>, tasks: WorkerTasks) -> Result<Self, EngineError> {
        let mut by_id = HashMap::with_capacity(workers.len());
        let mut worker_order = Vec::with_capacity(workers.len());

        for worker in workers {
            if by_id.contains_key(&worker.worker_id) {
                return Err(EngineError::DuplicateWorker(worker.worker_id));
            }
            if worker.instances < 1 || worker.instances > MAX_INSTANCES {
                return Err(EngineError::InstancesOutOfRange(worker.worker_id));
            }
            worker_order.push(worker.worker_id.clone());
            by_id.insert(worker.worker_id.clone(), worker);
        }

        let mut wid_tasks = WorkerTasks::new();
        for (worker_id, task_list) in tasks {
            if task_list.is_empty() {
                continue;
            }
            if !by_id.contains_key(&worker_id) {
                return Err(EngineError::TasksForUndefinedWorker(worker_id));
            }
            wid_tasks.insert(worker_id, task_list);
        }

        Ok(Self {
            workers: by_id,
            wid_tasks,
            worker_order,
        })
    }

    /// Run the whole task set once, emitting the raw event stream: a Start
    /// and a terminal event per attempt, totally ordered by the channel.
    ///
    /// `cancel` is the parent scope of the run; cancelling it asks every
    /// attempt to stop cooperatively. The stream closes when the run
    /// terminates. Must be called within a Tokio runtime.
    pub fn execute_events(&self, cancel: CancellationToken) -> mpsc::Receiver<Event<T>> {
        let workers = self
            .worker_order
            .iter()
            .map(|wid| self.workers[wid].clone())
            .collect();
        dispatch::spawn_run(workers, self.wid_tasks.clone(), cancel)
    }

    /// Run the whole task set once and keep, per task, the results selected
    /// by `mode`. The stream closes when the underlying event stream does.
    pub fn execute(&self, cancel: CancellationToken, mode: Mode) -> mpsc::Receiver<WorkResult<T>> {
        let mut events = self.execute_events(cancel);
        let (result_tx, result_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !mode.retains(&event) {
                    continue;
                }
                let Some(result) = event.result else { continue };
                if result_tx.send(result).await.is_err() {
                    // consumer is gone; dropping the event stream unwinds
                    // the run
                    break;
                }
            }
        });

        result_rx
    }
}

impl<T> std::fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workers", &self.worker_order)
            .field("wid_tasks", &self.wid_tasks)
            .finish_non_exhaustive()
    }
}
