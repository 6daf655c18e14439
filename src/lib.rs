// src/lib.rs

//! Concurrent task-dispatch engine.
//!
//! A set of logical tasks is executed against multiple workers, each worker
//! possibly able to handle a subset of the tasks. Tasks with the same
//! [`TaskId`] are equivalent for scheduling but may carry worker-specific
//! payloads. Each [`Worker`] runs a configurable number of concurrent
//! instances of its work function.
//!
//! The engine continuously hands every idle worker instance the pending task
//! whose global success coverage is weakest, maximising the throughput of
//! *distinct* successfully completed tasks. The first success of a task
//! cancels the remaining in-flight attempts at it (cooperatively, through
//! each attempt's `CancellationToken`).
//!
//! Results are delivered as a stream filtered by a [`Mode`]:
//! - [`Mode::FirstSuccessOrLastResult`]: one result per task, its first
//!   success or else its last result when nothing succeeded;
//! - [`Mode::ResultsUntilFirstSuccess`]: every result up to and including
//!   the first success of each task;
//! - [`Mode::SuccessOrErrorResults`]: every success and error, canceled
//!   attempts dropped;
//! - [`Mode::AllResults`]: every result of every attempt.
//!
//! [`Engine::execute_events`] exposes the raw, totally ordered event stream
//! instead: one Start plus one terminal event (Success, Error or Canceled)
//! per attempt, each carrying a [`TaskStat`] snapshot.

pub mod engine;
pub mod errors;
pub mod event;
pub mod stat;
pub mod types;

pub use engine::{Engine, Mode};
pub use errors::EngineError;
pub use event::{Event, EventType};
pub use stat::TaskStat;
pub use types::{
    Task, TaskId, Tasks, WorkError, WorkFn, WorkFuture, WorkResult, Worker, WorkerId, WorkerTasks,
    MAX_INSTANCES,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Build an engine from `workers` and `tasks` and run it once under `mode`.
///
/// Convenience for the common one-shot case; construct an [`Engine`] when
/// the same worker set runs more than once.
pub fn execute<T: Send + 'static>(
    cancel: CancellationToken,
    workers: Vec<Worker<T>>,
    tasks: WorkerTasks,
    mode: Mode,
) -> Result<mpsc::Receiver<WorkResult<T>>, EngineError> {
    let engine = Engine::new(workers, tasks)?;
    Ok(engine.execute(cancel, mode))
}
