#![allow(dead_code)]

//! Scripted scenario builder for engine tests.
//!
//! A [`ScriptedTask`] carries its own script: how long the attempt takes and
//! whether it succeeds. [`scripted_work`] sleeps for that duration under the
//! attempt's cancellation token, so cancelled attempts report the sentinel
//! and the others their scripted outcome.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use taskengine::{
    Engine, Task, TaskId, WorkError, WorkResult, Worker, WorkerId, WorkerTasks,
};

/// A task whose behaviour is fixed up front.
pub struct ScriptedTask {
    task_id: TaskId,
    duration: Duration,
    succeed: bool,
}

impl ScriptedTask {
    pub fn new(task_id: &str, millis: u64, succeed: bool) -> Self {
        Self {
            task_id: TaskId::from(task_id),
            duration: Duration::from_millis(millis),
            succeed,
        }
    }
}

impl Task for ScriptedTask {
    fn task_id(&self) -> TaskId {
        self.task_id.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Payload of a successful scripted attempt: enough to tell results apart
/// in assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedOutcome {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub worker_inst: usize,
}

/// Scripted failure; keeps the attempt's identity so assertions can tell
/// error results apart (successes carry theirs in [`ScriptedOutcome`]).
#[derive(Debug)]
pub struct ScriptedError {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub worker_inst: usize,
}

impl fmt::Display for ScriptedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERR: {} failed {}", self.worker_id, self.task_id)
    }
}

impl std::error::Error for ScriptedError {}

/// Work function shared by all scripted workers.
pub async fn scripted_work(
    cancel: CancellationToken,
    worker_id: WorkerId,
    worker_inst: usize,
    task: Arc<dyn Task>,
) -> WorkResult<ScriptedOutcome> {
    let Some(script) = task.as_any().downcast_ref::<ScriptedTask>() else {
        return Err(anyhow!("task is not a ScriptedTask").into());
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(WorkError::Canceled),
        _ = tokio::time::sleep(script.duration) => {
            if script.succeed {
                Ok(ScriptedOutcome {
                    task_id: script.task_id.clone(),
                    worker_id,
                    worker_inst,
                })
            } else {
                Err(anyhow::Error::new(ScriptedError {
                    task_id: script.task_id.clone(),
                    worker_id,
                    worker_inst,
                })
                .into())
            }
        }
    }
}

/// Builder assembling workers and their scripted task lists.
pub struct ScenarioBuilder {
    workers: Vec<(WorkerId, usize)>,
    tasks: WorkerTasks,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
            tasks: WorkerTasks::new(),
        }
    }

    /// Declare a worker with the given number of instances.
    pub fn worker(mut self, worker_id: &str, instances: usize) -> Self {
        self.workers.push((WorkerId::from(worker_id), instances));
        self
    }

    /// Assign a scripted task to a worker.
    pub fn task(mut self, worker_id: &str, task_id: &str, millis: u64, succeed: bool) -> Self {
        self.tasks.push(
            worker_id,
            Arc::new(ScriptedTask::new(task_id, millis, succeed)) as Arc<dyn Task>,
        );
        self
    }

    pub fn build(self) -> (Vec<Worker<ScriptedOutcome>>, WorkerTasks) {
        let workers = self
            .workers
            .into_iter()
            .map(|(worker_id, instances)| Worker::new(worker_id, instances, scripted_work))
            .collect();
        (workers, self.tasks)
    }

    /// Build and validate the engine in one go.
    pub fn build_engine(self) -> Engine<ScriptedOutcome> {
        let (workers, tasks) = self.build();
        Engine::new(workers, tasks).expect("scenario builds a valid engine")
    }
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}
