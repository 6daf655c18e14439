// src/types.rs

//! Core value types: identifiers, the [`Task`] capability, work results and
//! the [`Worker`] definition, plus the worker→tasks container.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Max number of instances for each worker.
pub const MAX_INSTANCES: usize = 100;

/// Identifier of a worker. Ordered and hashable so it can key maps and break
/// ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a task. Two tasks with the same id are equivalent for
/// scheduling purposes, even when the underlying objects differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work that can be executed by a worker.
///
/// Tasks with the same [`TaskId`] are interchangeable from the scheduler's
/// point of view, but each copy may carry information specific to the worker
/// it was assigned to.
pub trait Task: Send + Sync + 'static {
    fn task_id(&self) -> TaskId;

    /// Access to the concrete task type, so a work function can
    /// `downcast_ref` to read its worker-specific payload.
    fn as_any(&self) -> &dyn Any;
}

/// Error state of a completed attempt.
///
/// `Canceled` is the cooperative-cancellation sentinel: a work function that
/// observes its token reports it, and the engine classifies the attempt as
/// canceled rather than failed.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("canceled")]
    Canceled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, WorkError::Canceled)
    }
}

/// Outcome of a single attempt: the worker's payload on success, a
/// [`WorkError`] otherwise.
pub type WorkResult<T> = Result<T, WorkError>;

/// Boxed future returned by a work function.
pub type WorkFuture<T> = Pin<Box<dyn Future<Output = WorkResult<T>> + Send>>;

/// The work function of a worker.
///
/// Receives the task's cancellation token, the worker id, the instance index
/// and the task to execute. It may block arbitrarily; it is expected to
/// observe the token promptly and return [`WorkError::Canceled`] when it
/// fires, but any other outcome is also accepted and classified as is.
pub type WorkFn<T> =
    Arc<dyn Fn(CancellationToken, WorkerId, usize, Arc<dyn Task>) -> WorkFuture<T> + Send + Sync>;

/// A processing unit identified by [`WorkerId`], running up to `instances`
/// concurrent attempts through its work function.
pub struct Worker<T> {
    pub worker_id: WorkerId,
    /// Number of concurrent instances, in `1..=100`.
    pub instances: usize,
    pub work: WorkFn<T>,
}

impl<T> Worker<T> {
    pub fn new<F, Fut>(worker_id: impl Into<WorkerId>, instances: usize, work: F) -> Self
    where
        F: Fn(CancellationToken, WorkerId, usize, Arc<dyn Task>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult<T>> + Send + 'static,
    {
        Self {
            worker_id: worker_id.into(),
            instances,
            work: Arc::new(move |cancel, wid, inst, task| Box::pin(work(cancel, wid, inst, task))),
        }
    }
}

impl<T> Clone for Worker<T> {
    fn clone(&self) -> Self {
        Self {
            worker_id: self.worker_id.clone(),
            instances: self.instances,
            work: Arc::clone(&self.work),
        }
    }
}

impl<T> fmt::Debug for Worker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.worker_id)
            .field("instances", &self.instances)
            .finish_non_exhaustive()
    }
}

/// An ordered list of tasks. Removal during scheduling uses
/// [`Vec::swap_remove`]: order is not preserved, which is fine because the
/// scheduler re-picks from scratch every round and ties break on task id.
pub type Tasks = Vec<Arc<dyn Task>>;

/// The task list of each worker.
///
/// `Clone` duplicates the map and the per-worker lists while sharing the task
/// objects themselves; the engine treats tasks as read-only.
#[derive(Default, Clone)]
pub struct WorkerTasks(HashMap<WorkerId, Tasks>);

impl WorkerTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the task list of a worker.
    pub fn insert(&mut self, worker_id: impl Into<WorkerId>, tasks: Tasks) {
        self.0.insert(worker_id.into(), tasks);
    }

    /// Append one task to a worker's list, creating the entry if needed.
    pub fn push(&mut self, worker_id: impl Into<WorkerId>, task: Arc<dyn Task>) {
        self.0.entry(worker_id.into()).or_default().push(task);
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<&Tasks> {
        self.0.get(worker_id)
    }

    pub(crate) fn get_mut(&mut self, worker_id: &WorkerId) -> Option<&mut Tasks> {
        self.0.get_mut(worker_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WorkerId, &Tasks)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for WorkerTasks {
    type Item = (WorkerId, Tasks);
    type IntoIter = std::collections::hash_map::IntoIter<WorkerId, Tasks>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Debug for WorkerTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut worker_ids: Vec<&WorkerId> = self.0.keys().collect();
        worker_ids.sort();

        writeln!(f, "{{")?;
        for wid in worker_ids {
            writeln!(f, "   {} : [{}]", wid, join_task_ids(&self.0[wid]))?;
        }
        write!(f, "}}")
    }
}

fn join_task_ids(tasks: &Tasks) -> String {
    tasks
        .iter()
        .map(|t| t.task_id().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
