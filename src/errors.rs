// src/errors.rs

//! Setup errors reported synchronously by engine construction.
//!
//! Outcomes of individual attempts never surface here; they flow through the
//! event/result streams as [`WorkResult`](crate::WorkResult) values.

use thiserror::Error;

use crate::types::WorkerId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("duplicate worker: WorkerID=\"{0}\"")]
    DuplicateWorker(WorkerId),

    #[error("instances must be in 1..100 range: WorkerID=\"{0}\"")]
    InstancesOutOfRange(WorkerId),

    #[error("tasks for undefined worker: WorkerID=\"{0}\"")]
    TasksForUndefinedWorker(WorkerId),
}
