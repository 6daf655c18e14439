// src/event.rs

//! Events emitted by [`Engine::execute_events`](crate::Engine::execute_events)
//! and the retention predicates behind the execution modes.
//!
//! For each (worker, task) attempt that reaches execution the stream carries
//! one Start event followed by one terminal event: Success, Error or
//! Canceled. Every event embeds a by-value [`TaskStat`] snapshot so the
//! retention predicates are pure functions of the event alone.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stat::TaskStat;
use crate::types::{Task, WorkResult, WorkerId};

/// Classification of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Absent event.
    Nil,
    /// An attempt began executing.
    Start,
    /// The attempt finished without error.
    Success,
    /// The attempt failed with a non-cancellation error.
    Error,
    /// The attempt reported the cancellation sentinel.
    Canceled,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Nil => "nil",
            EventType::Start => "start",
            EventType::Success => "success",
            EventType::Error => "error",
            EventType::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// One observation of the run: an attempt starting or finishing.
///
/// `result` is `None` for Start events. `stat` is the snapshot taken at
/// dispatch time for Start events and just after the counters were updated
/// for terminal events.
pub struct Event<T> {
    pub worker_id: WorkerId,
    pub worker_inst: usize,
    pub task: Arc<dyn Task>,
    pub result: Option<WorkResult<T>>,
    pub stat: TaskStat,
    pub time_start: DateTime<Utc>,
    /// Equal to `time_start` for Start events.
    pub time_end: DateTime<Utc>,
}

impl<T> Event<T> {
    /// Derive the event type from the embedded result.
    pub fn event_type(&self) -> EventType {
        match &self.result {
            None => EventType::Start,
            Some(Ok(_)) => EventType::Success,
            Some(Err(err)) if err.is_canceled() => EventType::Canceled,
            Some(Err(_)) => EventType::Error,
        }
    }

    /// True for terminal events, i.e. anything carrying a result.
    pub fn is_result(&self) -> bool {
        self.result.is_some()
    }

    /// Terminal and not canceled.
    pub fn is_success_or_error(&self) -> bool {
        matches!(
            self.event_type(),
            EventType::Success | EventType::Error
        )
    }

    /// True for every terminal event up to and including the first success
    /// of the task: the first success itself, or any non-success seen while
    /// the task has no success yet.
    pub fn is_result_until_first_success(&self) -> bool {
        match &self.result {
            None => false,
            Some(Ok(_)) => self.stat.success == 1,
            Some(Err(_)) => self.stat.success == 0,
        }
    }

    /// True for exactly one terminal event per attempted task: its first
    /// success, or its very last result when no attempt succeeded.
    pub fn is_first_success_or_last_result(&self) -> bool {
        match &self.result {
            None => false,
            Some(Ok(_)) => self.stat.success == 1,
            Some(Err(_)) => self.stat.completed() && self.stat.success == 0,
        }
    }
}

impl<T> fmt::Display for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}{} {}",
            self.worker_id,
            self.worker_inst,
            self.task.task_id(),
            self.stat,
            self.event_type()
        )
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("worker_id", &self.worker_id)
            .field("worker_inst", &self.worker_inst)
            .field("task", &self.task.task_id())
            .field("type", &self.event_type())
            .field("stat", &self.stat)
            .finish_non_exhaustive()
    }
}
