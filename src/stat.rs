// src/stat.rs

//! Per-task progress counters and the pick policy.
//!
//! The dispatch loop owns one [`TaskStatMap`] per run and consults
//! [`TaskStatMap::pick`] every time a worker instance becomes idle, so the
//! "most useful" pending task is re-evaluated against live counters on every
//! round.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{TaskId, Tasks, WorkerTasks};

/// Live counters of a single task across all workers that list it.
///
/// At any observation point `todo + doing + done` equals the number of
/// workers the task was assigned to, and `success <= done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStat {
    /// Workers that still have to take the task.
    pub todo: u32,
    /// Attempts currently in flight.
    pub doing: u32,
    /// Attempts that finished in any way, cancellation included.
    pub done: u32,
    /// Subset of `done` that finished without error.
    pub success: u32,
}

impl TaskStat {
    /// A task is completed once no worker has to do it or is doing it.
    pub fn completed(&self) -> bool {
        self.todo == 0 && self.doing == 0
    }
}

impl fmt::Display for TaskStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {}({})]",
            self.todo, self.doing, self.done, self.success
        )
    }
}

/// TaskId → [`TaskStat`] for one run. Mutated only by the dispatch loop.
#[derive(Default)]
pub(crate) struct TaskStatMap {
    stats: HashMap<TaskId, TaskStat>,
}

impl TaskStatMap {
    /// Seed the map from the validated worker→tasks mapping: one `todo` per
    /// occurrence of a task id.
    pub(crate) fn from_worker_tasks(wid_tasks: &WorkerTasks) -> Self {
        let mut map = Self::default();
        for (_, tasks) in wid_tasks.iter() {
            for task in tasks {
                map.todo(&task.task_id());
            }
        }
        map
    }

    /// Count one more worker that can perform the task, creating the entry.
    pub(crate) fn todo(&mut self, task_id: &TaskId) {
        self.stats.entry(task_id.clone()).or_default().todo += 1;
    }

    /// Move one assignment from todo to doing.
    pub(crate) fn doing(&mut self, task_id: &TaskId) {
        if let Some(stat) = self.stats.get_mut(task_id) {
            stat.todo -= 1;
            stat.doing += 1;
        }
    }

    /// Move one attempt from doing to done, counting the success.
    pub(crate) fn done(&mut self, task_id: &TaskId, success: bool) {
        if let Some(stat) = self.stats.get_mut(task_id) {
            stat.doing -= 1;
            stat.done += 1;
            if success {
                stat.success += 1;
            }
        }
    }

    /// Whether every task is completed: no worker has to do or is doing any
    /// task. The dispatch loop terminates on this condition.
    pub(crate) fn completed(&self) -> bool {
        self.stats.values().all(TaskStat::completed)
    }

    /// Snapshot of a task's counters; zeroes for an unknown id.
    pub(crate) fn get(&self, task_id: &TaskId) -> TaskStat {
        self.stats.get(task_id).copied().unwrap_or_default()
    }

    /// Choose, among the candidate tasks a worker can still execute, the one
    /// whose attempt raises global coverage the most. Smaller is better on
    /// the tuple `(success, doing, todo, task_id)`:
    /// fewest successes first, then fewest in-flight attempts, then fewest
    /// remaining assignments, then the lowest task id to stay deterministic.
    ///
    /// Returns the index of the chosen task, or `None` for an empty list.
    /// Pure: neither the list nor the counters are touched.
    pub(crate) fn pick(&self, tasks: &Tasks) -> Option<usize> {
        let mut best: Option<(usize, TaskStat, TaskId)> = None;

        for (i, task) in tasks.iter().enumerate() {
            let task_id = task.task_id();
            let stat = self.get(&task_id);

            let better = match &best {
                None => true,
                Some((_, best_stat, best_id)) => {
                    (stat.success, stat.doing, stat.todo, &task_id)
                        < (best_stat.success, best_stat.doing, best_stat.todo, best_id)
                }
            };
            if better {
                best = Some((i, stat, task_id));
            }
        }

        best.map(|(i, _, _)| i)
    }
}

impl fmt::Debug for TaskStatMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&TaskId> = self.stats.keys().collect();
        ids.sort();

        writeln!(f, "[")?;
        for tid in ids {
            let s = self.stats[tid];
            writeln!(
                f,
                " {}: todo={}, doing={}, done={}, success={}",
                tid, s.todo, s.doing, s.done, s.success
            )?;
        }
        write!(f, "]")
    }
}
