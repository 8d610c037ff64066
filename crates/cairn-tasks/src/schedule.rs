//! Immutable schedules: an arena of tasks plus their dependency edges

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::task::Task;

/// Stable index of a task within one schedule.
///
/// Task identity is the arena index; dependency references are index sets
/// rather than pointers, so a schedule can be shared freely across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    /// The arena index
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// An immutable ordered collection of tasks for one invocation.
///
/// Built once by the driver, then shared read-only by every run that
/// references it. Dependencies always point at earlier arena slots, so a
/// schedule is a DAG by construction.
pub struct Schedule {
    tasks: Vec<Arc<dyn Task>>,
    dependencies: Vec<BTreeSet<TaskId>>,
}

impl Schedule {
    /// Start building a schedule
    pub fn builder() -> ScheduleBuilder {
        ScheduleBuilder::default()
    }

    /// Number of tasks in the schedule
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the schedule holds no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All task ids, in registration order
    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.tasks.len()).map(TaskId)
    }

    /// Shared handle to the task stored at `id`
    pub fn task(&self, id: TaskId) -> Arc<dyn Task> {
        Arc::clone(&self.tasks[id.0])
    }

    /// Dependencies of the task stored at `id`
    pub fn dependencies(&self, id: TaskId) -> &BTreeSet<TaskId> {
        &self.dependencies[id.0]
    }

    /// Pure readiness check: true iff every dependency of `id` is finished.
    /// Safe to call repeatedly and concurrently.
    pub fn is_ready(&self, id: TaskId, finished: &HashSet<TaskId>) -> bool {
        self.dependencies[id.0]
            .iter()
            .all(|dep| finished.contains(dep))
    }
}

/// Builder accumulating tasks and their dependency edges
#[derive(Default)]
pub struct ScheduleBuilder {
    tasks: Vec<Arc<dyn Task>>,
    dependencies: Vec<BTreeSet<TaskId>>,
}

impl ScheduleBuilder {
    /// Register a task whose dependencies were all registered earlier.
    ///
    /// Panics if a dependency id has not been handed out yet; forward edges
    /// are a programmer error and would make cycles representable.
    pub fn push(&mut self, task: impl Task, deps: &[TaskId]) -> TaskId {
        let id = TaskId(self.tasks.len());
        for dep in deps {
            assert!(
                dep.0 < id.0,
                "{dep} registered after dependent {id}"
            );
        }
        self.tasks.push(Arc::new(task));
        self.dependencies.push(deps.iter().copied().collect());
        id
    }

    /// Freeze the schedule
    pub fn build(self) -> Arc<Schedule> {
        Arc::new(Schedule {
            tasks: self.tasks,
            dependencies: self.dependencies,
        })
    }
}
