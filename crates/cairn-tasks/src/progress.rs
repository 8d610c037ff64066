//! Progress reporting: status records flowing from tasks to a reporter

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Lifecycle state of one task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not yet started
    Pending,
    /// Work in progress
    Started,
    /// Satisfied from the stash without doing real work
    Cached,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
}

impl TaskState {
    /// Whether this state ends a task's execution
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Cached | Self::Succeeded | Self::Failed)
    }
}

/// One snapshot of a task's progress
#[derive(Debug, Clone)]
pub struct Status {
    /// Current state
    pub state: TaskState,
    /// Task name as reported by the task itself
    pub task_name: String,
    /// Description of the task's input
    pub source: Option<String>,
    /// Description of the task's output
    pub target: Option<String>,
    /// Free-form message carried by this snapshot only
    pub message: Option<String>,
    /// Wall-clock time from start, populated on terminal states
    pub elapsed: Option<Duration>,
}

impl Status {
    fn new() -> Self {
        Self {
            state: TaskState::Pending,
            task_name: String::new(),
            source: None,
            target: None,
            message: None,
            elapsed: None,
        }
    }
}

/// Ordered, thread-safe queue of status records.
///
/// Many running tasks push; a single external reporter drains.
#[derive(Debug, Default)]
pub struct StatusQueue {
    fifo: Mutex<VecDeque<Status>>,
}

impl StatusQueue {
    /// Create an empty queue behind a shared handle
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a record
    pub fn push(&self, status: Status) {
        self.fifo.lock().unwrap().push_back(status);
    }

    /// Remove and return the oldest record, if any
    pub fn try_pop(&self) -> Option<Status> {
        self.fifo.lock().unwrap().pop_front()
    }

    /// Whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.fifo.lock().unwrap().is_empty()
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.fifo.lock().unwrap().len()
    }
}

/// Single-writer progress handle supplied to a running task.
///
/// Every mutation pushes a fresh snapshot onto the queue, so the reporter
/// sees an append-only, ordered record of the task's lifecycle.
pub struct Progress {
    queue: Arc<StatusQueue>,
    status: Status,
    started_at: Instant,
}

impl Progress {
    /// Create a progress handle writing into `queue`
    pub fn new(queue: Arc<StatusQueue>) -> Self {
        Self {
            queue,
            status: Status::new(),
            started_at: Instant::now(),
        }
    }

    /// Announce the task: name plus source/target descriptors
    pub fn start(&mut self, task_name: &str, source: &str, target: &str) {
        self.started_at = Instant::now();
        self.status.task_name = task_name.to_string();
        self.status.source = Some(source.to_string());
        self.status.target = Some(target.to_string());
        self.status.state = TaskState::Started;
        self.queue.push(self.status.clone());
    }

    /// Move to `state`; terminal states record elapsed time
    pub fn set_state(&mut self, state: TaskState) {
        self.status.state = state;
        if state.is_finished() {
            self.status.elapsed = Some(self.started_at.elapsed());
        }
        self.queue.push(self.status.clone());
    }

    /// Emit a one-off message snapshot
    pub fn message(&mut self, text: &str) {
        let mut snapshot = self.status.clone();
        snapshot.message = Some(text.to_string());
        self.queue.push(snapshot);
    }

    /// Whether the task has signalled a terminal state
    pub fn is_finished(&self) -> bool {
        self.status.state.is_finished()
    }

    /// Current state
    pub fn state(&self) -> TaskState {
        self.status.state
    }
}
