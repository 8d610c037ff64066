//! Scheduler and run state machine
//!
//! A `Scheduler` owns a bounded worker budget shared across all owners and
//! a supervisor task holding the owner -> run bookkeeping. Each submitted
//! schedule becomes a `Run`: the live execution state machine tracking
//! pending/active/finished task sets, driving readiness propagation, and
//! resolving a single completion signal once all work has drained.
//!
//! Lock discipline: a run never touches scheduler bookkeeping while holding
//! its own lock. Terminal transitions are reported to the supervisor as
//! posted messages, so the two locks are never held together.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::progress::{Progress, StatusQueue, TaskState};
use crate::schedule::{Schedule, TaskId};
use crate::task::TaskError;

/// Options for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum number of tasks executing concurrently
    pub concurrency: usize,
    /// Interval of the supervisor's idle keep-alive tick
    pub keep_alive: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus(),
            keep_alive: Duration::from_millis(100),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Opaque key identifying the logical slot a run belongs to.
///
/// Submitting a new schedule under the same owner supersedes the previous
/// run for that owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    /// Create an owner key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Owner {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// How a run resolved
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every task finished successfully
    Completed,
    /// The run was cancelled before draining successfully
    Cancelled,
    /// A task failed; no further tasks were issued
    Failed(TaskError),
}

impl RunOutcome {
    fn into_result(self) -> Result<bool, TaskError> {
        match self {
            Self::Completed => Ok(true),
            Self::Cancelled => Ok(false),
            Self::Failed(err) => Err(err),
        }
    }
}

type RunId = u64;

/// State shared between the scheduler front end, the supervisor, and runs
struct Shared {
    workers: Arc<Semaphore>,
    status: Arc<StatusQueue>,
    tx: mpsc::UnboundedSender<SchedulerMsg>,
}

enum SchedulerMsg {
    Submit { owner: Owner, run: Arc<RunInner> },
    RunFinished { owner: Owner, run: RunId },
    Shutdown,
}

/// Concurrent, dependency-aware task scheduler.
///
/// Must be created inside a tokio runtime; the supervisor and all task
/// wrappers are spawned onto it.
pub struct Scheduler {
    shared: Arc<Shared>,
    next_run_id: AtomicU64,
}

impl Scheduler {
    /// Create a scheduler pushing status records into `status`
    pub fn new(status: Arc<StatusQueue>, options: SchedulerOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            workers: Arc::new(Semaphore::new(options.concurrency.max(1))),
            status,
            tx,
        });
        tokio::spawn(supervise(rx, options.keep_alive));
        Self {
            shared,
            next_run_id: AtomicU64::new(0),
        }
    }

    /// Submit `schedule` under `owner`.
    ///
    /// With no active run for the owner the new run starts immediately.
    /// Otherwise it takes the owner's single pending slot (discarding and
    /// cancelling any run already waiting there, which then never launches a
    /// task) and the active run is cancelled cooperatively; the new run is
    /// promoted once the old one drains.
    pub fn run(&self, owner: Owner, schedule: Arc<Schedule>) -> RunHandle {
        let id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let run = RunInner::new(id, owner.clone(), schedule, Arc::clone(&self.shared));
        let handle = RunHandle {
            inner: Arc::clone(&run),
            outcome: run.outcome.subscribe(),
        };
        debug!(%owner, run = id, "run submitted");
        if self
            .shared
            .tx
            .send(SchedulerMsg::Submit { owner, run: Arc::clone(&run) })
            .is_err()
        {
            // Scheduler already shut down; the run can never start.
            run.cancel();
        }
        handle
    }

    /// Cancel every live run and stop the supervisor
    pub fn shutdown(&self) {
        let _ = self.shared.tx.send(SchedulerMsg::Shutdown);
    }
}

struct OwnerSlot {
    active: Arc<RunInner>,
    pending: Option<Arc<RunInner>>,
}

async fn supervise(mut rx: mpsc::UnboundedReceiver<SchedulerMsg>, keep_alive: Duration) {
    let mut slots: HashMap<Owner, OwnerSlot> = HashMap::new();
    let mut tick = tokio::time::interval(keep_alive);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    SchedulerMsg::Submit { owner, run } => match slots.entry(owner) {
                        Entry::Vacant(slot) => {
                            debug!(owner = %slot.key(), run = run.id, "run activated");
                            slot.insert(OwnerSlot {
                                active: Arc::clone(&run),
                                pending: None,
                            });
                            run.start();
                        }
                        Entry::Occupied(mut entry) => {
                            let slot = entry.get_mut();
                            if let Some(superseded) = slot.pending.replace(Arc::clone(&run)) {
                                debug!(
                                    owner = %entry.key(),
                                    run = superseded.id,
                                    "pending run superseded before starting"
                                );
                                superseded.cancel();
                            }
                            debug!(
                                owner = %entry.key(),
                                run = entry.get().active.id,
                                "active run cancelled by new submission"
                            );
                            entry.get().active.cancel();
                        }
                    },
                    SchedulerMsg::RunFinished { owner, run } => {
                        let Some(slot) = slots.get_mut(&owner) else { continue };
                        if slot.active.id != run {
                            // A run discarded from the pending slot; the
                            // active run is unaffected.
                            continue;
                        }
                        match slot.pending.take() {
                            Some(next) => {
                                debug!(%owner, run = next.id, "pending run promoted");
                                slot.active = Arc::clone(&next);
                                next.start();
                            }
                            None => {
                                debug!(%owner, run, "owner slot drained");
                                slots.remove(&owner);
                            }
                        }
                    }
                    SchedulerMsg::Shutdown => {
                        debug!(owners = slots.len(), "scheduler shutting down");
                        // Refuse further submissions, then drain anything
                        // already queued so no waiter is left unresolved.
                        rx.close();
                        while let Ok(msg) = rx.try_recv() {
                            if let SchedulerMsg::Submit { run, .. } = msg {
                                run.cancel();
                            }
                        }
                        for (_, slot) in slots.drain() {
                            if let Some(pending) = slot.pending {
                                pending.cancel();
                            }
                            slot.active.cancel();
                        }
                        break;
                    }
                }
            }
            _ = tick.tick() => {
                trace!("scheduler keep-alive tick");
            }
        }
    }
}

/// Handle to one submitted run.
///
/// Cloneable; every clone observes the same single resolution.
#[derive(Clone)]
pub struct RunHandle {
    inner: Arc<RunInner>,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl RunHandle {
    /// Wait for the run to resolve.
    ///
    /// `Ok(true)` on success, `Ok(false)` when cancelled without error, the
    /// failing task's error otherwise. Any number of waiters, sequential or
    /// concurrent, observe the same resolved value.
    pub async fn wait(&self) -> Result<bool, TaskError> {
        let mut rx = self.outcome.clone();
        let outcome = {
            let value = rx
                .wait_for(Option::is_some)
                .await
                .expect("run resolution channel closed");
            (*value).clone()
        };
        outcome
            .expect("resolved run carries an outcome")
            .into_result()
    }

    /// Cooperatively cancel the run: no further tasks are issued, tasks
    /// already dispatched run to completion
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().unwrap().cancelled
    }
}

struct RunState {
    pending: HashSet<TaskId>,
    active: HashSet<TaskId>,
    finished: HashSet<TaskId>,
    started: bool,
    cancelled: bool,
    resolved: bool,
    error: Option<TaskError>,
}

/// Live execution state for one (owner, schedule) pairing
struct RunInner {
    id: RunId,
    owner: Owner,
    schedule: Arc<Schedule>,
    state: Mutex<RunState>,
    outcome: watch::Sender<Option<RunOutcome>>,
    shared: Arc<Shared>,
}

impl RunInner {
    fn new(id: RunId, owner: Owner, schedule: Arc<Schedule>, shared: Arc<Shared>) -> Arc<Self> {
        let pending: HashSet<TaskId> = schedule.task_ids().collect();
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            id,
            owner,
            schedule,
            state: Mutex::new(RunState {
                pending,
                active: HashSet::new(),
                finished: HashSet::new(),
                started: false,
                cancelled: false,
                resolved: false,
                error: None,
            }),
            outcome,
            shared,
        })
    }

    /// Resolve the completion signal. Called with the state lock held;
    /// idempotent so racing terminal paths collapse to one resolution.
    fn resolve_locked(&self, state: &mut RunState) {
        if state.resolved {
            return;
        }
        state.resolved = true;
        let outcome = match state.error.take() {
            Some(err) => RunOutcome::Failed(err),
            None if state.cancelled => RunOutcome::Cancelled,
            None => RunOutcome::Completed,
        };
        debug!(run = self.id, owner = %self.owner, ?outcome, "run resolved");
        let _ = self.outcome.send(Some(outcome));
    }

    fn notify_finished(&self) {
        let _ = self.shared.tx.send(SchedulerMsg::RunFinished {
            owner: self.owner.clone(),
            run: self.id,
        });
    }

    /// Transition Created -> Started: dispatch every zero-dependency task.
    /// An empty schedule, or a run cancelled before promotion, resolves
    /// immediately.
    fn start(self: &Arc<Self>) {
        let ready = {
            let mut state = self.state.lock().unwrap();
            if state.resolved {
                None
            } else if state.cancelled || state.pending.is_empty() {
                self.resolve_locked(&mut state);
                None
            } else {
                state.started = true;
                Some(self.take_ready_locked(&mut state))
            }
        };
        match ready {
            None => self.notify_finished(),
            Some(ready) => {
                debug!(run = self.id, tasks = ready.len(), "run started");
                for id in ready {
                    self.dispatch(id);
                }
            }
        }
    }

    /// Move every ready pending task into the active set and return it.
    /// Caller holds the state lock.
    fn take_ready_locked(&self, state: &mut RunState) -> Vec<TaskId> {
        let ready: Vec<TaskId> = state
            .pending
            .iter()
            .copied()
            .filter(|id| self.schedule.is_ready(*id, &state.finished))
            .collect();
        for id in &ready {
            state.pending.remove(id);
            state.active.insert(*id);
        }
        ready
    }

    fn dispatch(self: &Arc<Self>, id: TaskId) {
        let run = Arc::clone(self);
        tokio::spawn(async move {
            let permit = run
                .shared
                .workers
                .clone()
                .acquire_owned()
                .await
                .expect("worker pool closed");
            trace!(run = run.id, %id, "task dispatched");

            let task = run.schedule.task(id);
            let queue = Arc::clone(&run.shared.status);
            let result = tokio::task::spawn_blocking(move || {
                let mut progress = Progress::new(queue);
                let result = task.run(&mut progress);
                match &result {
                    Ok(()) => assert!(
                        progress.is_finished(),
                        "{id} returned without signalling completion"
                    ),
                    Err(_) => {
                        if !progress.is_finished() {
                            progress.set_state(TaskState::Failed);
                        }
                    }
                }
                result
            })
            .await;
            drop(permit);

            match result {
                Ok(Ok(())) => run.task_completed(id),
                Ok(Err(err)) => run.task_failed(id, err),
                Err(join_err) => {
                    run.task_failed(id, TaskError::new(format!("task panicked: {join_err}")))
                }
            }
        });
    }

    /// A task finished successfully: propagate readiness, dispatch newly
    /// unblocked tasks, and resolve once pending and active both drain.
    fn task_completed(self: &Arc<Self>, id: TaskId) {
        let (ready, terminal) = {
            let mut state = self.state.lock().unwrap();
            assert!(state.active.remove(&id), "completed {id} was not active");
            state.finished.insert(id);
            let ready = self.take_ready_locked(&mut state);
            let terminal = state.pending.is_empty() && state.active.is_empty();
            if terminal {
                self.resolve_locked(&mut state);
            }
            (ready, terminal)
        };
        trace!(run = self.id, %id, newly_ready = ready.len(), "task completed");
        for next in ready {
            self.dispatch(next);
        }
        if terminal {
            self.notify_finished();
        }
    }

    /// A task failed: never issue another task for this run, record the
    /// first error, and let the remaining active tasks drain naturally.
    fn task_failed(self: &Arc<Self>, id: TaskId, err: TaskError) {
        debug!(run = self.id, %id, error = %err, "task failed");
        let terminal = {
            let mut state = self.state.lock().unwrap();
            assert!(state.active.remove(&id), "failed {id} was not active");
            state.pending.clear();
            state.cancelled = true;
            if state.error.is_none() {
                state.error = Some(err);
            }
            let terminal = state.active.is_empty();
            if terminal {
                self.resolve_locked(&mut state);
            }
            terminal
        };
        if terminal {
            self.notify_finished();
        }
    }

    /// Cooperative cancellation: clears pending immediately; resolution is
    /// deferred until in-flight tasks drain. A run that never started
    /// resolves at once.
    fn cancel(&self) {
        let newly_terminal = {
            let mut state = self.state.lock().unwrap();
            if state.cancelled || state.resolved {
                false
            } else {
                state.cancelled = true;
                state.pending.clear();
                let terminal = !state.started || state.active.is_empty();
                if terminal {
                    self.resolve_locked(&mut state);
                }
                terminal
            }
        };
        if newly_terminal {
            self.notify_finished();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = SchedulerOptions::default();
        assert!(options.concurrency > 0);
        assert_eq!(options.keep_alive, Duration::from_millis(100));
    }

    #[test]
    fn test_owner_key_equality() {
        assert_eq!(Owner::from("editor"), Owner::new("editor"));
        assert_ne!(Owner::from("editor"), Owner::from("compiler"));
        assert_eq!(Owner::from("editor").to_string(), "editor");
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(RunOutcome::Completed.into_result(), Ok(true));
        assert_eq!(RunOutcome::Cancelled.into_result(), Ok(false));
        let err = TaskError::new("boom");
        assert_eq!(
            RunOutcome::Failed(err.clone()).into_result(),
            Err(err)
        );
    }
}
