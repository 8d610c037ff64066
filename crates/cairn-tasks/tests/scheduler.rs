//! End-to-end scheduler behavior: DAG completion, failure containment,
//! cancellation, and per-owner supersession.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cairn_tasks::{
    Owner, Progress, Schedule, Scheduler, SchedulerOptions, StatusQueue, Task, TaskError,
    TaskState,
};

type RunLog = Arc<Mutex<Vec<&'static str>>>;

fn position(log: &RunLog, name: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .position(|n| *n == name)
        .unwrap_or_else(|| panic!("{name} never ran"))
}

fn count(log: &RunLog, name: &str) -> usize {
    log.lock().unwrap().iter().filter(|n| **n == name).count()
}

struct TestTask {
    name: &'static str,
    log: RunLog,
    delay: Duration,
}

impl TestTask {
    fn new(name: &'static str, log: &RunLog) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            delay: Duration::from_millis(1),
        }
    }

    fn slow(name: &'static str, log: &RunLog, delay: Duration) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            delay,
        }
    }
}

impl Task for TestTask {
    fn run(&self, progress: &mut Progress) -> Result<(), TaskError> {
        progress.start(self.name, self.name, self.name);
        std::thread::sleep(self.delay);
        self.log.lock().unwrap().push(self.name);
        progress.set_state(TaskState::Succeeded);
        Ok(())
    }
}

struct FailTask {
    name: &'static str,
}

impl Task for FailTask {
    fn run(&self, progress: &mut Progress) -> Result<(), TaskError> {
        progress.start(self.name, self.name, self.name);
        Err(TaskError::new("fail"))
    }
}

/// Task that violates the completion protocol: returns Ok without ever
/// signalling a finished state.
struct SilentTask;

impl Task for SilentTask {
    fn run(&self, progress: &mut Progress) -> Result<(), TaskError> {
        progress.start("silent", "silent", "silent");
        Ok(())
    }
}

fn scheduler() -> Scheduler {
    Scheduler::new(StatusQueue::new(), SchedulerOptions::default())
}

/// The eight-task DAG: 1->2, 1->3, 3->4, {2,3}->5, 4->6, 5->7, 8 independent.
fn good_schedule(log: &RunLog) -> Arc<Schedule> {
    let mut builder = Schedule::builder();
    let t1 = builder.push(TestTask::new("t1", log), &[]);
    let t2 = builder.push(TestTask::new("t2", log), &[t1]);
    let t3 = builder.push(TestTask::new("t3", log), &[t1]);
    let t4 = builder.push(TestTask::new("t4", log), &[t3]);
    let t5 = builder.push(TestTask::new("t5", log), &[t2, t3]);
    let _t6 = builder.push(TestTask::new("t6", log), &[t4]);
    let _t7 = builder.push(TestTask::new("t7", log), &[t5]);
    let _t8 = builder.push(TestTask::new("t8", log), &[]);
    builder.build()
}

/// Five tasks where t3 fails and t4 depends on {t1, t3}.
fn bad_schedule(log: &RunLog) -> Arc<Schedule> {
    let mut builder = Schedule::builder();
    let t1 = builder.push(TestTask::new("t1", log), &[]);
    let t2 = builder.push(TestTask::new("t2", log), &[t1]);
    let t3 = builder.push(FailTask { name: "t3" }, &[t2]);
    let _t4 = builder.push(TestTask::new("t4", log), &[t1, t3]);
    let _t5 = builder.push(TestTask::new("t5", log), &[]);
    builder.build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dag_completes_each_task_once() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();

    let handle = scheduler.run(Owner::from("build"), good_schedule(&log));
    assert_eq!(handle.wait().await, Ok(true));

    for name in ["t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8"] {
        assert_eq!(count(&log, name), 1, "{name} should run exactly once");
    }

    // Dependencies finish before dependents start.
    assert!(position(&log, "t2") > position(&log, "t1"));
    assert!(position(&log, "t3") > position(&log, "t1"));
    assert!(position(&log, "t4") > position(&log, "t3"));
    assert!(position(&log, "t5") > position(&log, "t2"));
    assert!(position(&log, "t5") > position(&log, "t3"));
    assert!(position(&log, "t6") > position(&log, "t4"));
    assert!(position(&log, "t7") > position(&log, "t5"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_stops_dependents() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();

    let handle = scheduler.run(Owner::from("build"), bad_schedule(&log));
    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.message(), "fail");

    // Nothing downstream of the failed task ever launches.
    assert_eq!(count(&log, "t4"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_schedule_completes_immediately() {
    let scheduler = scheduler();
    let handle = scheduler.run(Owner::from("build"), Schedule::builder().build());
    assert_eq!(handle.wait().await, Ok(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_stops_pending_tasks() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();

    let mut builder = Schedule::builder();
    let t1 = builder.push(
        TestTask::slow("t1", &log, Duration::from_millis(50)),
        &[],
    );
    let _t2 = builder.push(TestTask::new("t2", &log), &[t1]);

    let handle = scheduler.run(Owner::from("build"), builder.build());
    handle.cancel();

    assert_eq!(handle.wait().await, Ok(false));
    assert!(handle.is_cancelled());
    assert_eq!(count(&log, "t2"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_supersession_waits_for_active_to_drain() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();
    let owner = Owner::from("editor");

    let mut builder = Schedule::builder();
    let a1 = builder.push(
        TestTask::slow("a1", &log, Duration::from_millis(50)),
        &[],
    );
    let _a2 = builder.push(TestTask::new("a2", &log), &[a1]);
    let schedule_a = builder.build();

    let mut builder = Schedule::builder();
    let _b1 = builder.push(TestTask::new("b1", &log), &[]);
    let schedule_b = builder.build();

    let handle_a = scheduler.run(owner.clone(), schedule_a);
    let handle_b = scheduler.run(owner, schedule_b);

    assert_eq!(handle_a.wait().await, Ok(false));
    assert_eq!(handle_b.wait().await, Ok(true));

    // a1 was already in flight and ran to completion; a2 never started;
    // b1 only ran once the superseded run had fully drained.
    assert_eq!(count(&log, "a1"), 1);
    assert_eq!(count(&log, "a2"), 0);
    assert_eq!(count(&log, "b1"), 1);
    assert!(position(&log, "b1") > position(&log, "a1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_superseded_pending_run_never_starts() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();
    let owner = Owner::from("editor");

    let mut builder = Schedule::builder();
    let _a1 = builder.push(
        TestTask::slow("a1", &log, Duration::from_millis(50)),
        &[],
    );
    let schedule_a = builder.build();

    let mut builder = Schedule::builder();
    let _b1 = builder.push(TestTask::new("b1", &log), &[]);
    let schedule_b = builder.build();

    let mut builder = Schedule::builder();
    let _c1 = builder.push(TestTask::new("c1", &log), &[]);
    let schedule_c = builder.build();

    let handle_a = scheduler.run(owner.clone(), schedule_a);
    let handle_b = scheduler.run(owner.clone(), schedule_b);
    let handle_c = scheduler.run(owner, schedule_c);

    // B occupied the pending slot only until C arrived; it never ran a task.
    assert_eq!(handle_b.wait().await, Ok(false));
    assert_eq!(count(&log, "b1"), 0);

    assert_eq!(handle_a.wait().await, Ok(false));
    assert_eq!(handle_c.wait().await, Ok(true));
    assert_eq!(count(&log, "c1"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runs_for_different_owners_are_independent() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();

    let mut builder = Schedule::builder();
    let _a = builder.push(TestTask::new("a", &log), &[]);
    let schedule_a = builder.build();

    let mut builder = Schedule::builder();
    let _b = builder.push(FailTask { name: "b" }, &[]);
    let schedule_b = builder.build();

    let handle_a = scheduler.run(Owner::from("one"), schedule_a);
    let handle_b = scheduler.run(Owner::from("two"), schedule_b);

    // A failing run for one owner leaves the other owner's run untouched.
    assert_eq!(handle_a.wait().await, Ok(true));
    assert!(handle_b.wait().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_waiter_observes_the_same_resolution() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();

    let handle = scheduler.run(Owner::from("build"), good_schedule(&log));
    let other = handle.clone();

    let (first, second) = tokio::join!(handle.wait(), other.wait());
    assert_eq!(first, Ok(true));
    assert_eq!(second, Ok(true));

    // A waiter arriving after resolution sees the same value.
    assert_eq!(handle.wait().await, Ok(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_task_is_a_protocol_violation() {
    let scheduler = scheduler();

    let mut builder = Schedule::builder();
    let _t = builder.push(SilentTask, &[]);
    let handle = scheduler.run(Owner::from("build"), builder.build());

    let err = handle.wait().await.unwrap_err();
    assert!(err.message().contains("panicked"), "got: {err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_cancels_live_runs() {
    let log: RunLog = Arc::default();
    let scheduler = scheduler();

    let mut builder = Schedule::builder();
    let t1 = builder.push(
        TestTask::slow("t1", &log, Duration::from_millis(200)),
        &[],
    );
    let _t2 = builder.push(TestTask::new("t2", &log), &[t1]);

    let handle = scheduler.run(Owner::from("build"), builder.build());
    scheduler.shutdown();

    assert_eq!(handle.wait().await, Ok(false));
    assert_eq!(count(&log, "t2"), 0);

    // Submissions after shutdown resolve as cancelled without running.
    let mut builder = Schedule::builder();
    let _t3 = builder.push(TestTask::new("t3", &log), &[]);
    let late = scheduler.run(Owner::from("build"), builder.build());
    assert_eq!(late.wait().await, Ok(false));
    assert_eq!(count(&log, "t3"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_records_flow_to_the_queue() {
    let queue = StatusQueue::new();
    let scheduler = Scheduler::new(Arc::clone(&queue), SchedulerOptions::default());
    let log: RunLog = Arc::default();

    let mut builder = Schedule::builder();
    let _t = builder.push(TestTask::new("compile", &log), &[]);
    let handle = scheduler.run(Owner::from("build"), builder.build());
    assert_eq!(handle.wait().await, Ok(true));

    let started = queue.try_pop().unwrap();
    assert_eq!(started.state, TaskState::Started);
    assert_eq!(started.task_name, "compile");

    let finished = queue.try_pop().unwrap();
    assert_eq!(finished.state, TaskState::Succeeded);
    assert!(finished.elapsed.is_some());
    assert!(queue.is_empty());
}
