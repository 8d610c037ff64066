//! Cairn Tasks - Dependency-aware task scheduling
//!
//! This crate provides the execution core of the build toolchain: an
//! immutable schedule of tasks wired into a DAG, a progress/status channel
//! drained by an external reporter, and a scheduler that runs schedules
//! with bounded parallelism, cooperative cancellation, and per-owner
//! supersession of in-flight runs.

pub mod progress;
pub mod schedule;
pub mod scheduler;
pub mod task;

pub use progress::{Progress, Status, StatusQueue, TaskState};
pub use schedule::{Schedule, ScheduleBuilder, TaskId};
pub use scheduler::{Owner, RunHandle, RunOutcome, Scheduler, SchedulerOptions};
pub use task::{Task, TaskError};
