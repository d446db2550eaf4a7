//! Task and orchestration layer for the warehouse simulation.
//!
//! Builds on `waresim-core`: the [`task`] module models deliveries as
//! Task -> Process -> Operation -> Resource, [`executor`] runs a process's
//! resources on a bounded worker pool, [`dispatch`] binds tasks to idle
//! AGVs and recycles aborted ones, and [`context`] wires everything to the
//! simulation clock.

pub mod context;
pub mod dispatch;
pub mod executor;
pub mod task;

pub use context::SimContext;
pub use dispatch::AgvTaskDispatcher;
pub use executor::{ProcessOutcome, run_process};
pub use task::{Operation, Process, Resource, ResourceError, ResourceKind, Task};
