//! Bounded-concurrency execution of a process's resources.
//!
//! The concurrency degree is the total resource count across all of the
//! process's operations: the pool has exactly one worker per resource.
//! Every resource gets its own outcome slot — a failing resource never
//! affects its siblings. Gathering is bounded by a shutdown deadline;
//! workers still running past it are abandoned and their slot reports
//! [`ResourceError::Cancelled`].

use crate::task::{Process, ProcessError, Resource, ResourceError};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Per-resource outcome of one [`run_process`] call, in resource order.
pub type ProcessOutcome = Vec<Result<(), ResourceError>>;

/// Execute every resource of `process` concurrently.
///
/// Fails with [`ProcessError::Empty`] when the process has no operations.
/// Otherwise returns one outcome per resource, in the order the resources
/// appear across the operations.
pub fn run_process(process: &Process, timeout: Duration) -> Result<ProcessOutcome, ProcessError> {
    let resources: Vec<Resource> = process
        .operations()
        .iter()
        .flat_map(|op| op.resources().iter().cloned())
        .collect();
    if resources.is_empty() {
        return Err(ProcessError::Empty);
    }

    let degree = resources.len();
    let (sender, receiver) = mpsc::channel::<(usize, Result<(), ResourceError>)>();

    let mut handles = Vec::with_capacity(degree);
    for (index, resource) in resources.into_iter().enumerate() {
        let sender = sender.clone();
        let handle = std::thread::Builder::new()
            .name(format!("waresim-worker-{index}"))
            .spawn(move || {
                let outcome = resource.execute();
                // The gatherer may have given up already; that's fine.
                let _ = sender.send((index, outcome));
            });
        match handle {
            Ok(handle) => handles.push(handle),
            Err(error) => {
                log::error!("failed to spawn worker {index}: {error}");
            }
        }
    }
    drop(sender);

    // Gather one outcome per resource until the deadline.
    let deadline = Instant::now() + timeout;
    let mut outcomes: Vec<Option<Result<(), ResourceError>>> = vec![None; degree];
    let mut received = 0usize;
    while received < degree {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok((index, outcome)) => {
                if outcomes[index].is_none() {
                    outcomes[index] = Some(outcome);
                    received += 1;
                }
            }
            Err(_) => break, // deadline passed or all senders gone
        }
    }

    // Drain the pool: join finished workers, abandon the rest.
    for handle in handles {
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            log::warn!(
                "worker {:?} still running past the shutdown deadline, abandoning",
                handle.thread().name().unwrap_or("?")
            );
        }
    }

    Ok(outcomes
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(ResourceError::Cancelled)))
        .collect())
}
