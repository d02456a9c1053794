//! Builds the tasks of a priority level from the robot state.
//!
//! Tasks only read the shared, immutable [RobotState] and each produces its own matrices,
//! so a level's tasks can be built on several worker threads. Collecting the results is
//! the synchronization barrier before aggregation.

use std::{sync::Arc, thread};

use crossbeam_channel::unbounded;
use log::error;

use crate::{
    state::robot_state::RobotState,
    task::{Task, TaskSpecification},
    Error,
};

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;

/// Builds every task of a level, keeping the order of the specifications.
///
/// A task that fails to build does not affect the other tasks. A task whose worker
/// stops without producing a result is reported as [Error::TaskBuildInterrupted].
///
/// ## Parameters
///
/// * 'specifications' - The tasks of the level
/// * 'state' - The snapshot of the robot for the current cycle
/// * 'worker_threads' - The maximum number of threads to build the tasks on. With one
///   thread the tasks are built on the calling thread.
pub fn build_level_tasks(
    specifications: &[Arc<dyn TaskSpecification>],
    state: &RobotState,
    worker_threads: usize,
) -> Vec<Result<Task, Error>> {
    let workers = worker_threads.min(specifications.len());
    if workers <= 1 {
        return specifications.iter().map(|s| s.build(state)).collect();
    }

    build_in_parallel(specifications, state, workers)
}

#[cfg_attr(test, mutants::skip)] // Thread coordination; covered by the ordering tests.
fn build_in_parallel(
    specifications: &[Arc<dyn TaskSpecification>],
    state: &RobotState,
    workers: usize,
) -> Vec<Result<Task, Error>> {
    let (sender, receiver) = unbounded::<(usize, Result<Task, Error>)>();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let sender = sender.clone();
                scope.spawn(move || {
                    for index in (worker..specifications.len()).step_by(workers) {
                        let result = specifications[index].build(state);
                        if sender.send((index, result)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        // Join explicitly so a panicking task does not propagate out of the scope.
        for handle in handles {
            if handle.join().is_err() {
                error!("A task building worker panicked");
            }
        }
    });
    drop(sender);

    let mut results: Vec<Option<Result<Task, Error>>> =
        (0..specifications.len()).map(|_| None).collect();
    for (index, result) in receiver.try_iter() {
        results[index] = Some(result);
    }

    results
        .into_iter()
        .zip(specifications.iter())
        .map(|(result, specification)| {
            result.unwrap_or_else(|| {
                Err(Error::TaskBuildInterrupted {
                    task: specification.name().to_string(),
                })
            })
        })
        .collect()
}
