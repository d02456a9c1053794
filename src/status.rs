//! Defines the record that describes how a control cycle went.
//!
//! Faults and warnings never abort a cycle. They are collected per level and attached to
//! the [CycleRecord] so that the actuation layer can decide what to do with a degraded
//! command.

use std::{fmt::Display, time::Duration};

use nalgebra::DVector;

use crate::{qp::QpStatus, state::robot_state::SnapshotVersion, Error};

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;

/// The overall outcome of a control cycle, from best to worst.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CycleStatus {
    /// Every level was solved as specified.
    Optimal,

    /// Every level was solved, but some inequality rows had to be dropped.
    Relaxed,

    /// At least one fault occurred. The command is either the computed solution (when
    /// only tasks were rejected) or the fallback command.
    Degraded,

    /// Timeouts persisted for too many consecutive cycles. The command is the zero vector.
    Escalated,
}

impl Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CycleStatus::Optimal => "optimal",
            CycleStatus::Relaxed => "relaxed",
            CycleStatus::Degraded => "degraded",
            CycleStatus::Escalated => "escalated",
        };
        write!(f, "{}", name)
    }
}

/// A non-fatal condition that was noticed during a cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    /// The rank decision of a level was numerically fragile.
    RankDeficiency {
        /// The index of the level
        level: usize,
        /// The rank that was decided
        rank: usize,
        /// The number of active rows of the level
        rows: usize,
    },

    /// A level used up all remaining freedom. The levels below it cannot change the
    /// solution any more.
    SaturatedHierarchy {
        /// The index of the level
        level: usize,
    },
}

/// A failure that was captured during a cycle.
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum Fault {
    /// A task could not be built and was left out of its level.
    #[error("Task {task} was rejected: {error}")]
    MalformedTask {
        /// The name of the task
        task: String,
        /// The reason the task was rejected
        error: Error,
    },

    /// A level could not be solved because its constraints contradict each other.
    #[error("Level {level} is infeasible")]
    InfeasibleLevel {
        /// The index of the level
        level: usize,
    },

    /// A level could not be solved because its objective has no lower bound.
    #[error("Level {level} is unbounded")]
    UnboundedLevel {
        /// The index of the level
        level: usize,
    },

    /// The solve of a level did not finish within its time budget.
    #[error("Level {level} did not finish within {budget:?}")]
    SolverTimeout {
        /// The index of the level
        level: usize,
        /// The time budget of the level
        budget: Duration,
    },

    /// The solver failed on a level.
    #[error("The solver failed on level {level}: {message}")]
    SolverFailure {
        /// The index of the level
        level: usize,
        /// A description of the failure
        message: String,
    },
}

impl Fault {
    /// Returns true if the fault invalidates the computed command, so that the fallback
    /// command is used instead.
    pub fn requires_fallback(&self) -> bool {
        !matches!(self, Fault::MalformedTask { .. })
    }
}

/// Records the inequality rows that were dropped to make a level feasible.
#[derive(Clone, Debug, PartialEq)]
pub struct Relaxation {
    /// The task whose inequality rows were dropped.
    pub task: String,

    /// The number of rows that were dropped.
    pub rows: usize,
}

/// Describes how a single level was solved.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelReport {
    /// The index of the level, zero being the highest priority.
    pub index: usize,

    /// The name of the level.
    pub name: String,

    /// The status of the last solve of the level, if it was solved at all.
    pub solver_status: Option<QpStatus>,

    /// The number of equality rows of the level.
    pub equality_rows: usize,

    /// The number of inequality rows of the level, including the rows inherited from
    /// the levels above.
    pub inequality_rows: usize,

    /// The number of inequality rows that were active at the solution.
    pub active_inequalities: usize,

    /// The dimension of the free subspace left after the level. Only computed by the
    /// null space composition.
    pub free_dimension: Option<usize>,

    /// The weighted objective residual of the level at its own solution.
    pub residual: f64,

    /// The weighted objective residual of the level at the final command.
    pub final_residual: f64,

    /// The inequality rows that were dropped.
    pub relaxations: Vec<Relaxation>,

    /// The faults of the level.
    pub faults: Vec<Fault>,

    /// The warnings of the level.
    pub warnings: Vec<Warning>,

    /// The number of solver iterations of the level.
    pub iterations: u32,

    /// The time spent solving the level.
    pub solve_time: Duration,
}

impl LevelReport {
    /// Creates an empty report for the given level.
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            solver_status: None,
            equality_rows: 0,
            inequality_rows: 0,
            active_inequalities: 0,
            free_dimension: None,
            residual: 0.0,
            final_residual: 0.0,
            relaxations: vec![],
            faults: vec![],
            warnings: vec![],
            iterations: 0,
            solve_time: Duration::ZERO,
        }
    }
}

/// Describes how a control cycle went.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleRecord {
    /// The overall outcome of the cycle.
    pub status: CycleStatus,

    /// The version of the robot state the cycle was computed from, if any.
    pub snapshot: Option<SnapshotVersion>,

    /// The reports of the levels, highest priority first.
    pub levels: Vec<LevelReport>,

    /// True if the command is the fallback rather than the computed solution.
    pub used_fallback: bool,

    /// The number of consecutive cycles that ended in a timeout, this one included.
    pub consecutive_timeouts: u32,

    /// The time the whole cycle took.
    pub elapsed: Duration,
}

impl CycleRecord {
    /// Returns all faults of the cycle.
    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.levels.iter().flat_map(|level| level.faults.iter())
    }

    /// Returns true if any level reported the given kind of fault.
    pub fn has_fault(&self, predicate: impl Fn(&Fault) -> bool) -> bool {
        self.faults().any(predicate)
    }

    /// Returns all warnings of the cycle.
    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.levels.iter().flat_map(|level| level.warnings.iter())
    }
}

/// The result of a control cycle: the command for the actuation layer and the record
/// describing how it was obtained.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleOutput {
    /// The control vector.
    pub command: DVector<f64>,

    /// The status record of the cycle.
    pub record: CycleRecord,
}
