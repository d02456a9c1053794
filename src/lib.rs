#![warn(missing_docs)]

//! Hierarchical stack-of-tasks solver for whole-body robot control.
//!
//! Control objectives (balance, end-effector tracking, joint limits, contact
//! consistency, ...) are expressed as [task::Task]s: weighted least-squares objectives
//! plus linear equality and inequality constraints over a single control vector. Tasks
//! of equal importance are merged into one [aggregator::TaskSet] (soft priority) and the
//! task sets are solved in strict precedence order by the [stack::PriorityStack] (hard
//! priority), each level restricted to the freedom the higher levels leave behind.
//!
//! The control vector is either kinematic (joint position deltas or joint velocities) or
//! dynamic (joint accelerations stacked with contact forces), see
//! [variable_space::VariableSpace].

use thiserror::Error;

use crate::variable_space::VariableSpace;

/// Aggregates the tasks of a single priority level into one quadratic program.
pub mod aggregator;

/// Builds the tasks of a priority level, possibly on several worker threads.
pub mod builder;

/// Defines the configuration surface of the engine.
pub mod config;

mod linalg;

/// Computes the null space that lower priority levels are allowed to act in.
pub mod null_space;

/// Defines the canonical quadratic program and its solution.
pub mod qp;

/// Provides the explicit registration table for task kinds.
pub mod registry;

/// Defines the quadratic program solver capability and the Clarabel backend.
pub mod solver;

/// Defines the hierarchical priority stack.
pub mod stack;

/// Provides the robot state snapshot that tasks are built from.
pub mod state;

/// Defines the per-cycle status record.
pub mod status;

/// Provides the shared, externally updated task targets.
pub mod target;

/// Defines a single task and the capability to build one from the robot state.
pub mod task;

/// Provides the built-in task kinds.
pub mod tasks;

/// Defines the different optimization variable spaces.
pub mod variable_space;

/// Defines the different errors for the stack of tasks crate.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that the matrices of a task do not agree with each other or with the
    /// declared variable space.
    #[error("Task {task} is malformed: {reason}")]
    MalformedTask {
        /// The name of the task
        task: String,
        /// A description of the problem
        reason: String,
    },

    /// Indicates that the weight matrix of a task is not positive semi-definite.
    #[error("Task {task} has a weight matrix that is not positive semi-definite. The smallest eigenvalue is {smallest_eigenvalue}")]
    SingularWeight {
        /// The name of the task
        task: String,
        /// The smallest eigenvalue of the weight matrix
        smallest_eigenvalue: f64,
    },

    /// Indicates that a task does not use the variable space of the level it was added to.
    #[error("Task {task} uses the {found} variable space but {expected} was expected")]
    VariableSpaceMismatch {
        /// The name of the task
        task: String,
        /// The variable space that was expected
        expected: VariableSpace,
        /// The variable space of the task
        found: VariableSpace,
    },

    /// Indicates that two pieces of data that should have the same size do not.
    #[error("Expected {what} to have size {expected}, but it has size {found}")]
    DimensionMismatch {
        /// A description of the data that has the wrong size
        what: String,
        /// The expected size
        expected: usize,
        /// The actual size
        found: usize,
    },

    /// Indicates that the robot state does not provide a quantity a task needs.
    #[error("The robot state does not provide {quantity}")]
    MissingStateQuantity {
        /// The name of the missing quantity
        quantity: String,
    },

    /// Indicates that a configuration value is outside its allowed range.
    #[error("Invalid value for {field}: {message}")]
    InvalidConfiguration {
        /// The name of the configuration field
        field: String,
        /// A description of the problem
        message: String,
    },

    /// Indicates that a configuration file could not be read.
    #[error("Failed to read the configuration: {message}")]
    ConfigurationIo {
        /// The reason the file could not be read
        message: String,
    },

    /// Indicates that a configuration document could not be parsed.
    #[error("Failed to parse the configuration: {message}")]
    ConfigurationParse {
        /// The reason the document could not be parsed
        message: String,
    },

    /// Indicates that no task kind with the given name is registered.
    #[error("No task kind named {kind} is registered")]
    UnknownTaskKind {
        /// The name of the task kind
        kind: String,
    },

    /// Indicates that a task kind with the given name was already registered.
    #[error("A task kind named {kind} is already registered")]
    DuplicateTaskKind {
        /// The name of the task kind
        kind: String,
    },

    /// Indicates that the parameters for a task kind could not be interpreted.
    #[error("Invalid parameters for task {task}: {message}")]
    InvalidTaskParameters {
        /// The name of the task
        task: String,
        /// A description of the problem
        message: String,
    },

    /// Indicates that an aggregation was requested without any tasks.
    #[error("Cannot aggregate an empty list of tasks")]
    EmptyLevel,

    /// Indicates that a task could not be built because its worker stopped.
    #[error("Building task {task} was interrupted")]
    TaskBuildInterrupted {
        /// The name of the task
        task: String,
    },

    /// Indicates that the quadratic program solver could not process a problem.
    #[error("The quadratic program solver failed: {message}")]
    SolverFailure {
        /// A description of the failure
        message: String,
    },
}
