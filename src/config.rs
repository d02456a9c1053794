//! Defines the configuration surface of the engine.
//!
//! [StackConfig] holds the numerical and fault handling options of a priority stack.
//! [ControllerConfig] additionally describes the levels and their tasks so that a whole
//! hierarchy can be loaded from a TOML document:
//!
//! ```toml
//! variable_space = "kinematic_velocity"
//!
//! [engine]
//! composition = "null_space"
//! infeasibility_policy = "hard_fail"
//! level_time_budget_us = 500
//!
//! [[levels]]
//! name = "limits"
//!
//! [[levels.tasks]]
//! kind = "joint_limits"
//! name = "limits"
//!
//! [[levels]]
//! name = "posture"
//!
//! [[levels.tasks]]
//! kind = "posture"
//! name = "home"
//! weight = 0.5
//! parameters = { target = [0.0, 0.0] }
//! ```

use std::{collections::HashSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{null_space::RankTolerance, variable_space::VariableSpace, Error};

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;

const fn default_activity_tolerance() -> f64 {
    1e-6
}
const fn default_residual_tolerance() -> f64 {
    1e-6
}
const fn default_true() -> bool {
    true
}
const fn default_max_consecutive_timeouts() -> u32 {
    3
}
const fn default_worker_threads() -> usize {
    1
}
const fn default_max_iterations() -> u32 {
    200
}
const fn default_solver_tolerance() -> f64 {
    1e-9
}
const fn default_consistency_tolerance() -> f64 {
    1e-7
}
const fn default_task_weight() -> f64 {
    1.0
}

/// Defines how the solution of a level is protected from the levels below it.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionStrategy {
    /// Lower levels only act in the null space of the active rows of the levels above.
    #[default]
    NullSpace,

    /// The active rows of the levels above are added to lower levels as equalities.
    AugmentedEquality,
}

/// Defines what happens when a level is infeasible.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibilityPolicy {
    /// Drop the inequality rows of the least important task of the level and retry.
    #[default]
    Relax,

    /// Give up on the level, record a fault and fall back to a safe command.
    HardFail,
}

/// The iteration and tolerance settings of the quadratic program solver.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SolverSettings {
    /// The maximum number of interior point iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// The absolute duality gap tolerance.
    #[serde(default = "default_solver_tolerance")]
    pub tolerance_gap_abs: f64,

    /// The relative duality gap tolerance.
    #[serde(default = "default_solver_tolerance")]
    pub tolerance_gap_rel: f64,

    /// The feasibility tolerance.
    #[serde(default = "default_solver_tolerance")]
    pub tolerance_feasibility: f64,

    /// The relative tolerance used to decide if an equality-only program is consistent
    /// and bounded, and if a degenerate row is satisfied.
    #[serde(default = "default_consistency_tolerance")]
    pub tolerance_consistency: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance_gap_abs: default_solver_tolerance(),
            tolerance_gap_rel: default_solver_tolerance(),
            tolerance_feasibility: default_solver_tolerance(),
            tolerance_consistency: default_consistency_tolerance(),
        }
    }
}

impl SolverSettings {
    /// Checks that the settings are within their allowed ranges.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when the iteration count is zero or a
    ///   tolerance is not a positive, finite number.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfiguration {
                field: "solver.max_iterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        check_positive("solver.tolerance_gap_abs", self.tolerance_gap_abs)?;
        check_positive("solver.tolerance_gap_rel", self.tolerance_gap_rel)?;
        check_positive("solver.tolerance_feasibility", self.tolerance_feasibility)?;
        check_positive("solver.tolerance_consistency", self.tolerance_consistency)
    }
}

/// The options of a priority stack.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StackConfig {
    /// How the levels are composed.
    #[serde(default)]
    pub composition: CompositionStrategy,

    /// The numerical rank tolerance of the null space computation.
    #[serde(default)]
    pub rank_tolerance: RankTolerance,

    /// An inequality row is active when its slack is at most this value or its
    /// multiplier exceeds it.
    #[serde(default = "default_activity_tolerance")]
    pub activity_tolerance: f64,

    /// The allowed change of the residual of a level caused by the levels below it.
    #[serde(default = "default_residual_tolerance")]
    pub residual_tolerance: f64,

    /// What happens when a level is infeasible.
    #[serde(default)]
    pub infeasibility_policy: InfeasibilityPolicy,

    /// The time budget of a single level solve in microseconds. Unlimited when missing.
    #[serde(default)]
    pub level_time_budget_us: Option<u64>,

    /// Keep the command of the previous cycle as the fallback for degraded cycles.
    #[serde(default = "default_true")]
    pub warm_start: bool,

    /// The number of consecutive timed out cycles after which the fault is escalated.
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,

    /// The number of threads used to build the tasks of a level.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// The settings of the quadratic program solver.
    #[serde(default)]
    pub solver: SolverSettings,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            composition: CompositionStrategy::default(),
            rank_tolerance: RankTolerance::default(),
            activity_tolerance: default_activity_tolerance(),
            residual_tolerance: default_residual_tolerance(),
            infeasibility_policy: InfeasibilityPolicy::default(),
            level_time_budget_us: None,
            warm_start: default_true(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            worker_threads: default_worker_threads(),
            solver: SolverSettings::default(),
        }
    }
}

impl StackConfig {
    /// Loads and validates the options from a TOML file.
    ///
    /// ## Errors
    ///
    /// * [Error::ConfigurationIo] - Returned when the file cannot be read.
    /// * [Error::ConfigurationParse] - Returned when the file is not valid TOML.
    /// * [Error::InvalidConfiguration] - Returned when an option is out of range.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = read_file(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates the options from a TOML document.
    ///
    /// ## Errors
    ///
    /// * [Error::ConfigurationParse] - Returned when the document is not valid TOML.
    /// * [Error::InvalidConfiguration] - Returned when an option is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigurationParse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the time budget of a single level solve.
    pub fn level_time_budget(&self) -> Option<Duration> {
        self.level_time_budget_us.map(Duration::from_micros)
    }

    /// Checks that the options are within their allowed ranges.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when an option is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        self.rank_tolerance.validate()?;
        check_positive("activity_tolerance", self.activity_tolerance)?;
        check_positive("residual_tolerance", self.residual_tolerance)?;

        if self.level_time_budget_us == Some(0) {
            return Err(Error::InvalidConfiguration {
                field: "level_time_budget_us".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }

        if self.max_consecutive_timeouts == 0 {
            return Err(Error::InvalidConfiguration {
                field: "max_consecutive_timeouts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.worker_threads == 0 {
            return Err(Error::InvalidConfiguration {
                field: "worker_threads".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        self.solver.validate()
    }
}

/// Describes a single task of a level.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TaskDescriptor {
    /// The registered kind of the task.
    pub kind: String,

    /// The name of the task, unique within the hierarchy.
    pub name: String,

    /// The scalar weight of the task within its level.
    #[serde(default = "default_task_weight")]
    pub weight: f64,

    /// The kind specific parameters of the task.
    #[serde(default)]
    pub parameters: toml::Table,
}

/// Describes a single priority level.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LevelDescriptor {
    /// The name of the level, used in reports.
    pub name: String,

    /// The tasks of the level.
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
}

/// Describes a complete hierarchy: the variable space, the engine options and the levels
/// from the highest to the lowest priority.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ControllerConfig {
    /// The variable space shared by all tasks.
    pub variable_space: VariableSpace,

    /// The options of the priority stack.
    #[serde(default)]
    pub engine: StackConfig,

    /// The levels, highest priority first.
    #[serde(default)]
    pub levels: Vec<LevelDescriptor>,
}

impl ControllerConfig {
    /// Loads and validates a hierarchy from a TOML file.
    ///
    /// ## Errors
    ///
    /// * [Error::ConfigurationIo] - Returned when the file cannot be read.
    /// * [Error::ConfigurationParse] - Returned when the file is not valid TOML.
    /// * [Error::InvalidConfiguration] - Returned when an option is out of range.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = read_file(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a hierarchy from a TOML document.
    ///
    /// ## Errors
    ///
    /// * [Error::ConfigurationParse] - Returned when the document is not valid TOML.
    /// * [Error::InvalidConfiguration] - Returned when an option is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigurationParse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the engine options and the task descriptors.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when an engine option is out of range,
    ///   when two tasks share a name or when a task weight is negative or not finite.
    pub fn validate(&self) -> Result<(), Error> {
        self.engine.validate()?;

        let mut names = HashSet::new();
        for task in self.levels.iter().flat_map(|level| level.tasks.iter()) {
            if !names.insert(task.name.as_str()) {
                return Err(Error::InvalidConfiguration {
                    field: format!("levels.tasks.{}", task.name),
                    message: "task names must be unique".to_string(),
                });
            }

            if !task.weight.is_finite() || task.weight < 0.0 {
                return Err(Error::InvalidConfiguration {
                    field: format!("levels.tasks.{}.weight", task.name),
                    message: format!("must be a finite, non-negative number, got {}", task.weight),
                });
            }
        }

        Ok(())
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::InvalidConfiguration {
            field: field.to_string(),
            message: format!("must be a positive, finite number, got {}", value),
        });
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::ConfigurationIo {
        message: format!("{}: {}", path.display(), e),
    })
}
