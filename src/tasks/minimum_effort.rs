use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::{
    config::TaskDescriptor,
    state::robot_state::RobotState,
    task::{Task, TaskKind, TaskSpecification},
    variable_space::{VariableLayout, VariableSpace},
    Error,
};

use super::parse_parameters;

#[cfg(test)]
#[path = "minimum_effort_tests.rs"]
mod minimum_effort_tests;

#[derive(Deserialize)]
struct MinimumEffortParameters {
    #[serde(default)]
    include_forces: bool,
}

/// Pulls the joint part of the variable, and optionally the contact forces, towards zero.
///
/// Usually placed on the lowest level, where it picks the smallest command out of the
/// freedom the other levels leave behind.
pub struct MinimumEffortTask {
    name: String,
    space: VariableSpace,
    include_forces: bool,
    weight: f64,
}

impl MinimumEffortTask {
    /// Creates the task from a configuration descriptor.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidTaskParameters] - Returned when the parameters cannot be read.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let parameters: MinimumEffortParameters = parse_parameters(descriptor)?;
        Ok(Arc::new(
            Self::new(descriptor.name.clone(), space, descriptor.weight)
                .with_forces(parameters.include_forces),
        ))
    }

    /// Creates a new task that only regularizes the joint part of the variable.
    pub fn new(name: impl Into<String>, space: VariableSpace, weight: f64) -> Self {
        Self {
            name: name.into(),
            space,
            include_forces: false,
            weight,
        }
    }

    /// Sets whether the contact forces are regularized as well. Only meaningful for the
    /// dynamic variable space.
    pub fn with_forces(mut self, include_forces: bool) -> Self {
        self.include_forces = include_forces;
        self
    }
}

impl TaskSpecification for MinimumEffortTask {
    fn build(&self, state: &RobotState) -> Result<Task, Error> {
        let layout = VariableLayout::for_state(self.space, state);
        let rows = if self.include_forces {
            layout.dimension()
        } else {
            layout.joint_count()
        };

        let matrix = DMatrix::identity(rows, layout.dimension());

        Task::new(self.name.clone(), self.space, layout.dimension())
            .with_objective(matrix, DVector::zeros(rows))?
            .with_scalar_weight(self.weight)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::MinimumEffort
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn variable_space(&self) -> VariableSpace {
        self.space
    }
}
