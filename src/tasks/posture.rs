use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::{
    config::TaskDescriptor,
    state::robot_state::RobotState,
    target::{Gains, TargetHandle, TaskTarget},
    task::{Task, TaskKind, TaskSpecification},
    variable_space::{VariableLayout, VariableSpace},
    Error,
};

use super::{optional_vector, parse_parameters};

#[cfg(test)]
#[path = "posture_tests.rs"]
mod posture_tests;

#[derive(Deserialize)]
struct PostureParameters {
    target: Vec<f64>,
    #[serde(default)]
    velocity: Option<Vec<f64>>,
    #[serde(default)]
    gains: Gains,
}

/// Drives every joint towards a target position.
///
/// The position error of a joint is the shortest displacement in the space of the joint,
/// so continuous joints never take the long way around. Depending on the variable space
/// the joint rows ask for:
///
/// * kinematic position: `Δq = e`
/// * kinematic velocity: `q̇ = q̇_d + Kp e`
/// * dynamic: `q̈ = q̈_d + Kp e + Kd (q̇_d − q̇)`
pub struct PostureTask {
    name: String,
    space: VariableSpace,
    target: TargetHandle,
    gains: Gains,
    weight: f64,
}

impl PostureTask {
    /// Creates the task from a configuration descriptor.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidTaskParameters] - Returned when the parameters do not hold a target.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let parameters: PostureParameters = parse_parameters(descriptor)?;

        let mut target = TaskTarget::new(DVector::from_vec(parameters.target));
        if let Some(velocity) = optional_vector(&parameters.velocity) {
            target = target.with_velocity(velocity);
        }

        Ok(Arc::new(Self::new(
            descriptor.name.clone(),
            space,
            target,
            parameters.gains,
            descriptor.weight,
        )))
    }

    /// Creates a new posture task.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the task
    /// * 'space' - The variable space of the task
    /// * 'target' - The initial target, one entry per joint
    /// * 'gains' - The feedback gains
    /// * 'weight' - The weight of the task within its level
    pub fn new(
        name: impl Into<String>,
        space: VariableSpace,
        target: TaskTarget,
        gains: Gains,
        weight: f64,
    ) -> Self {
        Self {
            name: name.into(),
            space,
            target: TargetHandle::new(target),
            gains,
            weight,
        }
    }
}

impl TaskSpecification for PostureTask {
    fn build(&self, state: &RobotState) -> Result<Task, Error> {
        let layout = VariableLayout::for_state(self.space, state);
        let target = self.target.get();
        let joints = state.joints();
        if target.dimension() != joints.len() {
            return Err(Error::MalformedTask {
                task: self.name.clone(),
                reason: format!(
                    "the target has {} entries but the robot has {} joints",
                    target.dimension(),
                    joints.len()
                ),
            });
        }

        let error = DVector::from_fn(joints.len(), |i, _| {
            joints[i]
                .space()
                .shortest_error(joints[i].state().position(), target.position()[i])
        });

        let desired = match self.space {
            VariableSpace::KinematicPosition => error,
            VariableSpace::KinematicVelocity => {
                target.velocity_or_zero() + error * self.gains.proportional
            }
            VariableSpace::DynamicAccelerationForce => {
                let velocity_error = target.velocity_or_zero() - state.joint_velocities();
                target.acceleration_or_zero()
                    + error * self.gains.proportional
                    + velocity_error * self.gains.derivative
            }
        };

        let matrix =
            layout.embed_joint_columns(&DMatrix::identity(joints.len(), joints.len()))?;

        Task::new(self.name.clone(), self.space, layout.dimension())
            .with_objective(matrix, desired)?
            .with_scalar_weight(self.weight)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Posture
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> Option<TargetHandle> {
        Some(self.target.clone())
    }

    fn variable_space(&self) -> VariableSpace {
        self.space
    }
}
