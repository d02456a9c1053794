use std::sync::Arc;

use nalgebra::DVector;
use serde::Deserialize;

use crate::{
    config::TaskDescriptor,
    state::robot_state::{FrameState, RobotState},
    target::{Gains, TargetHandle, TaskTarget},
    task::{Task, TaskKind, TaskSpecification},
    variable_space::{VariableLayout, VariableSpace},
    Error,
};

use super::{optional_vector, parse_parameters};

#[cfg(test)]
#[path = "cartesian_tests.rs"]
mod cartesian_tests;

#[derive(Deserialize)]
struct CartesianParameters {
    #[serde(default)]
    frame: Option<String>,
    target: Vec<f64>,
    #[serde(default)]
    velocity: Option<Vec<f64>>,
    #[serde(default)]
    acceleration: Option<Vec<f64>>,
    #[serde(default)]
    gains: Gains,
}

/// The frame whose task-space quantities are tracked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameSource {
    /// A named frame of the robot state.
    Frame(String),

    /// The center of mass of the robot.
    CenterOfMass,
}

/// Drives a frame, or the center of mass, towards a target in task space.
///
/// With `J` the Jacobian of the frame and `e` the position error the rows are:
///
/// * kinematic position: `J Δq = e`
/// * kinematic velocity: `J q̇ = ẋ_d + Kp e`
/// * dynamic: `J q̈ = ẍ_d + Kp e + Kd (ẋ_d − ẋ) − J̇ q̇`
pub struct CartesianTask {
    name: String,
    space: VariableSpace,
    source: FrameSource,
    target: TargetHandle,
    gains: Gains,
    weight: f64,
}

impl CartesianTask {
    fn frame<'a>(&self, state: &'a RobotState) -> Result<&'a FrameState, Error> {
        match &self.source {
            FrameSource::Frame(name) => state.frame(name),
            FrameSource::CenterOfMass => state.center_of_mass(),
        }
    }

    /// Creates a task that tracks the center of mass.
    pub fn center_of_mass(
        name: impl Into<String>,
        space: VariableSpace,
        target: TaskTarget,
        gains: Gains,
        weight: f64,
    ) -> Self {
        Self::new(name, space, FrameSource::CenterOfMass, target, gains, weight)
    }

    /// Creates a center of mass task from a configuration descriptor.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidTaskParameters] - Returned when the parameters do not hold a target.
    pub fn center_of_mass_from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let parameters: CartesianParameters = parse_parameters(descriptor)?;
        Ok(Arc::new(Self::from_parameters(
            descriptor,
            space,
            FrameSource::CenterOfMass,
            parameters,
        )))
    }

    /// Creates a frame tracking task from a configuration descriptor.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidTaskParameters] - Returned when the parameters do not hold a frame
    ///   name and a target.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let parameters: CartesianParameters = parse_parameters(descriptor)?;
        let frame = parameters
            .frame
            .clone()
            .ok_or_else(|| Error::InvalidTaskParameters {
                task: descriptor.name.clone(),
                message: "missing field `frame`".to_string(),
            })?;

        Ok(Arc::new(Self::from_parameters(
            descriptor,
            space,
            FrameSource::Frame(frame),
            parameters,
        )))
    }

    fn from_parameters(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
        source: FrameSource,
        parameters: CartesianParameters,
    ) -> Self {
        let mut target = TaskTarget::new(DVector::from_vec(parameters.target));
        if let Some(velocity) = optional_vector(&parameters.velocity) {
            target = target.with_velocity(velocity);
        }
        if let Some(acceleration) = optional_vector(&parameters.acceleration) {
            target = target.with_acceleration(acceleration);
        }

        Self::new(
            descriptor.name.clone(),
            space,
            source,
            target,
            parameters.gains,
            descriptor.weight,
        )
    }

    /// Creates a new task.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the task
    /// * 'space' - The variable space of the task
    /// * 'source' - The frame that is tracked
    /// * 'target' - The initial target, one entry per task-space dimension of the frame
    /// * 'gains' - The feedback gains
    /// * 'weight' - The weight of the task within its level
    pub fn new(
        name: impl Into<String>,
        space: VariableSpace,
        source: FrameSource,
        target: TaskTarget,
        gains: Gains,
        weight: f64,
    ) -> Self {
        Self {
            name: name.into(),
            space,
            source,
            target: TargetHandle::new(target),
            gains,
            weight,
        }
    }

    /// Returns the frame that is tracked.
    pub fn source(&self) -> &FrameSource {
        &self.source
    }
}

impl TaskSpecification for CartesianTask {
    fn build(&self, state: &RobotState) -> Result<Task, Error> {
        let layout = VariableLayout::for_state(self.space, state);
        let frame = self.frame(state)?;
        let target = self.target.get();
        if target.dimension() != frame.task_dimension() {
            return Err(Error::MalformedTask {
                task: self.name.clone(),
                reason: format!(
                    "the target has {} entries but the frame has {}",
                    target.dimension(),
                    frame.task_dimension()
                ),
            });
        }

        let error = target.position() - frame.position();
        let desired = match self.space {
            VariableSpace::KinematicPosition => error,
            VariableSpace::KinematicVelocity => {
                target.velocity_or_zero() + error * self.gains.proportional
            }
            VariableSpace::DynamicAccelerationForce => {
                let velocity_error = target.velocity_or_zero() - frame.velocity();
                target.acceleration_or_zero() + error * self.gains.proportional
                    + velocity_error * self.gains.derivative
                    - frame.jacobian_dot_times_velocity()
            }
        };

        let matrix = layout.embed_joint_columns(frame.jacobian())?;

        Task::new(self.name.clone(), self.space, layout.dimension())
            .with_objective(matrix, desired)?
            .with_scalar_weight(self.weight)
    }

    fn kind(&self) -> TaskKind {
        match self.source {
            FrameSource::Frame(_) => TaskKind::Cartesian,
            FrameSource::CenterOfMass => TaskKind::CenterOfMass,
        }
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
