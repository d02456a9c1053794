use std::sync::Arc;

use nalgebra::DVector;

use crate::{
    config::TaskDescriptor,
    state::{
        joint_space::JointSpace,
        robot_state::{JointRecord, RobotState},
    },
    task::{Task, TaskKind, TaskSpecification},
    variable_space::{VariableLayout, VariableSpace},
    Error,
};

#[cfg(test)]
#[path = "joint_limits_tests.rs"]
mod joint_limits_tests;

/// Keeps every joint inside its position, velocity and acceleration limits.
///
/// The limits of each joint are turned into bounds on the joint part of the variable.
/// The position limits are converted with the cycle time step so that the joint stays in
/// range at the end of the cycle. The rate limit of the variable space (the velocity
/// limits for kinematic control, the acceleration limits for dynamic control) always
/// wins: when the position derived bounds and the rate bounds do not overlap the position
/// derived bounds are clamped into the rate bounds.
///
/// Periodic joints have no position limits. Contact forces are not bounded.
pub struct JointLimitsTask {
    name: String,
    space: VariableSpace,
}

impl JointLimitsTask {
    /// Creates the task from a configuration descriptor. The task has no parameters.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        Ok(Arc::new(Self::new(descriptor.name.clone(), space)))
    }

    /// Creates a new task.
    pub fn new(name: impl Into<String>, space: VariableSpace) -> Self {
        Self {
            name: name.into(),
            space,
        }
    }

    /// Returns the bounds of a single joint in the units of the variable space.
    fn joint_bounds(&self, joint: &JointRecord, time_step: f64) -> Result<(f64, f64), Error> {
        let Some(range) = joint.range() else {
            return Ok((f64::NEG_INFINITY, f64::INFINITY));
        };

        let (minimum_position, maximum_position) = match joint.space() {
            JointSpace::Linear => (range.minimum_position(), range.maximum_position()),
            JointSpace::Periodic { .. } => (f64::NEG_INFINITY, f64::INFINITY),
        };
        let minimum_velocity = range.minimum_velocity().unwrap_or(f64::NEG_INFINITY);
        let maximum_velocity = range.maximum_velocity().unwrap_or(f64::INFINITY);

        let position = joint.state().position();
        let velocity = joint.state().velocity_or_zero();

        let (position_bounds, rate_bounds) = match self.space {
            VariableSpace::KinematicPosition => (
                (minimum_position - position, maximum_position - position),
                (minimum_velocity * time_step, maximum_velocity * time_step),
            ),
            VariableSpace::KinematicVelocity => (
                (
                    (minimum_position - position) / time_step,
                    (maximum_position - position) / time_step,
                ),
                (minimum_velocity, maximum_velocity),
            ),
            VariableSpace::DynamicAccelerationForce => {
                // q + q̇ dt + ½ q̈ dt² and q̇ + q̈ dt must both stay in range.
                let squared = time_step * time_step;
                let from_position = (
                    2.0 * (minimum_position - position - velocity * time_step) / squared,
                    2.0 * (maximum_position - position - velocity * time_step) / squared,
                );
                let from_velocity = (
                    (minimum_velocity - velocity) / time_step,
                    (maximum_velocity - velocity) / time_step,
                );
                let rate = (
                    range
                        .minimum_acceleration()
                        .unwrap_or(f64::NEG_INFINITY)
                        .max(from_velocity.0),
                    range
                        .maximum_acceleration()
                        .unwrap_or(f64::INFINITY)
                        .min(from_velocity.1),
                );
                (from_position, rate)
            }
        };

        let (lower_rate, upper_rate) = rate_bounds;
        if lower_rate.is_nan() || upper_rate.is_nan() || lower_rate > upper_rate {
            return Err(Error::MalformedTask {
                task: self.name.clone(),
                reason: format!(
                    "the rate limits [{}, {}] of joint {} are empty",
                    lower_rate,
                    upper_rate,
                    joint.name()
                ),
            });
        }

        let (lower_position, upper_position) = position_bounds;
        if lower_position.is_nan() || upper_position.is_nan() {
            return Err(Error::MalformedTask {
                task: self.name.clone(),
                reason: format!("the position limits of joint {} are invalid", joint.name()),
            });
        }

        Ok((
            lower_position.clamp(lower_rate, upper_rate),
            upper_position.clamp(lower_rate, upper_rate),
        ))
    }
}

impl TaskSpecification for JointLimitsTask {
    fn build(&self, state: &RobotState) -> Result<Task, Error> {
        let layout = VariableLayout::for_state(self.space, state);
        let mut lower = DVector::from_element(layout.dimension(), f64::NEG_INFINITY);
        let mut upper = DVector::from_element(layout.dimension(), f64::INFINITY);

        for (index, joint) in state.joints().iter().enumerate() {
            let (minimum, maximum) = self.joint_bounds(joint, state.time_step())?;
            lower[index] = minimum;
            upper[index] = maximum;
        }

        Task::new(self.name.clone(), self.space, layout.dimension()).with_bounds(lower, upper)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::JointLimits
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn variable_space(&self) -> VariableSpace {
        self.space
    }
}
