use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::{
    config::TaskDescriptor,
    state::robot_state::RobotState,
    task::{Task, TaskKind, TaskSpecification},
    variable_space::{VariableLayout, VariableSpace, FORCE_COMPONENTS_PER_CONTACT},
    Error,
};

use super::{optional_vector, parse_parameters, require_dynamic};

#[cfg(test)]
#[path = "equations_of_motion_tests.rs"]
mod equations_of_motion_tests;

#[derive(Deserialize)]
struct EquationsOfMotionParameters {
    #[serde(default)]
    minimum_torques: Option<Vec<f64>>,
    #[serde(default)]
    maximum_torques: Option<Vec<f64>>,
}

/// Returns the transposed, stacked contact Jacobians `J_cᵀ`, one column per force
/// component.
fn contact_jacobian_transpose(state: &RobotState) -> DMatrix<f64> {
    let contacts = state.contacts();
    let mut result = DMatrix::zeros(
        state.joint_count(),
        contacts.len() * FORCE_COMPONENTS_PER_CONTACT,
    );
    for (index, contact) in contacts.iter().enumerate() {
        result
            .view_mut(
                (0, index * FORCE_COMPONENTS_PER_CONTACT),
                (state.joint_count(), FORCE_COMPONENTS_PER_CONTACT),
            )
            .copy_from(&contact.jacobian().transpose());
    }
    result
}

/// Returns the rows `[M, −J_cᵀ]` and the bias forces `h` of the joints in the given range
/// so that `[M, −J_cᵀ] x + h` is the joint torque.
fn dynamics_rows(
    state: &RobotState,
    first: usize,
    count: usize,
) -> Result<(DMatrix<f64>, DVector<f64>), Error> {
    let dynamics = state.dynamics()?;
    let layout = VariableLayout::for_state(VariableSpace::DynamicAccelerationForce, state);
    let joints = layout.joint_count();
    let forces = layout.force_count();

    let contact_transpose = contact_jacobian_transpose(state);

    let mut matrix = DMatrix::zeros(count, layout.dimension());
    matrix
        .view_mut((0, 0), (count, joints))
        .copy_from(&dynamics.mass_matrix().rows(first, count));
    matrix
        .view_mut((0, joints), (count, forces))
        .copy_from(&(contact_transpose.rows(first, count) * -1.0));

    let bias = dynamics.bias_forces().rows(first, count).into_owned();
    Ok((matrix, bias))
}

/// Returns the torques of the actuated joints, `τ = M_a q̈ + h_a − J_caᵀ f`, for a
/// solution of the dynamic variable space.
///
/// ## Errors
///
/// * [Error::MissingStateQuantity] - Returned when the state holds no dynamics.
/// * [Error::DimensionMismatch] - Returned when the solution does not match the layout of
///   the state.
pub fn joint_torques(state: &RobotState, solution: &DVector<f64>) -> Result<DVector<f64>, Error> {
    let layout = VariableLayout::for_state(VariableSpace::DynamicAccelerationForce, state);
    if solution.len() != layout.dimension() {
        return Err(Error::DimensionMismatch {
            what: "the solution".to_string(),
            expected: layout.dimension(),
            found: solution.len(),
        });
    }

    let unactuated = state.dynamics()?.unactuated_joint_count();
    let actuated = state.joint_count() - unactuated;
    let (matrix, bias) = dynamics_rows(state, unactuated, actuated)?;
    Ok(matrix * solution + bias)
}

/// Keeps the joint accelerations and contact forces consistent with the rigid body
/// dynamics `M q̈ + h = Sᵀ τ + J_cᵀ f`.
///
/// The unactuated (floating base) rows cannot be helped by any torque, so they become the
/// equalities `M_u q̈ − J_cuᵀ f = −h_u`. When torque limits are given the actuated rows
/// become the bilateral inequality `τ_min ≤ M_a q̈ + h_a − J_caᵀ f ≤ τ_max`.
pub struct EquationsOfMotionTask {
    name: String,
    minimum_torques: Option<DVector<f64>>,
    maximum_torques: Option<DVector<f64>>,
}

impl EquationsOfMotionTask {
    /// Creates the task from a configuration descriptor.
    ///
    /// ## Errors
    ///
    /// * [Error::VariableSpaceMismatch] - Returned when the space is not the dynamic space.
    /// * [Error::InvalidTaskParameters] - Returned when the torque limits cannot be read.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let parameters: EquationsOfMotionParameters = parse_parameters(descriptor)?;
        let task = Self::new(descriptor.name.clone(), space)?.with_torque_limits(
            optional_vector(&parameters.minimum_torques),
            optional_vector(&parameters.maximum_torques),
        );
        Ok(Arc::new(task))
    }

    /// Creates a new task without torque limits.
    ///
    /// ## Errors
    ///
    /// * [Error::VariableSpaceMismatch] - Returned when the space is not the dynamic space.
    pub fn new(name: impl Into<String>, space: VariableSpace) -> Result<Self, Error> {
        let name = name.into();
        require_dynamic(&name, space)?;
        Ok(Self {
            name,
            minimum_torques: None,
            maximum_torques: None,
        })
    }

    /// Sets the limits of the actuated joint torques. A missing side is unlimited.
    pub fn with_torque_limits(
        mut self,
        minimum: Option<DVector<f64>>,
        maximum: Option<DVector<f64>>,
    ) -> Self {
        self.minimum_torques = minimum;
        self.maximum_torques = maximum;
        self
    }
}

impl TaskSpecification for EquationsOfMotionTask {
    fn build(&self, state: &RobotState) -> Result<Task, Error> {
        let layout = VariableLayout::for_state(VariableSpace::DynamicAccelerationForce, state);
        let unactuated = state.dynamics()?.unactuated_joint_count();
        let actuated = state.joint_count() - unactuated;

        let (matrix, bias) = dynamics_rows(state, 0, unactuated)?;
        let mut task = Task::new(
            self.name.clone(),
            VariableSpace::DynamicAccelerationForce,
            layout.dimension(),
        )
        .with_equality(matrix, -bias)?;

        if self.minimum_torques.is_none() && self.maximum_torques.is_none() {
            return Ok(task);
        }

        let lower = self
            .minimum_torques
            .clone()
            .unwrap_or_else(|| DVector::from_element(actuated, f64::NEG_INFINITY));
        let upper = self
            .maximum_torques
            .clone()
            .unwrap_or_else(|| DVector::from_element(actuated, f64::INFINITY));
        if lower.len() != actuated || upper.len() != actuated {
            return Err(Error::MalformedTask {
                task: self.name.clone(),
                reason: format!(
                    "the torque limits need {} entries, one per actuated joint",
                    actuated
                ),
            });
        }

        let (matrix, bias) = dynamics_rows(state, unactuated, actuated)?;
        task = task.with_bilateral(matrix, lower - &bias, upper - &bias)?;
        Ok(task)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::EquationsOfMotion
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn variable_space(&self) -> VariableSpace {
        VariableSpace::DynamicAccelerationForce
    }
}
