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

use super::{parse_parameters, require_dynamic};

#[cfg(test)]
#[path = "friction_cone_tests.rs"]
mod friction_cone_tests;

const ROWS_PER_CONTACT: usize = 6;

#[derive(Deserialize)]
struct FrictionConeParameters {
    #[serde(default)]
    minimum_normal_force: f64,
}

/// Keeps every contact force inside the linearized friction pyramid of its contact:
///
/// ```text
/// |f_x| ≤ μ f_z,  |f_y| ≤ μ f_z,  f_min ≤ f_z ≤ f_max
/// ```
///
/// The contact normal is the z-axis of the contact frame.
pub struct FrictionConeTask {
    name: String,
    minimum_normal_force: f64,
}

impl FrictionConeTask {
    /// Creates the task from a configuration descriptor.
    ///
    /// ## Errors
    ///
    /// * [Error::VariableSpaceMismatch] - Returned when the space is not the dynamic space.
    /// * [Error::InvalidTaskParameters] - Returned when the minimum normal force is
    ///   negative or cannot be read.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let parameters: FrictionConeParameters = parse_parameters(descriptor)?;
        if !parameters.minimum_normal_force.is_finite() || parameters.minimum_normal_force < 0.0
        {
            return Err(Error::InvalidTaskParameters {
                task: descriptor.name.clone(),
                message: format!(
                    "minimum_normal_force must be finite and not negative, got {}",
                    parameters.minimum_normal_force
                ),
            });
        }

        Ok(Arc::new(
            Self::new(descriptor.name.clone(), space)?
                .with_minimum_normal_force(parameters.minimum_normal_force),
        ))
    }

    /// Creates a new task that allows normal forces down to zero.
    ///
    /// ## Errors
    ///
    /// * [Error::VariableSpaceMismatch] - Returned when the space is not the dynamic space.
    pub fn new(name: impl Into<String>, space: VariableSpace) -> Result<Self, Error> {
        let name = name.into();
        require_dynamic(&name, space)?;
        Ok(Self {
            name,
            minimum_normal_force: 0.0,
        })
    }

    /// Sets the smallest normal force every contact has to transmit.
    pub fn with_minimum_normal_force(mut self, force: f64) -> Self {
        self.minimum_normal_force = force;
        self
    }
}

impl TaskSpecification for FrictionConeTask {
    fn build(&self, state: &RobotState) -> Result<Task, Error> {
        let layout = VariableLayout::for_state(VariableSpace::DynamicAccelerationForce, state);
        let contacts = state.contacts();

        let mut matrix = DMatrix::zeros(contacts.len() * ROWS_PER_CONTACT, layout.force_count());
        let mut bound = DVector::zeros(contacts.len() * ROWS_PER_CONTACT);
        for (index, contact) in contacts.iter().enumerate() {
            let mu = contact.friction_coefficient();
            let row = index * ROWS_PER_CONTACT;
            let x = index * FORCE_COMPONENTS_PER_CONTACT;
            let (y, z) = (x + 1, x + 2);

            for (offset, (column, sign)) in [(x, 1.0), (x, -1.0), (y, 1.0), (y, -1.0)]
                .into_iter()
                .enumerate()
            {
                matrix[(row + offset, column)] = sign;
                matrix[(row + offset, z)] = -mu;
            }

            matrix[(row + 4, z)] = -1.0;
            bound[row + 4] = -self.minimum_normal_force;

            matrix[(row + 5, z)] = 1.0;
            bound[row + 5] = contact.maximum_normal_force();
        }

        Task::new(
            self.name.clone(),
            VariableSpace::DynamicAccelerationForce,
            layout.dimension(),
        )
        .with_inequality(layout.embed_force_columns(&matrix)?, bound)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::FrictionCone
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn variable_space(&self) -> VariableSpace {
        VariableSpace::DynamicAccelerationForce
    }
}
