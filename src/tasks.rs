//! Provides the built-in task kinds.
//!
//! Every kind implements [TaskSpecification](crate::task::TaskSpecification) and has a
//! `from_descriptor` factory so that it can be registered in a
//! [TaskRegistry](crate::registry::TaskRegistry) and created from a configuration file.

use nalgebra::{DMatrix, DVector};
use serde::de::DeserializeOwned;

use crate::{config::TaskDescriptor, variable_space::VariableSpace, Error};

/// Tracks a target for a frame or the center of mass.
pub mod cartesian;

/// Keeps accelerations and contact forces consistent with the rigid body dynamics.
pub mod equations_of_motion;

/// Keeps the contact forces inside their friction pyramids.
pub mod friction_cone;

/// Keeps the joints inside their limits.
pub mod joint_limits;

/// Regularizes the optimization variable.
pub mod minimum_effort;

/// Tracks a target joint configuration.
pub mod posture;

/// Uses matrices provided by the caller.
pub mod raw;

/// Deserializes the kind specific parameters of a task descriptor.
pub(crate) fn parse_parameters<T: DeserializeOwned>(descriptor: &TaskDescriptor) -> Result<T, Error> {
    toml::Value::Table(descriptor.parameters.clone())
        .try_into()
        .map_err(|e| Error::InvalidTaskParameters {
            task: descriptor.name.clone(),
            message: e.to_string(),
        })
}

/// Checks that a task that needs contact forces is used with the dynamic variable space.
pub(crate) fn require_dynamic(task: &str, space: VariableSpace) -> Result<(), Error> {
    if !space.is_dynamic() {
        return Err(Error::VariableSpaceMismatch {
            task: task.to_string(),
            expected: VariableSpace::DynamicAccelerationForce,
            found: space,
        });
    }

    Ok(())
}

/// Converts a list of rows into a matrix with the given number of columns.
pub(crate) fn matrix_from_rows(
    task: &str,
    rows: &[Vec<f64>],
    columns: usize,
) -> Result<DMatrix<f64>, Error> {
    if let Some(row) = rows.iter().find(|row| row.len() != columns) {
        return Err(Error::InvalidTaskParameters {
            task: task.to_string(),
            message: format!("expected rows with {} entries, found {}", columns, row.len()),
        });
    }

    Ok(DMatrix::from_fn(rows.len(), columns, |r, c| rows[r][c]))
}

/// Converts an optional list of values into a vector.
pub(crate) fn optional_vector(values: &Option<Vec<f64>>) -> Option<DVector<f64>> {
    values.as_ref().map(|v| DVector::from_column_slice(v))
}
