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

use super::{matrix_from_rows, optional_vector, parse_parameters};

#[cfg(test)]
#[path = "raw_tests.rs"]
mod raw_tests;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParameters {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    objective_matrix: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    objective_target: Option<Vec<f64>>,
    #[serde(default)]
    weights: Option<Vec<f64>>,
    #[serde(default)]
    linear_cost: Option<Vec<f64>>,
    #[serde(default)]
    equality_matrix: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    equality_target: Option<Vec<f64>>,
    #[serde(default)]
    inequality_matrix: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    inequality_bound: Option<Vec<f64>>,
    #[serde(default)]
    lower_bounds: Option<Vec<f64>>,
    #[serde(default)]
    upper_bounds: Option<Vec<f64>>,
}

impl RawParameters {
    /// Returns the size of the variable, either given or taken from the first matrix.
    fn dimension(&self) -> Option<usize> {
        self.dimension.or_else(|| {
            [
                &self.objective_matrix,
                &self.equality_matrix,
                &self.inequality_matrix,
            ]
            .into_iter()
            .flatten()
            .find_map(|rows| rows.first().map(|row| row.len()))
            .or_else(|| self.linear_cost.as_ref().map(|c| c.len()))
            .or_else(|| self.lower_bounds.as_ref().map(|b| b.len()))
            .or_else(|| self.upper_bounds.as_ref().map(|b| b.len()))
        })
    }
}

fn paired<'a, A, B>(
    task: &str,
    what: &str,
    first: &'a Option<A>,
    second: &'a Option<B>,
) -> Result<Option<(&'a A, &'a B)>, Error> {
    match (first, second) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (None, None) => Ok(None),
        _ => Err(Error::InvalidTaskParameters {
            task: task.to_string(),
            message: format!("{} needs both a matrix and a vector", what),
        }),
    }
}

/// A task whose matrices are provided by the caller and do not depend on the state.
#[derive(Debug)]
pub struct RawTask {
    task: Task,
}

impl RawTask {
    /// Creates the task from a configuration descriptor.
    ///
    /// Matrices are given as lists of rows. The size of the variable is taken from the
    /// `dimension` parameter or, when missing, from the first matrix or vector.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidTaskParameters] - Returned when the parameters cannot be read, when
    ///   the rows have different sizes or when a matrix is given without its vector.
    /// * [Error::MalformedTask] - Returned when the matrices do not agree with each other.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let name = descriptor.name.as_str();
        let parameters: RawParameters = parse_parameters(descriptor)?;
        let dimension = parameters
            .dimension()
            .ok_or_else(|| Error::InvalidTaskParameters {
                task: name.to_string(),
                message: "the size of the variable cannot be determined".to_string(),
            })?;

        let mut task = Task::new(name, space, dimension);
        if let Some((matrix, target)) = paired(
            name,
            "the objective",
            &parameters.objective_matrix,
            &parameters.objective_target,
        )? {
            task = task.with_objective(
                matrix_from_rows(name, matrix, dimension)?,
                DVector::from_column_slice(target),
            )?;
            task = match optional_vector(&parameters.weights) {
                Some(weights) => task.with_weight(DMatrix::from_diagonal(&weights))?,
                None => task.with_scalar_weight(descriptor.weight)?,
            };
        }

        if let Some(cost) = optional_vector(&parameters.linear_cost) {
            task = task.with_linear_cost(cost)?;
        }

        if let Some((matrix, target)) = paired(
            name,
            "the equality",
            &parameters.equality_matrix,
            &parameters.equality_target,
        )? {
            task = task.with_equality(
                matrix_from_rows(name, matrix, dimension)?,
                DVector::from_column_slice(target),
            )?;
        }

        if let Some((matrix, bound)) = paired(
            name,
            "the inequality",
            &parameters.inequality_matrix,
            &parameters.inequality_bound,
        )? {
            task = task.with_inequality(
                matrix_from_rows(name, matrix, dimension)?,
                DVector::from_column_slice(bound),
            )?;
        }

        if parameters.lower_bounds.is_some() || parameters.upper_bounds.is_some() {
            let lower = optional_vector(&parameters.lower_bounds)
                .unwrap_or_else(|| DVector::from_element(dimension, f64::NEG_INFINITY));
            let upper = optional_vector(&parameters.upper_bounds)
                .unwrap_or_else(|| DVector::from_element(dimension, f64::INFINITY));
            task = task.with_bounds(lower, upper)?;
        }

        Ok(Arc::new(Self::new(task)))
    }

    /// Creates a new raw task from a complete task.
    pub fn new(task: Task) -> Self {
        Self { task }
    }

    /// Returns the task that is produced every cycle.
    pub fn task(&self) -> &Task {
        &self.task
    }
}

impl TaskSpecification for RawTask {
    fn build(&self, state: &RobotState) -> Result<Task, Error> {
        let layout = VariableLayout::for_state(self.task.space(), state);
        self.task.validate_for(&layout)?;
        Ok(self.task.clone())
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Raw
    }

    fn name(&self) -> &str {
        self.task.name()
    }

    fn variable_space(&self) -> VariableSpace {
        self.task.space()
    }
}
