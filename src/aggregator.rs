//! Combines the tasks of one priority level into a single [TaskSet].
//!
//! Tasks of equal priority are traded off against each other through their weights
//! (soft priority). The objective rows of every task are scaled by the square root of the
//! task weight and stacked, so that the composite cost is
//!
//! ```text
//! ½ ‖Aₛ x − bₛ‖² + cₛᵀ x,   Aₛ = [√W₁ A₁; √W₂ A₂; ...],   cₛ = c₁ + c₂ + ...
//! ```
//!
//! The equality and inequality rows of the tasks are unioned without reweighting. Rows
//! that conflict are not deduplicated; the solver reports the level as infeasible.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};

use crate::{
    linalg::{select_matrix_rows, select_vector_rows, stack_rows, stack_vectors},
    task::Task,
    variable_space::VariableSpace,
    Error,
};

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod aggregator_tests;

/// Describes the inequality rows that a single task contributed to a [TaskSet].
#[derive(Clone, Debug, PartialEq)]
pub struct InequalityBlock {
    /// The name of the task that owns the rows.
    task: String,

    /// The importance of the owning task, the trace of its weight.
    importance: f64,

    /// The position of the owning task in the level.
    order: usize,

    /// The rows of the block in the inequality matrix of the set.
    rows: Range<usize>,
}

impl InequalityBlock {
    /// Returns the importance of the task that owns the block.
    pub fn importance(&self) -> f64 {
        self.importance
    }

    /// Returns the position of the owning task in the level.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns the rows of the block.
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Returns the name of the task that owns the block.
    pub fn task(&self) -> &str {
        &self.task
    }
}

/// The composite objective and constraints of all the tasks of one priority level.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskSet {
    space: VariableSpace,
    dimension: usize,
    task_names: Vec<String>,
    objective_matrix: DMatrix<f64>,
    objective_target: DVector<f64>,
    linear_cost: DVector<f64>,
    equality_matrix: DMatrix<f64>,
    equality_target: DVector<f64>,
    inequality_matrix: DMatrix<f64>,
    inequality_bound: DVector<f64>,
    inequality_blocks: Vec<InequalityBlock>,
}

impl TaskSet {
    /// Returns the number of columns of the set.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Creates a set without tasks.
    pub fn empty(space: VariableSpace, dimension: usize) -> Self {
        Self {
            space,
            dimension,
            task_names: vec![],
            objective_matrix: DMatrix::zeros(0, dimension),
            objective_target: DVector::zeros(0),
            linear_cost: DVector::zeros(dimension),
            equality_matrix: DMatrix::zeros(0, dimension),
            equality_target: DVector::zeros(0),
            inequality_matrix: DMatrix::zeros(0, dimension),
            inequality_bound: DVector::zeros(0),
            inequality_blocks: vec![],
        }
    }

    /// Returns the union of the equality rows of all tasks.
    pub fn equality_matrix(&self) -> &DMatrix<f64> {
        &self.equality_matrix
    }

    /// Returns the targets of the equality rows.
    pub fn equality_target(&self) -> &DVector<f64> {
        &self.equality_target
    }

    /// Returns the gradient `g = cₛ − Aₛᵀ bₛ` of the composite cost at zero.
    pub fn gradient(&self) -> DVector<f64> {
        &self.linear_cost - self.objective_matrix.transpose() * &self.objective_target
    }

    /// Returns the Hessian `H = Aₛᵀ Aₛ = Σ Aₖᵀ Wₖ Aₖ` of the composite cost.
    pub fn hessian(&self) -> DMatrix<f64> {
        self.objective_matrix.transpose() * &self.objective_matrix
    }

    /// Returns the inequality blocks, one for every task that has inequality rows.
    pub fn inequality_blocks(&self) -> &[InequalityBlock] {
        &self.inequality_blocks
    }

    /// Returns the bounds of the inequality rows.
    pub fn inequality_bound(&self) -> &DVector<f64> {
        &self.inequality_bound
    }

    /// Returns the union of the inequality rows of all tasks.
    pub fn inequality_matrix(&self) -> &DMatrix<f64> {
        &self.inequality_matrix
    }

    /// Returns true if the set does not hold any task.
    pub fn is_empty(&self) -> bool {
        self.task_names.is_empty()
    }

    /// Returns the stacked, weighted objective rows `Aₛ`.
    pub fn objective_matrix(&self) -> &DMatrix<f64> {
        &self.objective_matrix
    }

    /// Returns the stacked, weighted objective targets `bₛ`.
    pub fn objective_target(&self) -> &DVector<f64> {
        &self.objective_target
    }

    /// Returns the index of the inequality block that is relaxed first when the level is
    /// infeasible: the block of the least important task, and of the later task when two
    /// tasks are equally important.
    pub fn relaxation_candidate(&self) -> Option<usize> {
        self.inequality_blocks
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.importance
                    .total_cmp(&b.importance)
                    .then(b.order.cmp(&a.order))
            })
            .map(|(index, _)| index)
    }

    /// Returns the weighted objective residual `‖Aₛ x − bₛ‖` at the given point.
    pub fn residual(&self, x: &DVector<f64>) -> f64 {
        (&self.objective_matrix * x - &self.objective_target).norm()
    }

    /// Returns the variable space of the set.
    pub fn space(&self) -> VariableSpace {
        self.space
    }

    /// Returns the names of the tasks in the set.
    pub fn task_names(&self) -> &[String] {
        &self.task_names
    }

    /// Returns a copy of the set without the given inequality block.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when there is no block with the given index.
    pub fn without_inequality_block(&self, index: usize) -> Result<TaskSet, Error> {
        let removed = self
            .inequality_blocks
            .get(index)
            .ok_or_else(|| Error::DimensionMismatch {
                what: "the inequality block index".to_string(),
                expected: self.inequality_blocks.len(),
                found: index,
            })?;

        let removed_rows = removed.rows();
        let kept: Vec<usize> = (0..self.inequality_bound.len())
            .filter(|row| !removed_rows.contains(row))
            .collect();

        let mut blocks = Vec::with_capacity(self.inequality_blocks.len() - 1);
        for (i, block) in self.inequality_blocks.iter().enumerate() {
            if i == index {
                continue;
            }

            let mut block = block.clone();
            if block.rows.start >= removed_rows.end {
                block.rows = (block.rows.start - removed_rows.len())
                    ..(block.rows.end - removed_rows.len());
            }
            blocks.push(block);
        }

        let mut result = self.clone();
        result.inequality_matrix = select_matrix_rows(&self.inequality_matrix, &kept);
        result.inequality_bound = select_vector_rows(&self.inequality_bound, &kept);
        result.inequality_blocks = blocks;
        Ok(result)
    }
}

/// Combines the tasks of one priority level into a single [TaskSet].
///
/// The composite Hessian and gradient are sums over the tasks, so the result does not
/// depend on the order in which the tasks are given.
///
/// ## Parameters
///
/// * 'tasks' - The tasks of the level
///
/// ## Errors
///
/// * [Error::EmptyLevel] - Returned when no tasks are given.
/// * [Error::VariableSpaceMismatch] - Returned when the tasks do not all share the variable
///   space of the first task.
/// * [Error::MalformedTask] - Returned when the tasks do not all have the same number of
///   columns as the first task.
pub fn aggregate(tasks: &[Task]) -> Result<TaskSet, Error> {
    let first = tasks.first().ok_or(Error::EmptyLevel)?;
    let mut result = TaskSet::empty(first.space(), first.dimension());

    for (order, task) in tasks.iter().enumerate() {
        if task.space() != result.space {
            return Err(Error::VariableSpaceMismatch {
                task: task.name().to_string(),
                expected: result.space,
                found: task.space(),
            });
        }

        if task.dimension() != result.dimension {
            return Err(Error::MalformedTask {
                task: task.name().to_string(),
                reason: format!(
                    "the task has {} columns but the level has {}",
                    task.dimension(),
                    result.dimension
                ),
            });
        }

        let (matrix, target) = task.weighted_objective();
        result.objective_matrix = stack_rows(&result.objective_matrix, &matrix);
        result.objective_target = stack_vectors(&result.objective_target, &target);

        if let Some(cost) = task.linear_cost() {
            result.linear_cost += cost;
        }

        result.equality_matrix = stack_rows(&result.equality_matrix, task.equality_matrix());
        result.equality_target = stack_vectors(&result.equality_target, task.equality_target());

        let start = result.inequality_bound.len();
        result.inequality_matrix =
            stack_rows(&result.inequality_matrix, task.inequality_matrix());
        result.inequality_bound =
            stack_vectors(&result.inequality_bound, task.inequality_bound());
        let end = result.inequality_bound.len();
        if end > start {
            result.inequality_blocks.push(InequalityBlock {
                task: task.name().to_string(),
                importance: task.importance(),
                order,
                rows: start..end,
            });
        }

        result.task_names.push(task.name().to_string());
    }

    Ok(result)
}
