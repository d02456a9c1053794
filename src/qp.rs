//! Defines the canonical quadratic program that every priority level is turned into:
//!
//! ```text
//! min  ½ xᵀ H x + gᵀ x
//! s.t. A x  = b
//!      C x ≤ d
//! ```
//!
//! and the solution a [QpSolver] returns for it.

use std::{fmt::Display, time::Duration};

use nalgebra::{DMatrix, DVector};

use crate::{
    aggregator::TaskSet,
    linalg::{select_matrix_rows, select_vector_rows, stack_rows, stack_vectors},
    Error,
};

#[cfg(test)]
#[path = "qp_tests.rs"]
mod qp_tests;

/// Rows whose norm is at or below this value no longer constrain the variable.
const DEGENERATE_ROW_NORM: f64 = 1e-9;

/// A convex quadratic program in canonical form.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadraticProgram {
    hessian: DMatrix<f64>,
    gradient: DVector<f64>,
    equality_matrix: DMatrix<f64>,
    equality_target: DVector<f64>,
    inequality_matrix: DMatrix<f64>,
    inequality_bound: DVector<f64>,
}

/// The outcome of removing the rows of a program that no longer depend on the variable.
#[derive(Clone, Debug, PartialEq)]
pub struct RowReduction {
    /// The program without the degenerate rows.
    program: QuadraticProgram,

    /// For every inequality row of the reduced program, the row of the original program.
    inequality_rows: Vec<usize>,

    /// The number of degenerate rows that cannot be satisfied, `0 = b` with `b ≠ 0` or
    /// `0 ≤ d` with `d < 0`.
    conflicting_rows: usize,
}

impl RowReduction {
    /// Returns the number of degenerate rows that cannot be satisfied.
    pub fn conflicting_rows(&self) -> usize {
        self.conflicting_rows
    }

    /// Returns the original row of every inequality row of the reduced program.
    pub fn inequality_rows(&self) -> &[usize] {
        &self.inequality_rows
    }

    /// Returns the reduced program.
    pub fn program(&self) -> &QuadraticProgram {
        &self.program
    }
}

impl QuadraticProgram {
    fn check_columns(&self, what: &str, matrix: &DMatrix<f64>) -> Result<(), Error> {
        if matrix.ncols() != self.dimension() {
            return Err(Error::DimensionMismatch {
                what: format!("the {} columns", what),
                expected: self.dimension(),
                found: matrix.ncols(),
            });
        }

        Ok(())
    }

    fn check_rows(&self, what: &str, rows: usize, vector: &DVector<f64>) -> Result<(), Error> {
        if vector.len() != rows {
            return Err(Error::DimensionMismatch {
                what: format!("the {} entries", what),
                expected: rows,
                found: vector.len(),
            });
        }

        Ok(())
    }

    /// Returns the number of variables.
    pub fn dimension(&self) -> usize {
        self.gradient.len()
    }

    /// Returns the equality matrix `A`.
    pub fn equality_matrix(&self) -> &DMatrix<f64> {
        &self.equality_matrix
    }

    /// Returns the equality target `b`.
    pub fn equality_target(&self) -> &DVector<f64> {
        &self.equality_target
    }

    /// Creates the program of a priority level from its aggregated tasks.
    pub fn from_task_set(set: &TaskSet) -> Self {
        Self {
            hessian: set.hessian(),
            gradient: set.gradient(),
            equality_matrix: set.equality_matrix().clone(),
            equality_target: set.equality_target().clone(),
            inequality_matrix: set.inequality_matrix().clone(),
            inequality_bound: set.inequality_bound().clone(),
        }
    }

    /// Returns the gradient `g`.
    pub fn gradient(&self) -> &DVector<f64> {
        &self.gradient
    }

    /// Returns the Hessian `H`.
    pub fn hessian(&self) -> &DMatrix<f64> {
        &self.hessian
    }

    /// Returns the inequality bound `d`.
    pub fn inequality_bound(&self) -> &DVector<f64> {
        &self.inequality_bound
    }

    /// Returns the inequality matrix `C`.
    pub fn inequality_matrix(&self) -> &DMatrix<f64> {
        &self.inequality_matrix
    }

    /// Creates an unconstrained program.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the Hessian is not square or does not
    ///   match the gradient.
    pub fn new(hessian: DMatrix<f64>, gradient: DVector<f64>) -> Result<Self, Error> {
        if hessian.nrows() != gradient.len() || hessian.ncols() != gradient.len() {
            return Err(Error::DimensionMismatch {
                what: "the Hessian".to_string(),
                expected: gradient.len(),
                found: hessian.nrows().max(hessian.ncols()),
            });
        }

        let n = gradient.len();
        Ok(Self {
            hessian,
            gradient,
            equality_matrix: DMatrix::zeros(0, n),
            equality_target: DVector::zeros(0),
            inequality_matrix: DMatrix::zeros(0, n),
            inequality_bound: DVector::zeros(0),
        })
    }

    /// Returns the value of the objective at the given point.
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.hessian * x)) + self.gradient.dot(x)
    }

    /// Restricts the program to the affine subspace `x = origin + basis · z`.
    ///
    /// The returned program is expressed in `z`:
    ///
    /// ```text
    /// H' = Nᵀ H N       g' = Nᵀ (H x₀ + g)
    /// A' = A N          b' = b − A x₀
    /// C' = C N          d' = d − C x₀
    /// ```
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the origin or the basis does not have one
    ///   row per variable.
    pub fn reduce(&self, origin: &DVector<f64>, basis: &DMatrix<f64>) -> Result<Self, Error> {
        self.check_rows("origin", self.dimension(), origin)?;
        if basis.nrows() != self.dimension() {
            return Err(Error::DimensionMismatch {
                what: "the basis rows".to_string(),
                expected: self.dimension(),
                found: basis.nrows(),
            });
        }

        let basis_t = basis.transpose();
        Ok(Self {
            hessian: &basis_t * &self.hessian * basis,
            gradient: &basis_t * (&self.hessian * origin + &self.gradient),
            equality_matrix: &self.equality_matrix * basis,
            equality_target: &self.equality_target - &self.equality_matrix * origin,
            inequality_matrix: &self.inequality_matrix * basis,
            inequality_bound: &self.inequality_bound - &self.inequality_matrix * origin,
        })
    }

    /// Removes the rows that no longer depend on the variable.
    ///
    /// Restricting a program to a subspace turns rows that higher levels already locked
    /// into zero rows. Those that are satisfied within the tolerance are dropped, the
    /// others are counted as conflicting.
    pub fn without_degenerate_rows(&self, tolerance: f64) -> RowReduction {
        let mut conflicting_rows = 0;

        let mut equality_rows = vec![];
        for i in 0..self.equality_target.len() {
            if self.equality_matrix.row(i).norm() > DEGENERATE_ROW_NORM {
                equality_rows.push(i);
            } else if self.equality_target[i].abs() > tolerance {
                conflicting_rows += 1;
            }
        }

        let mut inequality_rows = vec![];
        for i in 0..self.inequality_bound.len() {
            if self.inequality_matrix.row(i).norm() > DEGENERATE_ROW_NORM {
                inequality_rows.push(i);
            } else if self.inequality_bound[i] < -tolerance {
                conflicting_rows += 1;
            }
        }

        let program = Self {
            hessian: self.hessian.clone(),
            gradient: self.gradient.clone(),
            equality_matrix: select_matrix_rows(&self.equality_matrix, &equality_rows),
            equality_target: select_vector_rows(&self.equality_target, &equality_rows),
            inequality_matrix: select_matrix_rows(&self.inequality_matrix, &inequality_rows),
            inequality_bound: select_vector_rows(&self.inequality_bound, &inequality_rows),
        };

        RowReduction {
            program,
            inequality_rows,
            conflicting_rows,
        }
    }

    /// Returns the program with the given equality rows appended.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the sizes do not match.
    pub fn with_equalities(
        mut self,
        matrix: &DMatrix<f64>,
        target: &DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("equality matrix", matrix)?;
        self.check_rows("equality target", matrix.nrows(), target)?;
        self.equality_matrix = stack_rows(&self.equality_matrix, matrix);
        self.equality_target = stack_vectors(&self.equality_target, target);
        Ok(self)
    }

    /// Returns the program with the given inequality rows appended.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the sizes do not match.
    pub fn with_inequalities(
        mut self,
        matrix: &DMatrix<f64>,
        bound: &DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("inequality matrix", matrix)?;
        self.check_rows("inequality bound", matrix.nrows(), bound)?;
        self.inequality_matrix = stack_rows(&self.inequality_matrix, matrix);
        self.inequality_bound = stack_vectors(&self.inequality_bound, bound);
        Ok(self)
    }
}

/// The outcome of a quadratic program solve.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum QpStatus {
    /// An optimal solution was found.
    Solved,

    /// The constraints cannot all be satisfied.
    Infeasible,

    /// The objective has no lower bound on the feasible set.
    Unbounded,

    /// The solve did not finish within its time budget.
    TimedOut,

    /// The solver failed for numerical or other reasons.
    Failed,
}

impl Display for QpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QpStatus::Solved => "SOLVED",
            QpStatus::Infeasible => "INFEASIBLE",
            QpStatus::Unbounded => "UNBOUNDED",
            QpStatus::TimedOut => "TIMED_OUT",
            QpStatus::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// The solution of a [QuadraticProgram].
#[derive(Clone, Debug, PartialEq)]
pub struct QpSolution {
    x: DVector<f64>,
    inequality_multipliers: DVector<f64>,
    status: QpStatus,
    iterations: u32,
    solve_time: Duration,
}

impl QpSolution {
    /// Returns the inequality rows of the program that are active at the solution.
    ///
    /// A row is active when its slack `d − C x` does not exceed the tolerance, or when its
    /// multiplier exceeds the tolerance.
    pub fn active_set(&self, program: &QuadraticProgram, tolerance: f64) -> Vec<usize> {
        if program.dimension() != self.x.len() {
            return vec![];
        }

        let slack = program.inequality_bound() - program.inequality_matrix() * &self.x;
        (0..slack.len())
            .filter(|i| {
                slack[*i] <= tolerance
                    || self
                        .inequality_multipliers
                        .get(*i)
                        .map(|m| *m > tolerance)
                        .unwrap_or(false)
            })
            .collect()
    }

    /// Creates a solution that carries no point, for a solve that did not succeed.
    pub fn failed(dimension: usize, inequality_rows: usize, status: QpStatus) -> Self {
        Self::new(
            DVector::zeros(dimension),
            DVector::zeros(inequality_rows),
            status,
        )
    }

    /// Returns the Lagrange multipliers of the inequality rows.
    pub fn inequality_multipliers(&self) -> &DVector<f64> {
        &self.inequality_multipliers
    }

    /// Returns the number of iterations the solver used.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Creates a new solution.
    ///
    /// ## Parameters
    ///
    /// * 'x' - The solution point
    /// * 'inequality_multipliers' - The non-negative multipliers of the inequality rows
    /// * 'status' - The outcome of the solve
    pub fn new(x: DVector<f64>, inequality_multipliers: DVector<f64>, status: QpStatus) -> Self {
        Self {
            x,
            inequality_multipliers,
            status,
            iterations: 0,
            solve_time: Duration::ZERO,
        }
    }

    /// Returns the time the solve took.
    pub fn solve_time(&self) -> Duration {
        self.solve_time
    }

    /// Returns the outcome of the solve.
    pub fn status(&self) -> QpStatus {
        self.status
    }

    /// Returns the solution with the given solver statistics.
    pub fn with_statistics(mut self, iterations: u32, solve_time: Duration) -> Self {
        self.iterations = iterations;
        self.solve_time = solve_time;
        self
    }

    /// Returns the solution point.
    pub fn x(&self) -> &DVector<f64> {
        &self.x
    }
}

/// The capability to solve a convex [QuadraticProgram].
///
/// Implementations must return within the given time budget, reporting
/// [QpStatus::TimedOut] when they could not finish.
pub trait QpSolver: Send + Sync {
    /// Solves the program.
    ///
    /// ## Parameters
    ///
    /// * 'program' - The program to solve. The Hessian must be positive semi-definite.
    /// * 'time_budget' - The maximum time the solve may take, if limited
    ///
    /// ## Errors
    ///
    /// * [Error::SolverFailure] - Returned when the solver could not be set up for the
    ///   program.
    fn solve(
        &self,
        program: &QuadraticProgram,
        time_budget: Option<Duration>,
    ) -> Result<QpSolution, Error>;
}
