//! Provides the default [QpSolver] backend.
//!
//! Programs without inequality rows are solved directly from their KKT system, which also
//! handles singular Hessians and redundant equalities through a pseudo-inverse. Programs
//! with inequality rows are handed to the Clarabel interior point solver, with the
//! equalities in a zero cone and the inequalities in a non-negative cone:
//!
//! ```text
//! [A; C] x + s = [b; d],   s ∈ {0}ᵐ × ℝ₊ᵖ
//! ```

use std::time::{Duration, Instant};

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector, SVD};

use crate::{
    config::SolverSettings,
    linalg::{stack_rows, stack_vectors},
    qp::{QpSolution, QpSolver, QpStatus, QuadraticProgram},
    Error,
};

#[cfg(test)]
#[path = "solver_tests.rs"]
mod solver_tests;

/// Entries with a magnitude at or below this value are left out of the sparse matrices.
const SPARSE_ZERO: f64 = 1e-15;

/// Singular values of the KKT matrix at or below this fraction of the largest one are
/// treated as zero. Rounding in `AᵀA` leaves singular values far above machine precision
/// in directions the objective does not constrain.
const KKT_RANK_TOLERANCE: f64 = 1.5e-8;

/// Solves quadratic programs with a dense KKT solve or with Clarabel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClarabelSolver {
    settings: SolverSettings,
}

impl ClarabelSolver {
    /// Creates a new solver with the given settings.
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Returns the settings of the solver.
    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn solve_conic(
        &self,
        program: &QuadraticProgram,
        time_budget: Option<Duration>,
    ) -> Result<(QpSolution, u32), Error> {
        let equality_rows = program.equality_target().len();
        let inequality_rows = program.inequality_bound().len();

        let p = dmatrix_to_csc_upper_tri(program.hessian());
        let a = dmatrix_to_csc(&stack_rows(
            program.equality_matrix(),
            program.inequality_matrix(),
        ));
        let q: Vec<f64> = program.gradient().iter().copied().collect();
        let b: Vec<f64> = stack_vectors(program.equality_target(), program.inequality_bound())
            .iter()
            .copied()
            .collect();

        let mut cones: Vec<SupportedConeT<f64>> = vec![];
        if equality_rows > 0 {
            cones.push(ZeroConeT(equality_rows));
        }
        if inequality_rows > 0 {
            cones.push(NonnegativeConeT(inequality_rows));
        }

        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.settings.max_iterations)
            .verbose(false)
            .tol_gap_abs(self.settings.tolerance_gap_abs)
            .tol_gap_rel(self.settings.tolerance_gap_rel)
            .tol_feas(self.settings.tolerance_feasibility)
            .time_limit(time_budget.map(|d| d.as_secs_f64()).unwrap_or(f64::INFINITY))
            .build()
            .map_err(|e| Error::SolverFailure {
                message: format!("invalid solver settings: {:?}", e),
            })?;

        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings).map_err(|e| {
            Error::SolverFailure {
                message: format!("failed to set up the problem: {:?}", e),
            }
        })?;
        solver.solve();

        let solution = &solver.solution;
        let status = match solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => QpStatus::Solved,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                QpStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                QpStatus::Unbounded
            }
            SolverStatus::MaxTime => QpStatus::TimedOut,
            _ => QpStatus::Failed,
        };

        let x = DVector::from_column_slice(&solution.x);
        let multipliers =
            DVector::from_fn(inequality_rows, |i, _| solution.z[equality_rows + i].max(0.0));

        Ok((QpSolution::new(x, multipliers, status), solution.iterations))
    }

    fn solve_equality_constrained(&self, program: &QuadraticProgram) -> Result<QpSolution, Error> {
        let n = program.dimension();
        let m = program.equality_target().len();
        let hessian = program.hessian();
        let matrix = program.equality_matrix();

        let mut kkt = DMatrix::zeros(n + m, n + m);
        kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
        kkt.view_mut((0, n), (n, m)).copy_from(&matrix.transpose());
        kkt.view_mut((n, 0), (m, n)).copy_from(matrix);
        let rhs = stack_vectors(&(-program.gradient()), program.equality_target());

        let svd = SVD::new(kkt, true, true);
        let eps = (KKT_RANK_TOLERANCE * svd.singular_values.max()).max(f64::EPSILON);
        let solution = svd.solve(&rhs, eps).map_err(|e| Error::SolverFailure {
            message: e.to_string(),
        })?;

        let x: DVector<f64> = solution.rows(0, n).into_owned();
        let multipliers: DVector<f64> = solution.rows(n, m).into_owned();

        let tolerance = self.settings.tolerance_consistency;
        let primal = (matrix * &x - program.equality_target()).norm();
        let primal_scale = 1.0 + program.equality_target().norm() + matrix.norm() * x.norm();
        if primal > tolerance * primal_scale {
            return Ok(QpSolution::failed(n, 0, QpStatus::Infeasible));
        }

        let stationarity = (hessian * &x + program.gradient() + matrix.transpose() * multipliers).norm();
        let dual_scale = 1.0 + program.gradient().norm() + hessian.norm() * x.norm();
        if stationarity > tolerance * dual_scale {
            return Ok(QpSolution::failed(n, 0, QpStatus::Unbounded));
        }

        Ok(QpSolution::new(x, DVector::zeros(0), QpStatus::Solved))
    }
}

impl QpSolver for ClarabelSolver {
    fn solve(
        &self,
        program: &QuadraticProgram,
        time_budget: Option<Duration>,
    ) -> Result<QpSolution, Error> {
        let start = Instant::now();
        let n = program.dimension();
        let inequality_rows = program.inequality_bound().len();

        let reduction = program.without_degenerate_rows(self.settings.tolerance_consistency);
        if reduction.conflicting_rows() > 0 {
            return Ok(QpSolution::failed(n, inequality_rows, QpStatus::Infeasible)
                .with_statistics(0, start.elapsed()));
        }

        let reduced = reduction.program();
        let (solution, iterations) = if n == 0 {
            (
                QpSolution::new(
                    DVector::zeros(0),
                    DVector::zeros(reduced.inequality_bound().len()),
                    QpStatus::Solved,
                ),
                0,
            )
        } else if reduced.inequality_bound().is_empty() {
            (self.solve_equality_constrained(reduced)?, 0)
        } else {
            self.solve_conic(reduced, time_budget)?
        };

        let mut multipliers = DVector::zeros(inequality_rows);
        for (reduced_row, row) in reduction.inequality_rows().iter().enumerate() {
            if let Some(value) = solution.inequality_multipliers().get(reduced_row) {
                multipliers[*row] = *value;
            }
        }

        let elapsed = start.elapsed();
        let status = match time_budget {
            Some(budget) if elapsed > budget => QpStatus::TimedOut,
            _ => solution.status(),
        };

        Ok(
            QpSolution::new(solution.x().clone(), multipliers, status)
                .with_statistics(iterations, elapsed),
        )
    }
}

/// Converts a dense matrix to a Clarabel compressed sparse column matrix.
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > SPARSE_ZERO {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Converts the upper triangle of a symmetric dense matrix to a Clarabel compressed sparse
/// column matrix.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            let v = m[(i, j)];
            if v.abs() > SPARSE_ZERO {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
