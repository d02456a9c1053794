//! Computes the subspace in which lower priority levels may move the solution without
//! disturbing the levels above them.
//!
//! The projector keeps an orthonormal basis `N` of the free subspace. Given the active
//! rows `Aᵢ` of a solved level it restricts them to the free subspace, `Āᵢ = Aᵢ N`, and
//! returns `N · null(Āᵢ)`. The null space is computed from a singular value
//! decomposition: the right singular vectors whose singular value does not exceed the
//! rank tolerance `τ` span it.

use nalgebra::{DMatrix, SVD};
use serde::{Deserialize, Serialize};

use crate::Error;

#[cfg(test)]
#[path = "null_space_tests.rs"]
mod null_space_tests;

/// Singular values of the restricted rows that lie within this factor above the rank
/// tolerance mark the rank decision as numerically fragile.
const RANK_DEFICIENCY_MARGIN: f64 = 1e3;

/// Defines how the numerical rank tolerance `τ` is chosen.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RankTolerance {
    /// `τ = max(max(m, k) · σ_max · ε, floor)` for an `m x k` restricted matrix.
    Auto {
        /// The smallest tolerance that is ever used.
        floor: f64,
    },

    /// A fixed tolerance.
    Absolute {
        /// The tolerance.
        value: f64,
    },
}

impl Default for RankTolerance {
    fn default() -> Self {
        RankTolerance::Auto { floor: 1e-9 }
    }
}

impl RankTolerance {
    /// Returns the tolerance for a matrix of the given size and largest singular value.
    pub fn resolve(&self, rows: usize, columns: usize, largest_singular_value: f64) -> f64 {
        match self {
            RankTolerance::Auto { floor } => {
                let scaled = (rows.max(columns) as f64) * largest_singular_value * f64::EPSILON;
                scaled.max(*floor)
            }
            RankTolerance::Absolute { value } => *value,
        }
    }

    /// Checks that the tolerance is a finite, non-negative number.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when the tolerance is negative or not
    ///   finite.
    pub fn validate(&self) -> Result<(), Error> {
        let value = match self {
            RankTolerance::Auto { floor } => *floor,
            RankTolerance::Absolute { value } => *value,
        };

        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidConfiguration {
                field: "rank_tolerance".to_string(),
                message: format!("must be a finite, non-negative number, got {}", value),
            });
        }

        Ok(())
    }
}

/// The result of restricting a level's active rows to the free subspace.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    /// The orthonormal basis of the subspace that is still free after the level.
    basis: DMatrix<f64>,

    /// The rank of the active rows within the previous free subspace.
    rank: usize,

    /// The number of active rows.
    rows: usize,

    /// The dimension of the free subspace before the level.
    free_dimension_before: usize,

    /// The tolerance that was used to decide the rank.
    tolerance: f64,

    /// True if a singular value lies just above the tolerance.
    near_singular: bool,
}

impl Projection {
    /// Returns the basis of the remaining free subspace.
    pub fn basis(&self) -> &DMatrix<f64> {
        &self.basis
    }

    /// Returns the dimension of the remaining free subspace.
    pub fn free_dimension(&self) -> usize {
        self.basis.ncols()
    }

    /// Returns the dimension of the free subspace before the level.
    pub fn free_dimension_before(&self) -> usize {
        self.free_dimension_before
    }

    /// Returns the basis of the remaining free subspace, consuming the projection.
    pub fn into_basis(self) -> DMatrix<f64> {
        self.basis
    }

    /// Returns true if the rank decision is fragile: a singular value of the restricted
    /// rows lies within a small factor above the tolerance. The null space handed to the
    /// next level is then less precise.
    pub fn is_rank_deficient(&self) -> bool {
        self.near_singular
    }

    /// Returns true if the level used up the last free directions, leaving nothing for
    /// the levels below.
    pub fn is_saturated(&self) -> bool {
        self.free_dimension_before > 0 && self.basis.ncols() == 0
    }

    /// Returns the rank of the active rows within the previous free subspace.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the number of active rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the tolerance that was used to decide the rank.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

/// Computes null-space bases with a configurable rank tolerance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NullSpaceProjector {
    tolerance: RankTolerance,
}

impl NullSpaceProjector {
    /// Creates a new projector.
    pub fn new(tolerance: RankTolerance) -> Self {
        Self { tolerance }
    }

    /// Restricts the active rows of a solved level to the free subspace and returns the
    /// basis of the subspace that remains free.
    ///
    /// ## Parameters
    ///
    /// * 'basis' - The `n x k` orthonormal basis of the current free subspace
    /// * 'active' - The `m x n` equality and active inequality rows of the solved level
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the active rows do not have one column
    ///   per row of the basis.
    pub fn project(&self, basis: &DMatrix<f64>, active: &DMatrix<f64>) -> Result<Projection, Error> {
        if active.ncols() != basis.nrows() {
            return Err(Error::DimensionMismatch {
                what: "the active constraint columns".to_string(),
                expected: basis.nrows(),
                found: active.ncols(),
            });
        }

        let free = basis.ncols();
        let rows = active.nrows();
        if free == 0 || rows == 0 {
            return Ok(Projection {
                basis: basis.clone(),
                rank: 0,
                rows,
                free_dimension_before: free,
                tolerance: self.tolerance.resolve(rows, free, 0.0),
                near_singular: false,
            });
        }

        // Pad with zero rows so the decomposition yields all k right singular vectors.
        let restricted = active * basis;
        let mut padded = DMatrix::zeros(rows.max(free), free);
        padded.view_mut((0, 0), (rows, free)).copy_from(&restricted);

        let svd = SVD::new(padded, false, true);
        let v_t = svd.v_t.as_ref().ok_or_else(|| Error::SolverFailure {
            message: "the singular value decomposition did not produce right singular vectors"
                .to_string(),
        })?;

        let largest = svd.singular_values.max();
        let tolerance = self.tolerance.resolve(rows, free, largest);

        let null_rows: Vec<usize> = (0..free)
            .filter(|i| svd.singular_values[*i] <= tolerance)
            .collect();
        let near_singular = svd
            .singular_values
            .iter()
            .any(|s| *s > tolerance && *s <= tolerance * RANK_DEFICIENCY_MARGIN);

        let null = DMatrix::from_fn(free, null_rows.len(), |r, c| v_t[(null_rows[c], r)]);

        Ok(Projection {
            basis: basis * null,
            rank: free - null_rows.len(),
            rows,
            free_dimension_before: free,
            tolerance,
            near_singular,
        })
    }

    /// Returns the rank tolerance policy.
    pub fn tolerance(&self) -> RankTolerance {
        self.tolerance
    }
}

/// Returns the basis of the full variable space, the starting point of every cycle.
pub fn identity_basis(dimension: usize) -> DMatrix<f64> {
    DMatrix::identity(dimension, dimension)
}
