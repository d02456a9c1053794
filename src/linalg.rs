//! Small dense linear algebra helpers shared by the task, aggregation and solve code.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

#[cfg(test)]
#[path = "linalg_tests.rs"]
mod linalg_tests;

/// Returns true if every entry of the matrix is finite.
pub(crate) fn is_finite_matrix(matrix: &DMatrix<f64>) -> bool {
    matrix.iter().all(|v| v.is_finite())
}

/// Returns true if every entry of the vector is finite.
pub(crate) fn is_finite_vector(vector: &DVector<f64>) -> bool {
    vector.iter().all(|v| v.is_finite())
}

/// Returns the symmetric square root of a positive semi-definite matrix.
///
/// Diagonal matrices take the element wise square root. Eigenvalues that are slightly
/// negative due to round-off are clamped to zero.
pub(crate) fn psd_square_root(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    if is_diagonal(matrix) {
        let diagonal = matrix.diagonal().map(|v| v.max(0.0).sqrt());
        return DMatrix::from_diagonal(&diagonal);
    }

    let eigen = SymmetricEigen::new(matrix.clone());
    let roots = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    &eigen.eigenvectors * DMatrix::from_diagonal(&roots) * eigen.eigenvectors.transpose()
}

/// Returns true if all the off-diagonal entries of the matrix are zero.
pub(crate) fn is_diagonal(matrix: &DMatrix<f64>) -> bool {
    matrix
        .row_iter()
        .enumerate()
        .all(|(i, row)| row.iter().enumerate().all(|(j, v)| i == j || *v == 0.0))
}

/// Selects the given rows of a matrix, in the given order.
pub(crate) fn select_matrix_rows(matrix: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), matrix.ncols(), |r, c| matrix[(rows[r], c)])
}

/// Selects the given entries of a vector, in the given order.
pub(crate) fn select_vector_rows(vector: &DVector<f64>, rows: &[usize]) -> DVector<f64> {
    DVector::from_fn(rows.len(), |r, _| vector[rows[r]])
}

/// Places the rows of `bottom` below the rows of `top`. Both need the same column count.
pub(crate) fn stack_rows(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> DMatrix<f64> {
    let columns = top.ncols().max(bottom.ncols());
    let mut result = DMatrix::zeros(top.nrows() + bottom.nrows(), columns);
    result
        .view_mut((0, 0), (top.nrows(), top.ncols()))
        .copy_from(top);
    result
        .view_mut((top.nrows(), 0), (bottom.nrows(), bottom.ncols()))
        .copy_from(bottom);
    result
}

/// Places the entries of `bottom` after the entries of `top`.
pub(crate) fn stack_vectors(top: &DVector<f64>, bottom: &DVector<f64>) -> DVector<f64> {
    let mut result = DVector::zeros(top.len() + bottom.len());
    result.rows_mut(0, top.len()).copy_from(top);
    result.rows_mut(top.len(), bottom.len()).copy_from(bottom);
    result
}
