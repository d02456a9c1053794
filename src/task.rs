//! Defines a single task and the capability to build one from the robot state.
//!
//! A [Task] describes what the robot should do during one control cycle as a weighted
//! least-squares objective over the optimization variable `x`:
//!
//! ```text
//! ½ ‖A x − b‖²_W + cᵀ x
//! ```
//!
//! together with linear constraints that must hold exactly:
//!
//! ```text
//! Ce x  = de
//! Ci x ≤ di
//! ```
//!
//! Tasks are created once per cycle from a [RobotState] snapshot by a [TaskSpecification]
//! and are immutable once they are handed to the aggregator.

use std::fmt::Display;

use float_cmp::{ApproxEq, F64Margin};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::{
    linalg::{
        is_finite_matrix, is_finite_vector, psd_square_root, stack_rows, stack_vectors,
    },
    state::robot_state::RobotState,
    target::TargetHandle,
    variable_space::{VariableLayout, VariableSpace},
    Error,
};

#[cfg(test)]
#[path = "task_tests.rs"]
mod task_tests;

/// Relative tolerance used when checking the weight matrix for symmetry and definiteness.
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Defines the closed set of task kinds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Tracks a target configuration of the joints.
    Posture,

    /// Tracks a target for a frame of the robot.
    Cartesian,

    /// Tracks a target for the center of mass.
    CenterOfMass,

    /// Keeps the optimization variable small.
    MinimumEffort,

    /// Keeps the joints inside their position, velocity and acceleration limits.
    JointLimits,

    /// Keeps the accelerations and contact forces consistent with the dynamics.
    EquationsOfMotion,

    /// Keeps the contact forces inside the friction cones.
    FrictionCone,

    /// Uses matrices provided by the caller.
    Raw,
}

impl TaskKind {
    /// Returns the name of the kind as used in the configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Posture => "posture",
            TaskKind::Cartesian => "cartesian",
            TaskKind::CenterOfMass => "center_of_mass",
            TaskKind::MinimumEffort => "minimum_effort",
            TaskKind::JointLimits => "joint_limits",
            TaskKind::EquationsOfMotion => "equations_of_motion",
            TaskKind::FrictionCone => "friction_cone",
            TaskKind::Raw => "raw",
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The capability to build a [Task] from the state of the robot.
///
/// Building must be a pure function of the state and the current target. Any state that
/// has to survive from one cycle to the next belongs to the owner of the specification.
pub trait TaskSpecification: Send + Sync {
    /// Builds the task for the current control cycle.
    ///
    /// ## Parameters
    ///
    /// * 'state' - The snapshot of the robot for the current control cycle
    ///
    /// ## Errors
    ///
    /// * [Error::MissingStateQuantity] - Returned when the state does not hold a quantity
    ///   the task needs.
    /// * [Error::MalformedTask] - Returned when the task matrices do not agree with each
    ///   other or with the variable space.
    /// * [Error::SingularWeight] - Returned when the weight matrix is not positive
    ///   semi-definite.
    fn build(&self, state: &RobotState) -> Result<Task, Error>;

    /// Returns the kind of the task.
    fn kind(&self) -> TaskKind;

    /// Returns the name of the task.
    fn name(&self) -> &str;

    /// Returns the handle through which the target of the task can be changed, if the
    /// task has a target.
    fn target(&self) -> Option<TargetHandle> {
        None
    }

    /// Returns the variable space the task is built for.
    fn variable_space(&self) -> VariableSpace;
}

/// A weighted least-squares objective with optional linear constraints over the
/// optimization variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    /// The name of the task, used in reports and errors.
    name: String,

    /// The variable space of the task.
    space: VariableSpace,

    /// The number of columns of every matrix of the task.
    dimension: usize,

    /// The objective matrix `A`.
    objective_matrix: DMatrix<f64>,

    /// The objective target `b`.
    objective_target: DVector<f64>,

    /// The positive semi-definite weight `W`.
    weight: DMatrix<f64>,

    /// The linear cost `c`.
    linear_cost: Option<DVector<f64>>,

    /// The equality matrix `Ce`.
    equality_matrix: DMatrix<f64>,

    /// The equality target `de`.
    equality_target: DVector<f64>,

    /// The inequality matrix `Ci`.
    inequality_matrix: DMatrix<f64>,

    /// The inequality bound `di`.
    inequality_bound: DVector<f64>,
}

impl Task {
    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedTask {
            task: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn check_columns(&self, what: &str, matrix: &DMatrix<f64>) -> Result<(), Error> {
        if matrix.ncols() != self.dimension {
            return Err(self.malformed(format!(
                "{} has {} columns but the variable has {}",
                what,
                matrix.ncols(),
                self.dimension
            )));
        }

        if !is_finite_matrix(matrix) {
            return Err(self.malformed(format!("{} contains non-finite values", what)));
        }

        Ok(())
    }

    fn check_rows(&self, what: &str, rows: usize, vector: &DVector<f64>) -> Result<(), Error> {
        if vector.len() != rows {
            return Err(self.malformed(format!(
                "{} has {} entries but the matrix has {} rows",
                what,
                vector.len(),
                rows
            )));
        }

        Ok(())
    }

    fn check_weight(&self, weight: &DMatrix<f64>) -> Result<(), Error> {
        let rows = self.objective_matrix.nrows();
        if weight.nrows() != rows || weight.ncols() != rows {
            return Err(self.malformed(format!(
                "the weight is {}x{} but the objective has {} rows",
                weight.nrows(),
                weight.ncols(),
                rows
            )));
        }

        if !is_finite_matrix(weight) {
            return Err(self.malformed("the weight contains non-finite values"));
        }

        if rows == 0 {
            return Ok(());
        }

        let scale = weight.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        let margin = F64Margin {
            epsilon: WEIGHT_TOLERANCE * scale,
            ulps: 4,
        };
        let symmetric = (0..rows)
            .all(|i| (0..i).all(|j| weight[(i, j)].approx_eq(weight[(j, i)], margin)));
        if !symmetric {
            return Err(self.malformed("the weight is not symmetric"));
        }

        let smallest_eigenvalue = SymmetricEigen::new(weight.clone()).eigenvalues.min();
        if smallest_eigenvalue < -WEIGHT_TOLERANCE * scale {
            return Err(Error::SingularWeight {
                task: self.name.clone(),
                smallest_eigenvalue,
            });
        }

        Ok(())
    }

    fn push_inequality_rows(&mut self, matrix: &DMatrix<f64>, bound: &DVector<f64>) {
        self.inequality_matrix = stack_rows(&self.inequality_matrix, matrix);
        self.inequality_bound = stack_vectors(&self.inequality_bound, bound);
    }

    /// Appends the rows `sign * C x ≤ sign * limit` for every finite limit.
    fn push_one_sided_rows(&mut self, matrix: &DMatrix<f64>, limit: &DVector<f64>, sign: f64) {
        let rows: Vec<usize> = (0..limit.len()).filter(|i| limit[*i].is_finite()).collect();
        let selected = DMatrix::from_fn(rows.len(), matrix.ncols(), |r, c| {
            sign * matrix[(rows[r], c)]
        });
        let bound = DVector::from_fn(rows.len(), |r, _| sign * limit[rows[r]]);
        self.push_inequality_rows(&selected, &bound);
    }

    /// Returns the number of columns of the task matrices.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the equality matrix `Ce`.
    pub fn equality_matrix(&self) -> &DMatrix<f64> {
        &self.equality_matrix
    }

    /// Returns the equality target `de`.
    pub fn equality_target(&self) -> &DVector<f64> {
        &self.equality_target
    }

    /// Returns the importance of the task within its level, the trace of the weight.
    ///
    /// Used to decide which inequality rows are relaxed first when a level is infeasible.
    pub fn importance(&self) -> f64 {
        self.weight.trace()
    }

    /// Returns the inequality bound `di`.
    pub fn inequality_bound(&self) -> &DVector<f64> {
        &self.inequality_bound
    }

    /// Returns the inequality matrix `Ci`.
    pub fn inequality_matrix(&self) -> &DMatrix<f64> {
        &self.inequality_matrix
    }

    /// Returns the largest violation of the task constraints at the given point.
    ///
    /// Equalities contribute their absolute error, inequalities their positive excess.
    pub fn constraint_violation(&self, x: &DVector<f64>) -> f64 {
        let equality = (&self.equality_matrix * x - &self.equality_target)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let inequality = (&self.inequality_matrix * x - &self.inequality_bound)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(*v));
        equality.max(inequality)
    }

    /// Returns the linear cost `c`, if the task has one.
    pub fn linear_cost(&self) -> Option<&DVector<f64>> {
        self.linear_cost.as_ref()
    }

    /// Returns the name of the task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a task without objective and without constraints.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the task
    /// * 'space' - The variable space of the task
    /// * 'dimension' - The number of entries of the optimization variable
    pub fn new(name: impl Into<String>, space: VariableSpace, dimension: usize) -> Self {
        Self {
            name: name.into(),
            space,
            dimension,
            objective_matrix: DMatrix::zeros(0, dimension),
            objective_target: DVector::zeros(0),
            weight: DMatrix::zeros(0, 0),
            linear_cost: None,
            equality_matrix: DMatrix::zeros(0, dimension),
            equality_target: DVector::zeros(0),
            inequality_matrix: DMatrix::zeros(0, dimension),
            inequality_bound: DVector::zeros(0),
        }
    }

    /// Returns the objective matrix `A`.
    pub fn objective_matrix(&self) -> &DMatrix<f64> {
        &self.objective_matrix
    }

    /// Returns the objective target `b`.
    pub fn objective_target(&self) -> &DVector<f64> {
        &self.objective_target
    }

    /// Returns the weighted objective residual `‖√W (A x − b)‖` at the given point.
    pub fn residual(&self, x: &DVector<f64>) -> f64 {
        let (matrix, target) = self.weighted_objective();
        (matrix * x - target).norm()
    }

    /// Returns the variable space of the task.
    pub fn space(&self) -> VariableSpace {
        self.space
    }

    /// Checks that the task fits the given variable layout.
    ///
    /// ## Errors
    ///
    /// * [Error::VariableSpaceMismatch] - Returned when the task was built for another
    ///   variable space.
    /// * [Error::MalformedTask] - Returned when the task has a different number of columns
    ///   than the layout.
    pub fn validate_for(&self, layout: &VariableLayout) -> Result<(), Error> {
        if self.space != layout.space() {
            return Err(Error::VariableSpaceMismatch {
                task: self.name.clone(),
                expected: layout.space(),
                found: self.space,
            });
        }

        if self.dimension != layout.dimension() {
            return Err(self.malformed(format!(
                "the task has {} columns but the {} variable has {}",
                self.dimension,
                layout.space(),
                layout.dimension()
            )));
        }

        Ok(())
    }

    /// Returns the weight `W`.
    pub fn weight(&self) -> &DMatrix<f64> {
        &self.weight
    }

    /// Returns the objective rows scaled by the square root of the weight: `(√W A, √W b)`.
    pub fn weighted_objective(&self) -> (DMatrix<f64>, DVector<f64>) {
        let root = psd_square_root(&self.weight);
        (&root * &self.objective_matrix, &root * &self.objective_target)
    }

    /// Adds the bilateral constraint `lower ≤ C x ≤ upper`. Infinite limits are skipped.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the sizes do not match, when a limit is NaN
    ///   or when a lower limit is larger than the matching upper limit.
    pub fn with_bilateral(
        mut self,
        matrix: DMatrix<f64>,
        lower: DVector<f64>,
        upper: DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("the bilateral matrix", &matrix)?;
        self.check_rows("the lower limit", matrix.nrows(), &lower)?;
        self.check_rows("the upper limit", matrix.nrows(), &upper)?;
        if lower.iter().chain(upper.iter()).any(|v| v.is_nan()) {
            return Err(self.malformed("the limits contain NaN values"));
        }

        if let Some(row) = (0..lower.len()).find(|i| lower[*i] > upper[*i]) {
            return Err(self.malformed(format!(
                "the lower limit {} of row {} is above the upper limit {}",
                lower[row], row, upper[row]
            )));
        }

        self.push_one_sided_rows(&matrix, &upper, 1.0);
        self.push_one_sided_rows(&matrix, &lower, -1.0);
        Ok(self)
    }

    /// Adds the bounds `lower ≤ x ≤ upper`. Infinite bounds are skipped.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the bounds do not have one entry per
    ///   variable, when a bound is NaN or when a lower bound is larger than the matching
    ///   upper bound.
    pub fn with_bounds(self, lower: DVector<f64>, upper: DVector<f64>) -> Result<Self, Error> {
        let identity = DMatrix::identity(self.dimension, self.dimension);
        self.with_bilateral(identity, lower, upper)
    }

    /// Adds the equality constraint `Ce x = de`.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the sizes do not match or when the
    ///   constraint contains non-finite values.
    pub fn with_equality(
        mut self,
        matrix: DMatrix<f64>,
        target: DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("the equality matrix", &matrix)?;
        self.check_rows("the equality target", matrix.nrows(), &target)?;
        if !is_finite_vector(&target) {
            return Err(self.malformed("the equality target contains non-finite values"));
        }

        self.equality_matrix = stack_rows(&self.equality_matrix, &matrix);
        self.equality_target = stack_vectors(&self.equality_target, &target);
        Ok(self)
    }

    /// Adds the inequality constraint `Ci x ≤ di`. Rows with an infinite bound are skipped.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the sizes do not match, when the matrix
    ///   contains non-finite values or when a bound is NaN or minus infinity.
    pub fn with_inequality(
        mut self,
        matrix: DMatrix<f64>,
        bound: DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("the inequality matrix", &matrix)?;
        self.check_rows("the inequality bound", matrix.nrows(), &bound)?;
        if bound.iter().any(|v| v.is_nan() || *v == f64::NEG_INFINITY) {
            return Err(self.malformed("the inequality bound contains NaN or minus infinity"));
        }

        self.push_one_sided_rows(&matrix, &bound, 1.0);
        Ok(self)
    }

    /// Adds the linear cost `cᵀ x` to the objective.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the cost does not have one entry per
    ///   variable or contains non-finite values.
    pub fn with_linear_cost(mut self, cost: DVector<f64>) -> Result<Self, Error> {
        self.check_rows("the linear cost", self.dimension, &cost)?;
        if !is_finite_vector(&cost) {
            return Err(self.malformed("the linear cost contains non-finite values"));
        }

        self.linear_cost = Some(cost);
        Ok(self)
    }

    /// Adds the unilateral constraint `lower ≤ C x`. Infinite limits are skipped.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the sizes do not match or when a limit is
    ///   NaN.
    pub fn with_lower_unilateral(
        mut self,
        matrix: DMatrix<f64>,
        lower: DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("the unilateral matrix", &matrix)?;
        self.check_rows("the lower limit", matrix.nrows(), &lower)?;
        if lower.iter().any(|v| v.is_nan()) {
            return Err(self.malformed("the lower limit contains NaN values"));
        }

        self.push_one_sided_rows(&matrix, &lower, -1.0);
        Ok(self)
    }

    /// Replaces the objective with `‖A x − b‖²` and resets the weight to the identity.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the sizes do not match or when the
    ///   objective contains non-finite values.
    pub fn with_objective(
        mut self,
        matrix: DMatrix<f64>,
        target: DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("the objective matrix", &matrix)?;
        self.check_rows("the objective target", matrix.nrows(), &target)?;
        if !is_finite_vector(&target) {
            return Err(self.malformed("the objective target contains non-finite values"));
        }

        self.weight = DMatrix::identity(matrix.nrows(), matrix.nrows());
        self.objective_matrix = matrix;
        self.objective_target = target;
        Ok(self)
    }

    /// Scales the weight of every objective row by the given factor.
    ///
    /// ## Errors
    ///
    /// * [Error::SingularWeight] - Returned when the factor is negative.
    /// * [Error::MalformedTask] - Returned when the factor is not finite.
    pub fn with_scalar_weight(mut self, weight: f64) -> Result<Self, Error> {
        if !weight.is_finite() {
            return Err(self.malformed(format!("the weight {} is not finite", weight)));
        }

        if weight < 0.0 {
            return Err(Error::SingularWeight {
                task: self.name.clone(),
                smallest_eigenvalue: weight,
            });
        }

        self.weight = DMatrix::identity(self.objective_matrix.nrows(), self.objective_matrix.nrows())
            * weight;
        Ok(self)
    }

    /// Adds the unilateral constraint `C x ≤ upper`. Infinite limits are skipped.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the sizes do not match or when a limit is
    ///   NaN.
    pub fn with_upper_unilateral(
        mut self,
        matrix: DMatrix<f64>,
        upper: DVector<f64>,
    ) -> Result<Self, Error> {
        self.check_columns("the unilateral matrix", &matrix)?;
        self.check_rows("the upper limit", matrix.nrows(), &upper)?;
        if upper.iter().any(|v| v.is_nan()) {
            return Err(self.malformed("the upper limit contains NaN values"));
        }

        self.push_one_sided_rows(&matrix, &upper, 1.0);
        Ok(self)
    }

    /// Replaces the weight of the objective rows.
    ///
    /// ## Errors
    ///
    /// * [Error::MalformedTask] - Returned when the weight is not square with one row per
    ///   objective row, is not symmetric or contains non-finite values.
    /// * [Error::SingularWeight] - Returned when the weight has a negative eigenvalue.
    pub fn with_weight(mut self, weight: DMatrix<f64>) -> Result<Self, Error> {
        self.check_weight(&weight)?;
        self.weight = weight;
        Ok(self)
    }
}
