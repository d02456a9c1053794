use super::*;
use crate::{task::Task, variable_space::VariableSpace};

fn program() -> QuadraticProgram {
    QuadraticProgram::new(DMatrix::identity(3, 3), DVector::from_vec(vec![-1.0, 0.0, 0.0]))
        .unwrap()
        .with_equalities(
            &DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]),
            &DVector::from_vec(vec![1.0]),
        )
        .unwrap()
        .with_inequalities(
            &DMatrix::from_row_slice(2, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
            &DVector::from_vec(vec![2.0, 0.0]),
        )
        .unwrap()
}

#[test]
fn test_new_with_wrong_hessian_fails() {
    let result = QuadraticProgram::new(DMatrix::identity(2, 3), DVector::zeros(2));

    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
}

#[test]
fn test_with_constraints_checks_sizes() {
    let base = QuadraticProgram::new(DMatrix::identity(2, 2), DVector::zeros(2)).unwrap();

    assert!(base
        .clone()
        .with_equalities(&DMatrix::zeros(1, 3), &DVector::zeros(1))
        .is_err());
    assert!(base
        .with_inequalities(&DMatrix::zeros(1, 2), &DVector::zeros(2))
        .is_err());
}

#[test]
fn test_objective() {
    let program = program();

    assert_eq!(program.objective(&DVector::from_vec(vec![1.0, 0.0, 0.0])), -0.5);
    assert_eq!(program.objective(&DVector::zeros(3)), 0.0);
}

#[test]
fn test_from_task_set() {
    let task = Task::new("task", VariableSpace::KinematicVelocity, 2)
        .with_objective(DMatrix::identity(2, 2), DVector::from_vec(vec![1.0, 2.0]))
        .unwrap()
        .with_bounds(DVector::from_element(2, -1.0), DVector::from_element(2, 1.0))
        .unwrap();
    let set = crate::aggregator::aggregate(&[task]).unwrap();

    let program = QuadraticProgram::from_task_set(&set);

    assert_eq!(program.hessian(), &DMatrix::identity(2, 2));
    assert_eq!(program.gradient(), &DVector::from_vec(vec![-1.0, -2.0]));
    assert_eq!(program.inequality_matrix().nrows(), 4);
    assert_eq!(program.equality_matrix().nrows(), 0);
}

#[test]
fn test_reduce_to_subspace() {
    let program = program();
    let origin = DVector::from_vec(vec![1.0, 0.0, 0.0]);
    let basis = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);

    let reduced = program.reduce(&origin, &basis).unwrap();

    assert_eq!(reduced.dimension(), 2);
    assert_eq!(reduced.hessian(), &DMatrix::identity(2, 2));
    assert_eq!(reduced.gradient(), &DVector::zeros(2));
    assert_eq!(reduced.equality_matrix(), &DMatrix::zeros(1, 2));
    assert_eq!(reduced.equality_target(), &DVector::zeros(1));
    assert_eq!(reduced.inequality_matrix(), &DMatrix::identity(2, 2));
    assert_eq!(reduced.inequality_bound(), &DVector::from_vec(vec![2.0, 0.0]));

    let z = DVector::from_vec(vec![0.5, -1.0]);
    let x = &origin + &basis * &z;
    let difference = program.objective(&x) - program.objective(&origin) - reduced.objective(&z);
    assert!(difference.abs() < 1e-12);
}

#[test]
fn test_reduce_with_wrong_basis_fails() {
    let result = program().reduce(&DVector::zeros(3), &DMatrix::identity(2, 2));

    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
}

#[test]
fn test_without_degenerate_rows_drops_satisfied_rows() {
    let program = QuadraticProgram::new(DMatrix::identity(2, 2), DVector::zeros(2))
        .unwrap()
        .with_equalities(&DMatrix::zeros(1, 2), &DVector::from_vec(vec![1e-12]))
        .unwrap()
        .with_inequalities(
            &DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 0.0]),
            &DVector::from_vec(vec![-1e-12, 1.0, 5.0]),
        )
        .unwrap();

    let reduction = program.without_degenerate_rows(1e-9);

    assert_eq!(reduction.conflicting_rows(), 0);
    assert_eq!(reduction.inequality_rows(), &[1]);
    assert_eq!(reduction.program().equality_matrix().nrows(), 0);
    assert_eq!(
        reduction.program().inequality_matrix(),
        &DMatrix::from_row_slice(1, 2, &[1.0, 0.0])
    );
}

#[test]
fn test_without_degenerate_rows_counts_conflicts() {
    let program = QuadraticProgram::new(DMatrix::identity(2, 2), DVector::zeros(2))
        .unwrap()
        .with_equalities(&DMatrix::zeros(1, 2), &DVector::from_vec(vec![1.0]))
        .unwrap()
        .with_inequalities(&DMatrix::zeros(1, 2), &DVector::from_vec(vec![-1.0]))
        .unwrap();

    let reduction = program.without_degenerate_rows(1e-9);

    assert_eq!(reduction.conflicting_rows(), 2);
}

#[test]
fn test_active_set_uses_slack_and_multipliers() {
    let program = program();
    let solution = QpSolution::new(
        DVector::from_vec(vec![1.0, 1.0, 0.0]),
        DVector::from_vec(vec![0.5, 0.0]),
        QpStatus::Solved,
    );

    assert_eq!(solution.active_set(&program, 1e-6), vec![0, 1]);

    let solution = QpSolution::new(
        DVector::from_vec(vec![1.0, 1.0, -1.0]),
        DVector::from_vec(vec![0.0, 0.0]),
        QpStatus::Solved,
    );

    assert!(solution.active_set(&program, 1e-6).is_empty());
}

#[test]
fn test_failed_solution() {
    let solution = QpSolution::failed(3, 2, QpStatus::Infeasible)
        .with_statistics(4, Duration::from_micros(10));

    assert_eq!(solution.status(), QpStatus::Infeasible);
    assert_eq!(solution.x(), &DVector::zeros(3));
    assert_eq!(solution.inequality_multipliers().len(), 2);
    assert_eq!(solution.iterations(), 4);
    assert_eq!(solution.solve_time(), Duration::from_micros(10));
}

#[test]
fn test_status_display() {
    assert_eq!(QpStatus::Solved.to_string(), "SOLVED");
    assert_eq!(QpStatus::Infeasible.to_string(), "INFEASIBLE");
    assert_eq!(QpStatus::Unbounded.to_string(), "UNBOUNDED");
}
