use super::*;
use float_cmp::{ApproxEq, F64Margin};

fn margin() -> F64Margin {
    F64Margin {
        epsilon: 1e-9,
        ulps: 4,
    }
}

fn task(dimension: usize) -> Task {
    Task::new("test", VariableSpace::KinematicVelocity, dimension)
}

#[test]
fn test_new_task_has_no_rows() {
    let task = task(3);

    assert_eq!(task.name(), "test");
    assert_eq!(task.dimension(), 3);
    assert_eq!(task.space(), VariableSpace::KinematicVelocity);
    assert_eq!(task.objective_matrix().shape(), (0, 3));
    assert_eq!(task.equality_matrix().shape(), (0, 3));
    assert_eq!(task.inequality_matrix().shape(), (0, 3));
    assert!(task.linear_cost().is_none());
    assert_eq!(task.importance(), 0.0);
}

#[test]
fn test_with_objective_sets_identity_weight() {
    let task = task(2)
        .with_objective(DMatrix::identity(2, 2), DVector::from_vec(vec![1.0, 2.0]))
        .unwrap();

    assert_eq!(task.weight(), &DMatrix::identity(2, 2));
    assert_eq!(task.importance(), 2.0);
    assert!(task
        .residual(&DVector::from_vec(vec![1.0, 2.0]))
        .approx_eq(0.0, margin()));
    assert!(task
        .residual(&DVector::from_vec(vec![1.0, 0.0]))
        .approx_eq(2.0, margin()));
}

#[test]
fn test_with_objective_with_wrong_columns_is_malformed() {
    let result = task(3).with_objective(DMatrix::identity(2, 2), DVector::zeros(2));

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}

#[test]
fn test_with_objective_with_wrong_target_size_is_malformed() {
    let result = task(2).with_objective(DMatrix::identity(2, 2), DVector::zeros(3));

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}

#[test]
fn test_with_objective_with_nan_is_malformed() {
    let result = task(1).with_objective(
        DMatrix::from_element(1, 1, f64::NAN),
        DVector::zeros(1),
    );

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}

#[test]
fn test_with_weight_accepts_positive_semi_definite_matrix() {
    let weight = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    let task = task(2)
        .with_objective(DMatrix::identity(2, 2), DVector::zeros(2))
        .unwrap()
        .with_weight(weight.clone())
        .unwrap();

    assert_eq!(task.weight(), &weight);
}

#[test]
fn test_with_weight_rejects_indefinite_matrix() {
    let weight = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
    let result = task(2)
        .with_objective(DMatrix::identity(2, 2), DVector::zeros(2))
        .unwrap()
        .with_weight(weight);

    match result {
        Err(Error::SingularWeight {
            task,
            smallest_eigenvalue,
        }) => {
            assert_eq!(task, "test");
            assert!(smallest_eigenvalue.approx_eq(-1.0, margin()));
        }
        other => panic!("Expected a singular weight error, got {:?}", other),
    }
}

#[test]
fn test_with_weight_rejects_asymmetric_matrix() {
    let weight = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 1.0]);
    let result = task(2)
        .with_objective(DMatrix::identity(2, 2), DVector::zeros(2))
        .unwrap()
        .with_weight(weight);

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}

#[test]
fn test_with_weight_rejects_wrong_size() {
    let result = task(2)
        .with_objective(DMatrix::identity(2, 2), DVector::zeros(2))
        .unwrap()
        .with_weight(DMatrix::identity(3, 3));

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}

#[test]
fn test_with_scalar_weight() {
    let task = task(2)
        .with_objective(DMatrix::identity(2, 2), DVector::zeros(2))
        .unwrap()
        .with_scalar_weight(4.0)
        .unwrap();

    assert_eq!(task.importance(), 8.0);

    let (matrix, _) = task.weighted_objective();
    assert_eq!(matrix, DMatrix::identity(2, 2) * 2.0);
}

#[test]
fn test_with_negative_scalar_weight_is_singular() {
    let result = task(1)
        .with_objective(DMatrix::identity(1, 1), DVector::zeros(1))
        .unwrap()
        .with_scalar_weight(-1.0);

    assert!(matches!(result, Err(Error::SingularWeight { .. })));
}

#[test]
fn test_weighted_objective_with_full_weight() {
    let weight = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
    let task = task(2)
        .with_objective(
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]),
            DVector::from_vec(vec![1.0, -1.0]),
        )
        .unwrap()
        .with_weight(weight.clone())
        .unwrap();

    let (matrix, target) = task.weighted_objective();
    let hessian = matrix.transpose() * &matrix;
    let expected_hessian =
        task.objective_matrix().transpose() * &weight * task.objective_matrix();
    let gradient = matrix.transpose() * target;
    let expected_gradient =
        task.objective_matrix().transpose() * &weight * task.objective_target();

    for (actual, expected) in hessian.iter().zip(expected_hessian.iter()) {
        assert!(actual.approx_eq(*expected, margin()));
    }
    for (actual, expected) in gradient.iter().zip(expected_gradient.iter()) {
        assert!(actual.approx_eq(*expected, margin()));
    }
}

#[test]
fn test_with_bounds_skips_infinite_bounds() {
    let task = task(2)
        .with_bounds(
            DVector::from_vec(vec![-1.0, f64::NEG_INFINITY]),
            DVector::from_vec(vec![1.0, f64::INFINITY]),
        )
        .unwrap();

    assert_eq!(
        task.inequality_matrix(),
        &DMatrix::from_row_slice(2, 2, &[1.0, 0.0, -1.0, 0.0])
    );
    assert_eq!(task.inequality_bound(), &DVector::from_vec(vec![1.0, 1.0]));
}

#[test]
fn test_with_bounds_rejects_crossed_bounds() {
    let result = task(1).with_bounds(
        DVector::from_vec(vec![1.0]),
        DVector::from_vec(vec![-1.0]),
    );

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}

#[test]
fn test_with_bilateral_expands_into_two_row_blocks() {
    let matrix = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
    let task = task(2)
        .with_bilateral(
            matrix,
            DVector::from_vec(vec![-2.0]),
            DVector::from_vec(vec![3.0]),
        )
        .unwrap();

    assert_eq!(
        task.inequality_matrix(),
        &DMatrix::from_row_slice(2, 2, &[1.0, 1.0, -1.0, -1.0])
    );
    assert_eq!(task.inequality_bound(), &DVector::from_vec(vec![3.0, 2.0]));
    assert_eq!(task.constraint_violation(&DVector::from_vec(vec![2.0, 2.0])), 1.0);
    assert_eq!(task.constraint_violation(&DVector::from_vec(vec![0.0, 0.0])), 0.0);
}

#[test]
fn test_with_unilateral_constraints() {
    let matrix = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
    let task = task(2)
        .with_lower_unilateral(matrix.clone(), DVector::from_vec(vec![0.5]))
        .unwrap()
        .with_upper_unilateral(matrix, DVector::from_vec(vec![f64::INFINITY]))
        .unwrap();

    assert_eq!(
        task.inequality_matrix(),
        &DMatrix::from_row_slice(1, 2, &[-1.0, 0.0])
    );
    assert_eq!(task.inequality_bound(), &DVector::from_vec(vec![-0.5]));
}

#[test]
fn test_with_inequality_rejects_minus_infinity() {
    let result = task(1).with_inequality(
        DMatrix::identity(1, 1),
        DVector::from_vec(vec![f64::NEG_INFINITY]),
    );

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}

#[test]
fn test_with_equality_appends_rows() {
    let task = task(2)
        .with_equality(
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DVector::from_vec(vec![1.0]),
        )
        .unwrap()
        .with_equality(
            DMatrix::from_row_slice(1, 2, &[0.0, 1.0]),
            DVector::from_vec(vec![2.0]),
        )
        .unwrap();

    assert_eq!(task.equality_matrix(), &DMatrix::identity(2, 2));
    assert_eq!(task.equality_target(), &DVector::from_vec(vec![1.0, 2.0]));
    assert_eq!(
        task.constraint_violation(&DVector::from_vec(vec![1.0, 0.0])),
        2.0
    );
}

#[test]
fn test_with_linear_cost() {
    let task = task(2)
        .with_linear_cost(DVector::from_vec(vec![1.0, -1.0]))
        .unwrap();

    assert_eq!(
        task.linear_cost(),
        Some(&DVector::from_vec(vec![1.0, -1.0]))
    );
    assert!(task.with_linear_cost(DVector::zeros(3)).is_err());
}

#[test]
fn test_validate_for_layout() {
    let task = task(3);

    assert!(task
        .validate_for(&VariableLayout::kinematic(VariableSpace::KinematicVelocity, 3))
        .is_ok());
    assert!(matches!(
        task.validate_for(&VariableLayout::kinematic(VariableSpace::KinematicVelocity, 4)),
        Err(Error::MalformedTask { .. })
    ));
    assert!(matches!(
        task.validate_for(&VariableLayout::kinematic(VariableSpace::KinematicPosition, 3)),
        Err(Error::VariableSpaceMismatch { .. })
    ));
}

#[test]
fn test_task_kind_names() {
    assert_eq!(TaskKind::Posture.as_str(), "posture");
    assert_eq!(TaskKind::CenterOfMass.to_string(), "center_of_mass");
    assert_eq!(TaskKind::EquationsOfMotion.as_str(), "equations_of_motion");
}
