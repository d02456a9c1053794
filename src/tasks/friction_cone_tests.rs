use super::*;
use crate::state::{
    joint_state::JointState,
    robot_state::{ContactState, JointRecord, RobotStateBuilder},
};

fn state() -> Arc<RobotState> {
    RobotStateBuilder::new(0.01)
        .joint(JointRecord::new("knee", JointState::new(0.0, None, None), None))
        .contact(ContactState::new("left", DMatrix::zeros(3, 1), 0.5, 100.0).unwrap())
        .contact(ContactState::new("right", DMatrix::zeros(3, 1), 1.0, 50.0).unwrap())
        .build()
        .unwrap()
}

fn is_inside(task: &Task, x: &DVector<f64>) -> bool {
    (task.inequality_matrix() * x - task.inequality_bound())
        .iter()
        .all(|excess| *excess <= 1e-12)
}

fn forces(left: [f64; 3], right: [f64; 3]) -> DVector<f64> {
    DVector::from_vec(vec![
        0.0, left[0], left[1], left[2], right[0], right[1], right[2],
    ])
}

#[test]
fn test_new_requires_the_dynamic_space() {
    let result = FrictionConeTask::new("friction", VariableSpace::KinematicPosition);

    assert!(matches!(
        result,
        Err(Error::VariableSpaceMismatch { .. })
    ));
}

#[test]
fn test_rows_per_contact() {
    let task = FrictionConeTask::new("friction", VariableSpace::DynamicAccelerationForce)
        .unwrap()
        .build(&state())
        .unwrap();

    assert_eq!(task.dimension(), 7);
    assert_eq!(task.inequality_matrix().nrows(), 12);

    // Joint accelerations are not constrained.
    assert!(task.inequality_matrix().column(0).iter().all(|v| *v == 0.0));
}

#[test]
fn test_forces_inside_and_outside_the_pyramid() {
    let task = FrictionConeTask::new("friction", VariableSpace::DynamicAccelerationForce)
        .unwrap()
        .build(&state())
        .unwrap();

    assert!(is_inside(&task, &forces([2.0, -2.0, 10.0], [5.0, 5.0, 10.0])));
    assert!(is_inside(&task, &forces([0.0, 0.0, 0.0], [0.0, 0.0, 0.0])));

    // Too much tangential force on the left contact.
    assert!(!is_inside(&task, &forces([6.0, 0.0, 10.0], [0.0, 0.0, 10.0])));
    // Pulling on the ground.
    assert!(!is_inside(&task, &forces([0.0, 0.0, -1.0], [0.0, 0.0, 10.0])));
    // Above the maximum normal force of the right contact.
    assert!(!is_inside(&task, &forces([0.0, 0.0, 10.0], [0.0, 0.0, 60.0])));
}

#[test]
fn test_minimum_normal_force() {
    let task = FrictionConeTask::new("friction", VariableSpace::DynamicAccelerationForce)
        .unwrap()
        .with_minimum_normal_force(5.0)
        .build(&state())
        .unwrap();

    assert!(!is_inside(&task, &forces([0.0, 0.0, 1.0], [0.0, 0.0, 10.0])));
    assert!(is_inside(&task, &forces([0.0, 0.0, 5.0], [0.0, 0.0, 10.0])));
}

#[test]
fn test_without_contacts_has_no_rows() {
    let state = RobotStateBuilder::new(0.01)
        .joint(JointRecord::new("knee", JointState::new(0.0, None, None), None))
        .build()
        .unwrap();

    let task = FrictionConeTask::new("friction", VariableSpace::DynamicAccelerationForce)
        .unwrap()
        .build(&state)
        .unwrap();

    assert_eq!(task.dimension(), 1);
    assert_eq!(task.inequality_matrix().nrows(), 0);
}

#[test]
fn test_from_descriptor() {
    let descriptor: TaskDescriptor = toml::from_str(
        r#"
            kind = "friction_cone"
            name = "friction"
            parameters = { minimum_normal_force = 2.0 }
        "#,
    )
    .unwrap();

    let task =
        FrictionConeTask::from_descriptor(&descriptor, VariableSpace::DynamicAccelerationForce)
            .unwrap();

    assert_eq!(task.kind(), TaskKind::FrictionCone);
    let built = task.build(&state()).unwrap();
    assert!(!is_inside(&built, &forces([0.0, 0.0, 1.0], [0.0, 0.0, 10.0])));
}

#[test]
fn test_from_descriptor_rejects_negative_minimum() {
    let descriptor: TaskDescriptor = toml::from_str(
        r#"
            kind = "friction_cone"
            name = "friction"
            parameters = { minimum_normal_force = -2.0 }
        "#,
    )
    .unwrap();

    let result =
        FrictionConeTask::from_descriptor(&descriptor, VariableSpace::DynamicAccelerationForce);

    assert!(matches!(result, Err(Error::InvalidTaskParameters { .. })));
}
