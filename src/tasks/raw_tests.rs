use super::*;
use crate::state::{
    joint_state::JointState,
    robot_state::{JointRecord, RobotStateBuilder},
};

fn state(joints: usize) -> Arc<RobotState> {
    (0..joints)
        .fold(RobotStateBuilder::new(0.01), |builder, i| {
            builder.joint(JointRecord::new(
                format!("j{}", i),
                JointState::new(0.0, None, None),
                None,
            ))
        })
        .build()
        .unwrap()
}

fn descriptor(parameters: &str) -> TaskDescriptor {
    toml::from_str(&format!(
        r#"
            kind = "raw"
            name = "custom"
            weight = 2.0
            parameters = {{ {} }}
        "#,
        parameters
    ))
    .unwrap()
}

#[test]
fn test_build_returns_the_task() {
    let task = Task::new("custom", VariableSpace::KinematicVelocity, 2)
        .with_objective(DMatrix::identity(2, 2), DVector::from_vec(vec![1.0, 2.0]))
        .unwrap();
    let raw = RawTask::new(task.clone());

    assert_eq!(raw.name(), "custom");
    assert_eq!(raw.kind(), TaskKind::Raw);
    assert_eq!(raw.task(), &task);
    assert_eq!(raw.build(&state(2)).unwrap(), task);
}

#[test]
fn test_build_rejects_a_different_robot() {
    let task = Task::new("custom", VariableSpace::KinematicVelocity, 2);
    let raw = RawTask::new(task);

    assert!(matches!(
        raw.build(&state(3)),
        Err(Error::MalformedTask { .. })
    ));
}

#[test]
fn test_from_descriptor_with_objective_and_constraints() {
    let descriptor = descriptor(
        "objective_matrix = [[1.0, 0.0], [0.0, 1.0]], objective_target = [1.0, 1.0], \
         equality_matrix = [[1.0, 1.0]], equality_target = [1.0], \
         upper_bounds = [0.8, inf]",
    );

    let raw = RawTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity).unwrap();
    let task = raw.build(&state(2)).unwrap();

    assert_eq!(task.dimension(), 2);
    assert_eq!(task.importance(), 4.0);
    assert_eq!(task.equality_matrix().nrows(), 1);
    assert_eq!(task.inequality_matrix().nrows(), 1);
    assert_eq!(task.inequality_bound()[0], 0.8);
}

#[test]
fn test_from_descriptor_with_weights_and_cost() {
    let descriptor = descriptor(
        "objective_matrix = [[1.0, 0.0]], objective_target = [1.0], weights = [3.0], \
         linear_cost = [0.0, 1.0]",
    );

    let raw = RawTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity).unwrap();
    let task = raw.build(&state(2)).unwrap();

    assert_eq!(task.importance(), 3.0);
    assert_eq!(task.linear_cost(), Some(&DVector::from_vec(vec![0.0, 1.0])));
}

#[test]
fn test_from_descriptor_with_explicit_dimension() {
    let descriptor = descriptor("dimension = 3");

    let raw = RawTask::from_descriptor(&descriptor, VariableSpace::KinematicPosition).unwrap();

    assert_eq!(raw.build(&state(3)).unwrap().dimension(), 3);
}

#[test]
fn test_from_descriptor_without_dimension_fails() {
    let result = RawTask::from_descriptor(&descriptor(""), VariableSpace::KinematicVelocity);

    assert!(matches!(result, Err(Error::InvalidTaskParameters { .. })));
}

#[test]
fn test_from_descriptor_with_ragged_rows_fails() {
    let descriptor = descriptor("inequality_matrix = [[1.0, 0.0], [1.0]], inequality_bound = [1.0, 1.0]");

    let result = RawTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity);

    assert!(matches!(result, Err(Error::InvalidTaskParameters { .. })));
}

#[test]
fn test_from_descriptor_with_missing_vector_fails() {
    let descriptor = descriptor("equality_matrix = [[1.0, 0.0]]");

    let result = RawTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity);

    assert!(matches!(result, Err(Error::InvalidTaskParameters { .. })));
}

#[test]
fn test_from_descriptor_with_unknown_parameter_fails() {
    let descriptor = descriptor("dimension = 2, gain = 1.0");

    let result = RawTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity);

    assert!(matches!(result, Err(Error::InvalidTaskParameters { .. })));
}

#[test]
fn test_from_descriptor_with_mismatched_target_is_malformed() {
    let descriptor = descriptor("objective_matrix = [[1.0, 0.0]], objective_target = [1.0, 2.0]");

    let result = RawTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity);

    assert!(matches!(result, Err(Error::MalformedTask { .. })));
}
