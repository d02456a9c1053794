use super::*;
use crate::state::{
    joint_space::JointSpace,
    joint_state::JointState,
    robot_state::{ContactState, JointRecord, RobotStateBuilder},
};
use float_cmp::{ApproxEq, F64Margin};
use std::f64::consts::PI;

fn margin() -> F64Margin {
    F64Margin {
        epsilon: 1e-12,
        ulps: 4,
    }
}

fn state() -> Arc<RobotState> {
    RobotStateBuilder::new(0.01)
        .joint(JointRecord::new(
            "shoulder",
            JointState::new(0.5, Some(1.0), None),
            None,
        ))
        .joint(
            JointRecord::new("wrist", JointState::new(0.9 * PI, Some(0.0), None), None)
                .with_space(JointSpace::Periodic {
                    start_angle_in_radians: -PI,
                }),
        )
        .build()
        .unwrap()
}

fn task(space: VariableSpace, gains: Gains) -> PostureTask {
    PostureTask::new(
        "posture",
        space,
        TaskTarget::new(DVector::from_vec(vec![1.0, -0.9 * PI])),
        gains,
        2.0,
    )
}

#[test]
fn test_kinematic_position_uses_shortest_error() {
    let task = task(VariableSpace::KinematicPosition, Gains::default())
        .build(&state())
        .unwrap();

    assert_eq!(task.objective_matrix(), &DMatrix::identity(2, 2));
    assert!(task.objective_target()[0].approx_eq(0.5, margin()));
    assert!(task.objective_target()[1].approx_eq(0.2 * PI, margin()));
    assert_eq!(task.importance(), 4.0);
}

#[test]
fn test_kinematic_velocity_adds_proportional_feedback() {
    let gains = Gains {
        proportional: 10.0,
        derivative: 0.0,
    };
    let task = task(VariableSpace::KinematicVelocity, gains)
        .build(&state())
        .unwrap();

    assert!(task.objective_target()[0].approx_eq(5.0, margin()));
}

#[test]
fn test_dynamic_adds_damping_and_leaves_forces_free() {
    let gains = Gains {
        proportional: 10.0,
        derivative: 2.0,
    };
    let state = RobotStateBuilder::new(0.01)
        .joint(JointRecord::new(
            "shoulder",
            JointState::new(0.5, Some(1.0), None),
            None,
        ))
        .contact(ContactState::new("foot", DMatrix::zeros(3, 1), 0.5, 100.0).unwrap())
        .build()
        .unwrap();
    let task = PostureTask::new(
        "posture",
        VariableSpace::DynamicAccelerationForce,
        TaskTarget::new(DVector::from_vec(vec![1.0])),
        gains,
        1.0,
    )
    .build(&state)
    .unwrap();

    assert_eq!(task.dimension(), 4);
    assert_eq!(
        task.objective_matrix(),
        &DMatrix::from_row_slice(1, 4, &[1.0, 0.0, 0.0, 0.0])
    );
    assert!(task.objective_target()[0].approx_eq(10.0 * 0.5 - 2.0 * 1.0, margin()));
}

#[test]
fn test_target_can_be_changed_through_the_handle() {
    let task = task(VariableSpace::KinematicPosition, Gains::default());
    let handle = task.target().unwrap();

    handle.set(TaskTarget::new(DVector::from_vec(vec![0.5, 0.9 * PI])));
    let built = task.build(&state()).unwrap();

    assert!(built.objective_target().amax() < 1e-12);
}

#[test]
fn test_target_with_wrong_size_is_malformed() {
    let task = PostureTask::new(
        "posture",
        VariableSpace::KinematicPosition,
        TaskTarget::new(DVector::from_vec(vec![1.0])),
        Gains::default(),
        1.0,
    );

    assert!(matches!(
        task.build(&state()),
        Err(Error::MalformedTask { .. })
    ));
}

#[test]
fn test_from_descriptor() {
    let descriptor: TaskDescriptor = toml::from_str(
        r#"
            kind = "posture"
            name = "home"
            weight = 0.5
            parameters = { target = [1.0, 0.0], gains = { proportional = 3.0 } }
        "#,
    )
    .unwrap();

    let task = PostureTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity).unwrap();

    assert_eq!(task.name(), "home");
    assert_eq!(task.kind(), TaskKind::Posture);
    assert_eq!(task.variable_space(), VariableSpace::KinematicVelocity);

    let built = task.build(&state()).unwrap();
    assert!(built.objective_target()[0].approx_eq(1.5, margin()));
    assert_eq!(built.importance(), 1.0);
}

#[test]
fn test_from_descriptor_without_target_fails() {
    let descriptor: TaskDescriptor = toml::from_str(
        r#"
            kind = "posture"
            name = "home"
        "#,
    )
    .unwrap();

    let result = PostureTask::from_descriptor(&descriptor, VariableSpace::KinematicVelocity);

    assert!(matches!(result, Err(Error::InvalidTaskParameters { .. })));
}
