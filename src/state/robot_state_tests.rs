use super::*;

fn frame(rows: usize, columns: usize) -> FrameState {
    FrameState::new(
        DVector::zeros(rows),
        DVector::zeros(rows),
        DMatrix::zeros(rows, columns),
    )
    .unwrap()
}

fn joint(name: &str, position: f64) -> JointRecord {
    JointRecord::new(name, JointState::new(position, Some(0.5), None), None)
}

#[test]
fn test_snapshot_version_is_increasing() {
    let first = SnapshotVersion::new();
    let second = SnapshotVersion::new();

    assert!(second > first);
    assert_ne!(first, second);
}

#[test]
fn test_snapshot_version_is_unique_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(|| (0..100).map(|_| SnapshotVersion::new()).collect::<Vec<_>>()))
        .collect();

    let mut versions: Vec<SnapshotVersion> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let count = versions.len();
    versions.sort();
    versions.dedup();

    assert_eq!(count, versions.len());
}

#[test]
fn test_build_robot_state() {
    let state = RobotStateBuilder::new(0.01)
        .timestamp(Duration::from_millis(20))
        .joint(joint("hip", 0.1))
        .joint(joint("knee", -0.2))
        .frame("foot", frame(3, 2))
        .center_of_mass(frame(3, 2))
        .build()
        .unwrap();

    assert_eq!(state.joint_count(), 2);
    assert_eq!(state.time_step(), 0.01);
    assert_eq!(state.timestamp(), Duration::from_millis(20));
    assert_eq!(state.joint_positions(), DVector::from_vec(vec![0.1, -0.2]));
    assert_eq!(state.joint_velocities(), DVector::from_vec(vec![0.5, 0.5]));
    assert_eq!(state.joints()[1].name(), "knee");
    assert_eq!(state.frame("foot").unwrap().task_dimension(), 3);
    assert!(state.center_of_mass().is_ok());
    assert!(state.contacts().is_empty());
}

#[test]
fn test_build_robot_state_gives_every_snapshot_a_new_version() {
    let first = RobotStateBuilder::new(0.01).build().unwrap();
    let second = RobotStateBuilder::new(0.01).build().unwrap();

    assert!(second.version() > first.version());
}

#[test]
fn test_missing_quantities_are_reported() {
    let state = RobotStateBuilder::new(0.01)
        .joint(joint("hip", 0.0))
        .build()
        .unwrap();

    assert!(matches!(
        state.frame("hand"),
        Err(Error::MissingStateQuantity { .. })
    ));
    assert!(matches!(
        state.center_of_mass(),
        Err(Error::MissingStateQuantity { .. })
    ));
    assert!(matches!(
        state.dynamics(),
        Err(Error::MissingStateQuantity { .. })
    ));
}

#[test]
fn test_build_with_non_positive_time_step_fails() {
    let result = RobotStateBuilder::new(0.0).build();

    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
}

#[test]
fn test_build_with_wrong_jacobian_columns_fails() {
    let result = RobotStateBuilder::new(0.01)
        .joint(joint("hip", 0.0))
        .frame("foot", frame(3, 2))
        .build();

    assert_eq!(
        result.unwrap_err(),
        Error::DimensionMismatch {
            what: "the Jacobian columns of frame foot".to_string(),
            expected: 1,
            found: 2,
        }
    );
}

#[test]
fn test_build_with_wrong_mass_matrix_fails() {
    let dynamics = DynamicsState::new(DMatrix::identity(3, 3), DVector::zeros(3), 0).unwrap();
    let result = RobotStateBuilder::new(0.01)
        .joint(joint("hip", 0.0))
        .dynamics(dynamics)
        .build();

    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
}

#[test]
fn test_frame_state_validates_sizes() {
    let result = FrameState::new(DVector::zeros(3), DVector::zeros(2), DMatrix::zeros(3, 4));
    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));

    let result = FrameState::new(DVector::zeros(3), DVector::zeros(3), DMatrix::zeros(2, 4));
    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
}

#[test]
fn test_frame_state_drift_defaults_to_zero() {
    let frame = frame(3, 2);
    assert_eq!(frame.jacobian_dot_times_velocity(), DVector::zeros(3));

    let frame = frame
        .with_jacobian_dot_times_velocity(DVector::from_vec(vec![1.0, 2.0, 3.0]))
        .unwrap();
    assert_eq!(
        frame.jacobian_dot_times_velocity(),
        DVector::from_vec(vec![1.0, 2.0, 3.0])
    );
}

#[test]
fn test_dynamics_state_validates_sizes() {
    assert!(DynamicsState::new(DMatrix::zeros(2, 3), DVector::zeros(2), 0).is_err());
    assert!(DynamicsState::new(DMatrix::zeros(2, 2), DVector::zeros(3), 0).is_err());
    assert!(DynamicsState::new(DMatrix::zeros(2, 2), DVector::zeros(2), 3).is_err());

    let dynamics = DynamicsState::new(DMatrix::identity(2, 2), DVector::zeros(2), 1).unwrap();
    assert_eq!(dynamics.unactuated_joint_count(), 1);
}

#[test]
fn test_contact_state_validates_parameters() {
    assert!(matches!(
        ContactState::new("foot", DMatrix::zeros(2, 2), 0.5, 100.0),
        Err(Error::DimensionMismatch { .. })
    ));
    assert!(matches!(
        ContactState::new("foot", DMatrix::zeros(3, 2), 0.0, 100.0),
        Err(Error::InvalidConfiguration { .. })
    ));
    assert!(matches!(
        ContactState::new("foot", DMatrix::zeros(3, 2), 0.5, f64::NAN),
        Err(Error::InvalidConfiguration { .. })
    ));

    let contact = ContactState::new("foot", DMatrix::zeros(3, 2), 0.5, 100.0).unwrap();
    assert_eq!(contact.name(), "foot");
    assert_eq!(contact.friction_coefficient(), 0.5);
    assert_eq!(contact.maximum_normal_force(), 100.0);
}

#[test]
fn test_joint_record_space() {
    let record = joint("wheel", 0.0).with_space(JointSpace::Periodic {
        start_angle_in_radians: 0.0,
    });

    assert_eq!(
        record.space(),
        JointSpace::Periodic {
            start_angle_in_radians: 0.0
        }
    );
    assert!(record.range().is_none());
}
