//! Defines the snapshot of the robot model that tasks are built from.
//!
//! The external model or simulator fills a [RobotStateBuilder] once per control cycle. The
//! resulting [RobotState] is immutable and shared through an [Arc], so every task of the
//! cycle, including tasks built on worker threads, observes exactly the same state.

use std::{
    collections::HashMap,
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use nalgebra::{DMatrix, DVector};

use crate::Error;

use super::{
    joint_space::JointSpace,
    joint_state::{JointState, JointStateRange},
};

#[cfg(test)]
#[path = "robot_state_tests.rs"]
mod robot_state_tests;

/// Atomic counter for SnapshotVersion instances
static SNAPSHOT_VERSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Defines a unique, monotonically increasing version for robot state snapshots.
///
/// - Can be copied safely
/// - Can be created safely across many threads
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SnapshotVersion {
    /// The internal value that forms the actual version.
    version: u64,
}

impl SnapshotVersion {
    /// Create a new version in a thread safe manner.
    pub fn new() -> Self {
        Self {
            version: SNAPSHOT_VERSION_COUNTER.fetch_add(1, Ordering::SeqCst),
        }
    }
}

impl Default for SnapshotVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SnapshotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SnapshotVersion [{}]", self.version)
    }
}

/// Stores the state, the limits and the kind of motion of a single joint.
#[derive(Clone, Debug, PartialEq)]
pub struct JointRecord {
    /// The human readable name of the joint.
    name: String,

    /// The current state of the joint.
    state: JointState,

    /// The limits of the joint, if it has any.
    range: Option<JointStateRange>,

    /// Describes how the joint position behaves at the boundaries.
    space: JointSpace,
}

impl JointRecord {
    /// Returns the name of the joint.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a new [JointRecord] for a joint that moves in a linear space.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the joint
    /// * 'state' - The current state of the joint
    /// * 'range' - The limits of the joint
    pub fn new(name: impl Into<String>, state: JointState, range: Option<JointStateRange>) -> Self {
        Self {
            name: name.into(),
            state,
            range,
            space: JointSpace::Linear,
        }
    }

    /// Returns the limits of the joint.
    pub fn range(&self) -> Option<&JointStateRange> {
        self.range.as_ref()
    }

    /// Returns the space the joint position moves in.
    pub fn space(&self) -> JointSpace {
        self.space
    }

    /// Returns the current state of the joint.
    pub fn state(&self) -> &JointState {
        &self.state
    }

    /// Returns the record with the given joint space.
    pub fn with_space(mut self, space: JointSpace) -> Self {
        self.space = space;
        self
    }
}

/// Stores the task-space quantities of a frame (a point on a link, the center of mass, ...).
///
/// The frame quantities are vectors of arbitrary task dimension `m`: 3 for a point
/// position, 6 for a full pose where the orientation part is expressed as a rotation
/// vector by the model. The Jacobian maps the joint velocities onto the frame velocity.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameState {
    /// The current position of the frame, `m` entries.
    position: DVector<f64>,

    /// The current velocity of the frame, `m` entries.
    velocity: DVector<f64>,

    /// The `m x n` Jacobian of the frame.
    jacobian: DMatrix<f64>,

    /// The drift term `J̇ q̇` of the frame, `m` entries.
    jacobian_dot_times_velocity: Option<DVector<f64>>,
}

impl FrameState {
    /// Returns the Jacobian of the frame.
    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }

    /// Returns the drift term `J̇ q̇`, or zeros if the model does not provide it.
    pub fn jacobian_dot_times_velocity(&self) -> DVector<f64> {
        match &self.jacobian_dot_times_velocity {
            Some(drift) => drift.clone(),
            None => DVector::zeros(self.position.len()),
        }
    }

    /// Creates a new [FrameState] instance.
    ///
    /// ## Parameters
    ///
    /// * 'position' - The current position of the frame
    /// * 'velocity' - The current velocity of the frame
    /// * 'jacobian' - The Jacobian of the frame
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the velocity or the Jacobian rows do not
    ///   match the size of the position.
    pub fn new(
        position: DVector<f64>,
        velocity: DVector<f64>,
        jacobian: DMatrix<f64>,
    ) -> Result<Self, Error> {
        if velocity.len() != position.len() {
            return Err(Error::DimensionMismatch {
                what: "the frame velocity".to_string(),
                expected: position.len(),
                found: velocity.len(),
            });
        }

        if jacobian.nrows() != position.len() {
            return Err(Error::DimensionMismatch {
                what: "the frame Jacobian rows".to_string(),
                expected: position.len(),
                found: jacobian.nrows(),
            });
        }

        Ok(Self {
            position,
            velocity,
            jacobian,
            jacobian_dot_times_velocity: None,
        })
    }

    /// Returns the position of the frame.
    pub fn position(&self) -> &DVector<f64> {
        &self.position
    }

    /// Returns the size of the task-space quantities of the frame.
    pub fn task_dimension(&self) -> usize {
        self.position.len()
    }

    /// Returns the velocity of the frame.
    pub fn velocity(&self) -> &DVector<f64> {
        &self.velocity
    }

    /// Stores the drift term `J̇ q̇` of the frame.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the drift does not match the size of
    ///   the position.
    pub fn with_jacobian_dot_times_velocity(mut self, drift: DVector<f64>) -> Result<Self, Error> {
        if drift.len() != self.position.len() {
            return Err(Error::DimensionMismatch {
                what: "the frame drift term".to_string(),
                expected: self.position.len(),
                found: drift.len(),
            });
        }

        self.jacobian_dot_times_velocity = Some(drift);
        Ok(self)
    }
}

/// Stores the joint-space dynamics of the robot: `M(q) q̈ + h(q, q̇) = Sᵀ τ + J_cᵀ f`.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicsState {
    /// The `n x n` joint-space mass matrix.
    mass_matrix: DMatrix<f64>,

    /// The `n` bias forces (Coriolis, centrifugal and gravity).
    bias_forces: DVector<f64>,

    /// The number of leading joints that are not actuated (the floating base).
    unactuated_joint_count: usize,
}

impl DynamicsState {
    /// Returns the bias forces.
    pub fn bias_forces(&self) -> &DVector<f64> {
        &self.bias_forces
    }

    /// Returns the mass matrix.
    pub fn mass_matrix(&self) -> &DMatrix<f64> {
        &self.mass_matrix
    }

    /// Creates a new [DynamicsState] instance.
    ///
    /// ## Parameters
    ///
    /// * 'mass_matrix' - The joint-space mass matrix
    /// * 'bias_forces' - The bias forces
    /// * 'unactuated_joint_count' - The number of leading, unactuated joints. Six for a
    ///   floating base robot, zero for a fixed base robot.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the mass matrix is not square, when the
    ///   bias forces do not match the mass matrix or when there are more unactuated joints
    ///   than joints.
    pub fn new(
        mass_matrix: DMatrix<f64>,
        bias_forces: DVector<f64>,
        unactuated_joint_count: usize,
    ) -> Result<Self, Error> {
        if !mass_matrix.is_square() {
            return Err(Error::DimensionMismatch {
                what: "the mass matrix columns".to_string(),
                expected: mass_matrix.nrows(),
                found: mass_matrix.ncols(),
            });
        }

        if bias_forces.len() != mass_matrix.nrows() {
            return Err(Error::DimensionMismatch {
                what: "the bias forces".to_string(),
                expected: mass_matrix.nrows(),
                found: bias_forces.len(),
            });
        }

        if unactuated_joint_count > mass_matrix.nrows() {
            return Err(Error::DimensionMismatch {
                what: "the unactuated joint count".to_string(),
                expected: mass_matrix.nrows(),
                found: unactuated_joint_count,
            });
        }

        Ok(Self {
            mass_matrix,
            bias_forces,
            unactuated_joint_count,
        })
    }

    /// Returns the number of unactuated joints.
    pub fn unactuated_joint_count(&self) -> usize {
        self.unactuated_joint_count
    }
}

/// Stores a point contact between the robot and the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactState {
    /// The human readable name of the contact.
    name: String,

    /// The `3 x n` translational Jacobian of the contact point.
    jacobian: DMatrix<f64>,

    /// The Coulomb friction coefficient of the contact.
    friction_coefficient: f64,

    /// The maximum normal force the contact can transmit.
    maximum_normal_force: f64,
}

impl ContactState {
    /// Returns the friction coefficient.
    pub fn friction_coefficient(&self) -> f64 {
        self.friction_coefficient
    }

    /// Returns the contact Jacobian.
    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }

    /// Returns the maximum normal force.
    pub fn maximum_normal_force(&self) -> f64 {
        self.maximum_normal_force
    }

    /// Returns the name of the contact.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a new [ContactState] instance. The contact normal is the z-axis of the
    /// frame the Jacobian is expressed in.
    ///
    /// ## Parameters
    ///
    /// * 'name' - The name of the contact
    /// * 'jacobian' - The 3 row translational Jacobian of the contact point
    /// * 'friction_coefficient' - The Coulomb friction coefficient, must be positive
    /// * 'maximum_normal_force' - The maximum normal force, must be positive
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the Jacobian does not have 3 rows.
    /// * [Error::InvalidConfiguration] - Returned when the friction coefficient or the
    ///   maximum normal force is not positive.
    pub fn new(
        name: impl Into<String>,
        jacobian: DMatrix<f64>,
        friction_coefficient: f64,
        maximum_normal_force: f64,
    ) -> Result<Self, Error> {
        if jacobian.nrows() != 3 {
            return Err(Error::DimensionMismatch {
                what: "the contact Jacobian rows".to_string(),
                expected: 3,
                found: jacobian.nrows(),
            });
        }

        if !(friction_coefficient > 0.0) {
            return Err(Error::InvalidConfiguration {
                field: "friction_coefficient".to_string(),
                message: format!("must be positive, got {}", friction_coefficient),
            });
        }

        if !(maximum_normal_force > 0.0) {
            return Err(Error::InvalidConfiguration {
                field: "maximum_normal_force".to_string(),
                message: format!("must be positive, got {}", maximum_normal_force),
            });
        }

        Ok(Self {
            name: name.into(),
            jacobian,
            friction_coefficient,
            maximum_normal_force,
        })
    }
}

/// An immutable snapshot of everything the tasks need to know about the robot for a
/// single control cycle.
#[derive(Debug)]
pub struct RobotState {
    /// The version of the snapshot.
    version: SnapshotVersion,

    /// The time at which the snapshot was taken.
    timestamp: Duration,

    /// The duration of the control cycle in seconds.
    time_step: f64,

    /// The joints in the column order of the optimization variable.
    joints: Vec<JointRecord>,

    /// The named task frames.
    frames: HashMap<String, FrameState>,

    /// The center of mass frame.
    center_of_mass: Option<FrameState>,

    /// The joint-space dynamics.
    dynamics: Option<DynamicsState>,

    /// The active contacts.
    contacts: Vec<ContactState>,
}

impl RobotState {
    /// Returns the center of mass frame.
    ///
    /// ## Errors
    ///
    /// * [Error::MissingStateQuantity] - Returned when the model did not provide the center
    ///   of mass.
    pub fn center_of_mass(&self) -> Result<&FrameState, Error> {
        self.center_of_mass
            .as_ref()
            .ok_or_else(|| Error::MissingStateQuantity {
                quantity: "the center of mass".to_string(),
            })
    }

    /// Returns the active contacts.
    pub fn contacts(&self) -> &[ContactState] {
        &self.contacts
    }

    /// Returns the joint-space dynamics.
    ///
    /// ## Errors
    ///
    /// * [Error::MissingStateQuantity] - Returned when the model did not provide the mass
    ///   matrix and bias forces.
    pub fn dynamics(&self) -> Result<&DynamicsState, Error> {
        self.dynamics
            .as_ref()
            .ok_or_else(|| Error::MissingStateQuantity {
                quantity: "the mass matrix and bias forces".to_string(),
            })
    }

    /// Returns the frame with the given name.
    ///
    /// ## Errors
    ///
    /// * [Error::MissingStateQuantity] - Returned when there is no frame with the given name.
    pub fn frame(&self, name: &str) -> Result<&FrameState, Error> {
        self.frames
            .get(name)
            .ok_or_else(|| Error::MissingStateQuantity {
                quantity: format!("the frame {}", name),
            })
    }

    /// Returns the number of joints.
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Returns the joint positions as a vector.
    pub fn joint_positions(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.joints.len(),
            self.joints.iter().map(|j| j.state().position()),
        )
    }

    /// Returns the joint velocities as a vector. Unknown velocities are zero.
    pub fn joint_velocities(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.joints.len(),
            self.joints.iter().map(|j| j.state().velocity_or_zero()),
        )
    }

    /// Returns the joints.
    pub fn joints(&self) -> &[JointRecord] {
        &self.joints
    }

    /// Returns the duration of the control cycle in seconds.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Returns the time at which the snapshot was taken.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Returns the version of the snapshot.
    pub fn version(&self) -> SnapshotVersion {
        self.version
    }
}

/// Collects the quantities of a [RobotState] and checks them for consistency.
#[derive(Debug)]
pub struct RobotStateBuilder {
    time_step: f64,
    timestamp: Duration,
    joints: Vec<JointRecord>,
    frames: HashMap<String, FrameState>,
    center_of_mass: Option<FrameState>,
    dynamics: Option<DynamicsState>,
    contacts: Vec<ContactState>,
}

impl RobotStateBuilder {
    /// Creates the snapshot.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when the time step is not positive.
    /// * [Error::DimensionMismatch] - Returned when a Jacobian or the mass matrix does not
    ///   have one column per joint.
    pub fn build(self) -> Result<Arc<RobotState>, Error> {
        if !(self.time_step > 0.0) {
            return Err(Error::InvalidConfiguration {
                field: "time_step".to_string(),
                message: format!("must be positive, got {}", self.time_step),
            });
        }

        let joint_count = self.joints.len();
        for (name, frame) in self.frames.iter() {
            if frame.jacobian().ncols() != joint_count {
                return Err(Error::DimensionMismatch {
                    what: format!("the Jacobian columns of frame {}", name),
                    expected: joint_count,
                    found: frame.jacobian().ncols(),
                });
            }
        }

        if let Some(com) = &self.center_of_mass {
            if com.jacobian().ncols() != joint_count {
                return Err(Error::DimensionMismatch {
                    what: "the center of mass Jacobian columns".to_string(),
                    expected: joint_count,
                    found: com.jacobian().ncols(),
                });
            }
        }

        if let Some(dynamics) = &self.dynamics {
            if dynamics.mass_matrix().nrows() != joint_count {
                return Err(Error::DimensionMismatch {
                    what: "the mass matrix".to_string(),
                    expected: joint_count,
                    found: dynamics.mass_matrix().nrows(),
                });
            }
        }

        for contact in self.contacts.iter() {
            if contact.jacobian().ncols() != joint_count {
                return Err(Error::DimensionMismatch {
                    what: format!("the Jacobian columns of contact {}", contact.name()),
                    expected: joint_count,
                    found: contact.jacobian().ncols(),
                });
            }
        }

        Ok(Arc::new(RobotState {
            version: SnapshotVersion::new(),
            timestamp: self.timestamp,
            time_step: self.time_step,
            joints: self.joints,
            frames: self.frames,
            center_of_mass: self.center_of_mass,
            dynamics: self.dynamics,
            contacts: self.contacts,
        }))
    }

    /// Sets the center of mass frame.
    pub fn center_of_mass(mut self, frame: FrameState) -> Self {
        self.center_of_mass = Some(frame);
        self
    }

    /// Adds a contact.
    pub fn contact(mut self, contact: ContactState) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Sets the joint-space dynamics.
    pub fn dynamics(mut self, dynamics: DynamicsState) -> Self {
        self.dynamics = Some(dynamics);
        self
    }

    /// Adds a named frame. A frame with the same name is replaced.
    pub fn frame(mut self, name: impl Into<String>, frame: FrameState) -> Self {
        self.frames.insert(name.into(), frame);
        self
    }

    /// Adds a joint. Joints are ordered in the order they are added.
    pub fn joint(mut self, joint: JointRecord) -> Self {
        self.joints.push(joint);
        self
    }

    /// Creates a new builder for a control cycle of the given duration in seconds.
    pub fn new(time_step: f64) -> Self {
        Self {
            time_step,
            timestamp: Duration::ZERO,
            joints: vec![],
            frames: HashMap::new(),
            center_of_mass: None,
            dynamics: None,
            contacts: vec![],
        }
    }

    /// Sets the time at which the snapshot is taken.
    pub fn timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }
}
