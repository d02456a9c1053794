#[cfg(test)]
#[path = "joint_state_tests.rs"]
mod joint_state_tests;

/// Stores the current position and motion state for a given joint.
///
/// A 'joint' is defined to only have 1 degree-of-freedom, so the stored state
/// refers to this degree of freedom, i.e. if the joint has a revolute degree-of-freedom
/// then the state refers to a rotational position, velocity and acceleration.
/// On the other hand if the joint has a prismatic degree-of-freedom then the state
/// refers to a linear position, velocity and acceleration.
#[derive(Clone, Debug, PartialEq)]
pub struct JointState {
    /// The position of the joint.
    position: f64,

    /// The velocity of the joint.
    velocity: Option<f64>,

    /// The acceleration of the joint.
    acceleration: Option<f64>,
}

impl JointState {
    /// Returns the current acceleration of the joint.
    pub fn acceleration(&self) -> &Option<f64> {
        &self.acceleration
    }

    /// Creates a new [JointState] instance
    ///
    /// ## Parameters
    ///
    /// * 'position' - The current position of the joint
    /// * 'velocity' - The current velocity of the joint
    /// * 'acceleration' - The current acceleration of the joint
    pub fn new(position: f64, velocity: Option<f64>, acceleration: Option<f64>) -> Self {
        Self {
            position,
            velocity,
            acceleration,
        }
    }

    /// Returns the current position of the joint
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Returns the current velocity of the joint.
    pub fn velocity(&self) -> &Option<f64> {
        &self.velocity
    }

    /// Returns the current velocity of the joint, or zero if the velocity is unknown.
    pub fn velocity_or_zero(&self) -> f64 {
        self.velocity.unwrap_or(0.0)
    }
}

/// Stores the maximum and minimum values for the [JointState] of a joint.
///
/// Velocity and acceleration limits are optional. A missing limit means the joint is
/// not restricted in that quantity. Position limits may be infinite for continuous
/// joints.
#[derive(Clone, Debug, PartialEq)]
pub struct JointStateRange {
    /// The minimum values of the joint state.
    minimum: JointState,

    /// The maximum values of the joint state.
    maximum: JointState,
}

impl JointStateRange {
    /// Gets the maximum acceleration for the joint.
    pub fn maximum_acceleration(&self) -> &Option<f64> {
        self.maximum.acceleration()
    }

    /// Gets the maximum position for the joint.
    pub fn maximum_position(&self) -> f64 {
        self.maximum.position()
    }

    /// Gets the maximum velocity for the joint.
    pub fn maximum_velocity(&self) -> &Option<f64> {
        self.maximum.velocity()
    }

    /// Gets the minimum acceleration for the joint.
    pub fn minimum_acceleration(&self) -> &Option<f64> {
        self.minimum.acceleration()
    }

    /// Gets the minimum position for the joint.
    pub fn minimum_position(&self) -> f64 {
        self.minimum.position()
    }

    /// Gets the minimum velocity for the joint.
    pub fn minimum_velocity(&self) -> &Option<f64> {
        self.minimum.velocity()
    }

    /// Creates a new [JointStateRange] with the given minimum and maximum
    ///
    /// ## Parameters
    ///
    /// * 'minimum' - The minimum values for the joint state.
    /// * 'maximum' - The maximum values for the joint state.
    pub fn new(minimum: JointState, maximum: JointState) -> Self {
        Self { minimum, maximum }
    }

    /// Creates a range that only limits the joint position.
    pub fn position_only(minimum_position: f64, maximum_position: f64) -> Self {
        Self::new(
            JointState::new(minimum_position, None, None),
            JointState::new(maximum_position, None, None),
        )
    }
}
