/// Provides structures that describe the joint state and the joint limits
pub mod joint_state;

/// Defines how joint values behave at the boundaries of their range
pub mod joint_space;

/// Defines the immutable per-cycle snapshot of the robot model
pub mod robot_state;
