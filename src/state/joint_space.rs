//! Defines how the values of a joint behave at the boundaries of the joint range.
//!
//! A prismatic joint, or a revolute joint with end stops, moves through a linear space:
//! the only way to get from one value to another is to pass through all the values in
//! between. A continuous revolute joint on the other hand moves through a periodic space
//! that wraps around every 2 * [Pi](core::f64::consts::PI). For these joints the error
//! between the current and the desired position is the shortest way around the circle,
//! otherwise a posture task would command a full revolution to fix a small error.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "joint_space_tests.rs"]
mod joint_space_tests;

const FULL_TURN: f64 = 2.0 * PI;

/// Defines the different kinds of joint spaces available.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JointSpace {
    /// Joint values sequentially increase from -infinity to +infinity.
    #[default]
    Linear,

    /// Joint values are angles that wrap around after 2 PI, starting at the given angle.
    Periodic {
        /// The starting angle in radians
        start_angle_in_radians: f64,
    },
}

impl JointSpace {
    /// Returns the value in the space that is equivalent to the given value.
    ///
    /// ## Example
    ///
    /// ```
    /// use core::f64::consts::PI;
    /// use stack_of_tasks::state::joint_space::JointSpace;
    ///
    /// let space = JointSpace::Linear;
    /// assert_eq!(5.0 * PI, space.normalize(5.0 * PI));
    ///
    /// let space = JointSpace::Periodic { start_angle_in_radians: 0.0 };
    /// assert!((space.normalize(5.0 * PI) - PI).abs() < 1e-12);
    /// ```
    pub fn normalize(&self, value: f64) -> f64 {
        match self {
            JointSpace::Linear => value,
            JointSpace::Periodic {
                start_angle_in_radians,
            } => start_angle_in_radians + (value - start_angle_in_radians).rem_euclid(FULL_TURN),
        }
    }

    /// Returns the smallest signed displacement that moves the joint from `current` to
    /// `target`.
    ///
    /// For a linear space this is the plain difference. For a periodic space the result
    /// lies in [-PI, PI).
    ///
    /// ## Parameters
    ///
    /// * `current` - The current joint value.
    /// * `target` - The desired joint value.
    ///
    /// ## Example
    ///
    /// ```
    /// use core::f64::consts::PI;
    /// use stack_of_tasks::state::joint_space::JointSpace;
    ///
    /// let space = JointSpace::Periodic { start_angle_in_radians: -PI };
    /// let error = space.shortest_error(0.25 * PI, 1.75 * PI);
    /// assert!((error + 0.5 * PI).abs() < 1e-12);
    /// ```
    pub fn shortest_error(&self, current: f64, target: f64) -> f64 {
        match self {
            JointSpace::Linear => target - current,
            JointSpace::Periodic { .. } => {
                let difference = (target - current).rem_euclid(FULL_TURN);
                if difference >= PI {
                    difference - FULL_TURN
                } else {
                    difference
                }
            }
        }
    }
}
