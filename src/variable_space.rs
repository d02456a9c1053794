//! Defines the physical quantity that is being optimized and how the columns of the
//! optimization variable are laid out.
//!
//! For kinematic control the variable holds one entry per joint, either a position
//! displacement or a velocity. For dynamic control the variable holds the joint
//! accelerations followed by the 3D force of every contact point:
//!
//! ```text
//! x = [ q̈_0 .. q̈_{n-1} | f_0x f_0y f_0z | f_1x f_1y f_1z | ... ]
//! ```

use std::{fmt::Display, ops::Range};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{state::robot_state::RobotState, Error};

#[cfg(test)]
#[path = "variable_space_tests.rs"]
mod variable_space_tests;

/// The number of force components per contact point.
pub const FORCE_COMPONENTS_PER_CONTACT: usize = 3;

/// Defines the different optimization variable spaces.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSpace {
    /// The variable is a joint position displacement, one entry per joint.
    KinematicPosition,

    /// The variable is a joint velocity, one entry per joint.
    KinematicVelocity,

    /// The variable is the joint acceleration followed by the contact forces.
    DynamicAccelerationForce,
}

impl VariableSpace {
    /// Returns a value indicating if the variable space contains contact forces.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, VariableSpace::DynamicAccelerationForce)
    }
}

impl Display for VariableSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariableSpace::KinematicPosition => "kinematic position",
            VariableSpace::KinematicVelocity => "kinematic velocity",
            VariableSpace::DynamicAccelerationForce => "dynamic acceleration-force",
        };
        write!(f, "{}", name)
    }
}

/// Describes the column layout of the optimization variable for a given variable space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableLayout {
    /// The variable space the layout belongs to.
    space: VariableSpace,

    /// The number of joint columns.
    joint_count: usize,

    /// The number of contact force columns. Always zero for kinematic spaces.
    force_count: usize,
}

impl VariableLayout {
    /// Creates a layout for a dynamic variable with the given number of joints and contacts.
    pub fn dynamic(joint_count: usize, contact_count: usize) -> Self {
        Self {
            space: VariableSpace::DynamicAccelerationForce,
            joint_count,
            force_count: contact_count * FORCE_COMPONENTS_PER_CONTACT,
        }
    }

    /// Returns the total number of columns of the variable.
    pub fn dimension(&self) -> usize {
        self.joint_count + self.force_count
    }

    /// Places a matrix whose columns are the contact forces into the variable columns.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the matrix does not have one column
    ///   per force component.
    pub fn embed_force_columns(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, Error> {
        if matrix.ncols() != self.force_count {
            return Err(Error::DimensionMismatch {
                what: "the contact force columns".to_string(),
                expected: self.force_count,
                found: matrix.ncols(),
            });
        }

        let mut result = DMatrix::zeros(matrix.nrows(), self.dimension());
        result
            .view_mut((0, self.joint_count), (matrix.nrows(), self.force_count))
            .copy_from(matrix);
        Ok(result)
    }

    /// Places a matrix whose columns are the joints into the variable columns.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the matrix does not have one column
    ///   per joint.
    pub fn embed_joint_columns(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, Error> {
        if matrix.ncols() != self.joint_count {
            return Err(Error::DimensionMismatch {
                what: "the joint columns".to_string(),
                expected: self.joint_count,
                found: matrix.ncols(),
            });
        }

        let mut result = DMatrix::zeros(matrix.nrows(), self.dimension());
        result
            .view_mut((0, 0), (matrix.nrows(), self.joint_count))
            .copy_from(matrix);
        Ok(result)
    }

    /// Returns the number of contact force columns.
    pub fn force_count(&self) -> usize {
        self.force_count
    }

    /// Returns the range of the columns that hold the contact forces.
    pub fn force_range(&self) -> Range<usize> {
        self.joint_count..self.dimension()
    }

    /// Creates the layout for the given variable space from the robot state.
    ///
    /// Kinematic spaces only hold the joints, the dynamic space holds the joints and
    /// three force components for every contact of the state.
    pub fn for_state(space: VariableSpace, state: &RobotState) -> Self {
        match space {
            VariableSpace::DynamicAccelerationForce => {
                Self::dynamic(state.joint_count(), state.contacts().len())
            }
            _ => Self::kinematic(space, state.joint_count()),
        }
    }

    /// Returns the number of joint columns.
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Returns the range of the columns that hold the joint quantities.
    pub fn joint_range(&self) -> Range<usize> {
        0..self.joint_count
    }

    /// Creates a layout for a kinematic variable.
    ///
    /// When the dynamic space is passed the layout is created without contacts.
    pub fn kinematic(space: VariableSpace, joint_count: usize) -> Self {
        Self {
            space,
            joint_count,
            force_count: 0,
        }
    }

    /// Returns the variable space of the layout.
    pub fn space(&self) -> VariableSpace {
        self.space
    }
}
