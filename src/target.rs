//! Defines the targets of the tasks.
//!
//! Targets are set by an external collaborator (a trajectory generator, a learning
//! agent, an operator) at its own rate. The stack latches every target at the start of a
//! control cycle with a [TargetLatch], so a target that changes in the middle of a cycle
//! affects the next cycle, never half of the current one.

use std::sync::{Arc, Mutex};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "target_tests.rs"]
mod target_tests;

/// Stores the desired position, velocity and acceleration of a task.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskTarget {
    /// The desired position.
    position: DVector<f64>,

    /// The desired velocity. When missing the task aims for a zero velocity.
    velocity: Option<DVector<f64>>,

    /// The desired acceleration. When missing the task aims for a zero acceleration.
    acceleration: Option<DVector<f64>>,
}

impl TaskTarget {
    /// Returns the desired acceleration, or zeros if none was set.
    pub fn acceleration_or_zero(&self) -> DVector<f64> {
        self.acceleration
            .clone()
            .unwrap_or_else(|| DVector::zeros(self.position.len()))
    }

    /// Returns the size of the target.
    pub fn dimension(&self) -> usize {
        self.position.len()
    }

    /// Creates a target that only specifies a position.
    pub fn new(position: DVector<f64>) -> Self {
        Self {
            position,
            velocity: None,
            acceleration: None,
        }
    }

    /// Returns the desired position.
    pub fn position(&self) -> &DVector<f64> {
        &self.position
    }

    /// Returns the desired velocity, or zeros if none was set.
    pub fn velocity_or_zero(&self) -> DVector<f64> {
        self.velocity
            .clone()
            .unwrap_or_else(|| DVector::zeros(self.position.len()))
    }

    /// Returns the target with the given desired acceleration.
    pub fn with_acceleration(mut self, acceleration: DVector<f64>) -> Self {
        self.acceleration = Some(acceleration);
        self
    }

    /// Returns the target with the given desired velocity.
    pub fn with_velocity(mut self, velocity: DVector<f64>) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

#[derive(Debug)]
struct TargetSlots {
    /// The target as last set by the caller.
    current: TaskTarget,

    /// The target of the running cycle, if a cycle holds a [TargetLatch].
    latched: Option<TaskTarget>,
}

/// A shared handle to a [TaskTarget].
///
/// Cloning the handle shares the target, so the caller keeps one clone to update the
/// target while the task holds another to read it.
#[derive(Clone, Debug)]
pub struct TargetHandle {
    slots: Arc<Mutex<TargetSlots>>,
}

impl TargetHandle {
    /// Returns a copy of the target of the running cycle, or of the current target
    /// outside a cycle.
    pub fn get(&self) -> TaskTarget {
        let slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        slots.latched.as_ref().unwrap_or(&slots.current).clone()
    }

    fn latch(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        if slots.latched.is_none() {
            slots.latched = Some(slots.current.clone());
        }
    }

    /// Creates a new handle for the given target.
    pub fn new(target: TaskTarget) -> Self {
        Self {
            slots: Arc::new(Mutex::new(TargetSlots {
                current: target,
                latched: None,
            })),
        }
    }

    fn release(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        slots.latched = None;
    }

    /// Replaces the target. A running cycle keeps the target it started with.
    pub fn set(&self, target: TaskTarget) {
        let mut slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        slots.current = target;
    }
}

/// Fixes a set of targets for the duration of a control cycle.
///
/// While the latch lives, [TargetHandle::get] returns the target each handle had when the
/// latch was created. Dropping the latch makes the handles follow their current target
/// again.
pub struct TargetLatch {
    handles: Vec<TargetHandle>,
}

impl TargetLatch {
    /// Latches the given handles.
    pub fn new(handles: impl IntoIterator<Item = TargetHandle>) -> Self {
        let handles: Vec<TargetHandle> = handles.into_iter().collect();
        for handle in handles.iter() {
            handle.latch();
        }

        Self { handles }
    }
}

impl Drop for TargetLatch {
    fn drop(&mut self) {
        for handle in self.handles.iter() {
            handle.release();
        }
    }
}

/// Stores the proportional and derivative gains used to turn a tracking error into a
/// desired velocity or acceleration.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Gains {
    /// The gain applied to the position error.
    #[serde(default = "default_proportional_gain")]
    pub proportional: f64,

    /// The gain applied to the velocity error.
    #[serde(default = "default_derivative_gain")]
    pub derivative: f64,
}

fn default_proportional_gain() -> f64 {
    1.0
}

fn default_derivative_gain() -> f64 {
    0.0
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            proportional: default_proportional_gain(),
            derivative: default_derivative_gain(),
        }
    }
}
