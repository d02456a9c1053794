//! Provides the explicit registration table that maps task kind names to factories.
//!
//! Task kinds are registered once at start-up in a mutable [TaskRegistry]. Freezing the
//! registry produces a read-only [FrozenTaskRegistry] that can be shared between threads
//! and used to create tasks from configuration descriptors. There is no way to register a
//! kind in a frozen registry.

use std::{collections::BTreeMap, sync::Arc};

use log::debug;

use crate::{
    config::TaskDescriptor,
    task::{TaskKind, TaskSpecification},
    tasks::{
        cartesian::CartesianTask, equations_of_motion::EquationsOfMotionTask,
        friction_cone::FrictionConeTask, joint_limits::JointLimitsTask,
        minimum_effort::MinimumEffortTask, posture::PostureTask, raw::RawTask,
    },
    variable_space::VariableSpace,
    Error,
};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;

/// Creates a task from its descriptor for the given variable space.
pub type TaskFactory =
    fn(&TaskDescriptor, VariableSpace) -> Result<Arc<dyn TaskSpecification>, Error>;

/// The mutable registration table, used while the process starts.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: BTreeMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// Converts the registry into its read-only form.
    pub fn freeze(self) -> Arc<FrozenTaskRegistry> {
        debug!(
            "Freezing the task registry with {} kinds",
            self.factories.len()
        );
        Arc::new(FrozenTaskRegistry {
            factories: self.factories,
        })
    }

    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under the given kind name.
    ///
    /// ## Parameters
    ///
    /// * 'kind' - The name used in the `kind` field of a task descriptor
    /// * 'factory' - The function that creates the task
    ///
    /// ## Errors
    ///
    /// * [Error::DuplicateTaskKind] - Returned when a factory is already registered under
    ///   the name.
    pub fn register(&mut self, kind: impl Into<String>, factory: TaskFactory) -> Result<(), Error> {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(Error::DuplicateTaskKind { kind });
        }

        self.factories.insert(kind, factory);
        Ok(())
    }

    /// Creates a registry that holds every built-in task kind.
    pub fn with_builtin_kinds() -> Self {
        let builtin: [(TaskKind, TaskFactory); 8] = [
            (TaskKind::Posture, PostureTask::from_descriptor),
            (TaskKind::Cartesian, CartesianTask::from_descriptor),
            (
                TaskKind::CenterOfMass,
                CartesianTask::center_of_mass_from_descriptor,
            ),
            (TaskKind::MinimumEffort, MinimumEffortTask::from_descriptor),
            (TaskKind::JointLimits, JointLimitsTask::from_descriptor),
            (
                TaskKind::EquationsOfMotion,
                EquationsOfMotionTask::from_descriptor,
            ),
            (TaskKind::FrictionCone, FrictionConeTask::from_descriptor),
            (TaskKind::Raw, RawTask::from_descriptor),
        ];

        let factories = builtin
            .into_iter()
            .map(|(kind, factory)| (kind.as_str().to_string(), factory))
            .collect();
        Self { factories }
    }
}

/// The read-only registration table.
pub struct FrozenTaskRegistry {
    factories: BTreeMap<String, TaskFactory>,
}

impl FrozenTaskRegistry {
    /// Returns a value indicating if a factory is registered under the given kind name.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Creates the task described by the descriptor.
    ///
    /// ## Errors
    ///
    /// * [Error::UnknownTaskKind] - Returned when no factory is registered for the kind
    ///   of the descriptor.
    /// * Any error of the factory, for instance [Error::InvalidTaskParameters].
    pub fn create(
        &self,
        descriptor: &TaskDescriptor,
        space: VariableSpace,
    ) -> Result<Arc<dyn TaskSpecification>, Error> {
        let factory = self
            .factories
            .get(&descriptor.kind)
            .ok_or_else(|| Error::UnknownTaskKind {
                kind: descriptor.kind.clone(),
            })?;
        factory(descriptor, space)
    }

    /// Returns the registered kind names in alphabetical order.
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|k| k.as_str()).collect()
    }
}
