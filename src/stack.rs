//! Defines the hierarchical priority stack.
//!
//! The stack holds an ordered list of [PriorityLevel]s, the first one having the highest
//! priority. Every control cycle the levels are solved one after the other. Each level is
//! restricted to the freedom the levels above it leave behind, so that a lower priority
//! level can never change the objective residual or the active constraints of a higher
//! priority level. Two ways of enforcing this are supported, see
//! [CompositionStrategy](crate::config::CompositionStrategy):
//!
//! * null space: the level is solved for `z` in `x = x_prev + N z`, where the columns of
//!   `N` span the null space of the locked rows of the levels above
//! * augmented equality: the locked rows of the levels above are added to the level as
//!   equalities `A x = A x_prev`
//!
//! The rows that a solved level locks are its equality rows, its weighted objective rows
//! and its active inequality rows. Its inequality rows are also carried into every level
//! below it.
//!
//! A cycle always produces a command. Faults are recorded in the [CycleRecord] and decide
//! whether the command is the computed solution or a fallback.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, trace, warn};
use nalgebra::{DMatrix, DVector};

use crate::{
    aggregator::{aggregate, TaskSet},
    builder::build_level_tasks,
    config::{CompositionStrategy, ControllerConfig, InfeasibilityPolicy, StackConfig},
    linalg::{select_matrix_rows, stack_rows, stack_vectors},
    null_space::{identity_basis, NullSpaceProjector},
    qp::{QpSolution, QpSolver, QpStatus, QuadraticProgram},
    registry::FrozenTaskRegistry,
    solver::ClarabelSolver,
    state::robot_state::{RobotState, SnapshotVersion},
    status::{CycleOutput, CycleRecord, CycleStatus, Fault, LevelReport, Relaxation, Warning},
    target::TargetLatch,
    task::TaskSpecification,
    variable_space::{VariableLayout, VariableSpace},
    Error,
};

#[cfg(test)]
#[path = "stack_tests.rs"]
mod stack_tests;

/// A named group of tasks that share the same priority.
#[derive(Clone)]
pub struct PriorityLevel {
    name: String,
    tasks: Vec<Arc<dyn TaskSpecification>>,
}

impl PriorityLevel {
    /// Returns the name of the level.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a level without tasks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: vec![],
        }
    }

    /// Returns the tasks of the level.
    pub fn tasks(&self) -> &[Arc<dyn TaskSpecification>] {
        &self.tasks
    }

    /// Adds a task to the level.
    pub fn with_task(mut self, task: Arc<dyn TaskSpecification>) -> Self {
        self.tasks.push(task);
        self
    }
}

/// The solution and the constraints of the levels that were solved so far in a cycle.
struct Hierarchy {
    /// The solution of the last solved level.
    x: DVector<f64>,

    /// The basis of the subspace the next level may act in.
    basis: DMatrix<f64>,

    /// The rows that the next level must keep at their current value.
    locked_matrix: DMatrix<f64>,
    locked_target: DVector<f64>,

    /// The inequality rows of the solved levels.
    carried_matrix: DMatrix<f64>,
    carried_bound: DVector<f64>,
}

impl Hierarchy {
    fn new(dimension: usize) -> Self {
        Self {
            x: DVector::zeros(dimension),
            basis: identity_basis(dimension),
            locked_matrix: DMatrix::zeros(0, dimension),
            locked_target: DVector::zeros(0),
            carried_matrix: DMatrix::zeros(0, dimension),
            carried_bound: DVector::zeros(0),
        }
    }
}

enum LevelOutcome {
    Solved,
    Failed,
    TimedOut,
}

/// Returns the program of a level on its own.
///
/// A level without any objective keeps the feasible point that is closest to `origin`.
fn level_objective(set: &TaskSet, origin: &DVector<f64>) -> Result<QuadraticProgram, Error> {
    let gradient = set.gradient();
    let has_objective = set.objective_matrix().iter().any(|v| *v != 0.0)
        || gradient.iter().any(|v| *v != 0.0);
    if has_objective {
        return Ok(QuadraticProgram::from_task_set(set));
    }

    let dimension = set.dimension();
    QuadraticProgram::new(DMatrix::identity(dimension, dimension), -origin)?
        .with_equalities(set.equality_matrix(), set.equality_target())?
        .with_inequalities(set.inequality_matrix(), set.inequality_bound())
}

/// Solves the stacked, aggregated levels of a hierarchy once per control cycle.
pub struct PriorityStack {
    variable_space: VariableSpace,
    config: StackConfig,
    levels: Vec<PriorityLevel>,
    solver: Box<dyn QpSolver>,
    projector: NullSpaceProjector,
    previous_command: Option<DVector<f64>>,
    consecutive_timeouts: u32,
}

impl PriorityStack {
    fn fail(&self, report: &mut LevelReport, fault: Fault) -> LevelOutcome {
        warn!("{}", fault);
        report.faults.push(fault);
        LevelOutcome::Failed
    }

    fn timed_out(&self, report: &mut LevelReport, budget: Duration) -> LevelOutcome {
        let fault = Fault::SolverTimeout {
            level: report.index,
            budget,
        };
        warn!("{}", fault);
        report.faults.push(fault);
        LevelOutcome::TimedOut
    }

    fn fallback_command(&self, dimension: usize) -> DVector<f64> {
        match &self.previous_command {
            Some(command) if self.config.warm_start && command.len() == dimension => {
                command.clone()
            }
            _ => DVector::zeros(dimension),
        }
    }

    fn solve_reduced(
        &self,
        program: &QuadraticProgram,
        origin: &DVector<f64>,
        basis: &DMatrix<f64>,
        budget: Option<Duration>,
    ) -> Result<QpSolution, Error> {
        let reduced = program.reduce(origin, basis)?;
        let solution = self.solver.solve(&reduced, budget)?;
        if solution.x().len() != basis.ncols() {
            return Err(Error::DimensionMismatch {
                what: "the reduced solution".to_string(),
                expected: basis.ncols(),
                found: solution.x().len(),
            });
        }

        let x = origin + basis * solution.x();
        Ok(
            QpSolution::new(x, solution.inequality_multipliers().clone(), solution.status())
                .with_statistics(solution.iterations(), solution.solve_time()),
        )
    }

    /// Returns the full program of a level: its own rows, the inequality rows carried
    /// from the levels above and, for the augmented strategy, the locked rows.
    ///
    /// The own inequality rows come first so that their indices match the task set.
    fn level_program(
        &self,
        set: &TaskSet,
        hierarchy: &Hierarchy,
    ) -> Result<QuadraticProgram, Error> {
        let program = level_objective(set, &hierarchy.x)?
            .with_inequalities(&hierarchy.carried_matrix, &hierarchy.carried_bound)?;

        match self.config.composition {
            CompositionStrategy::NullSpace => Ok(program),
            CompositionStrategy::AugmentedEquality => {
                program.with_equalities(&hierarchy.locked_matrix, &hierarchy.locked_target)
            }
        }
    }

    fn solve_program(
        &self,
        program: &QuadraticProgram,
        hierarchy: &Hierarchy,
        budget: Option<Duration>,
    ) -> Result<QpSolution, Error> {
        match self.config.composition {
            CompositionStrategy::NullSpace => {
                self.solve_reduced(program, &hierarchy.x, &hierarchy.basis, budget)
            }
            CompositionStrategy::AugmentedEquality => self.solver.solve(program, budget),
        }
    }

    /// Solves a single level, relaxing it when allowed, and adds its rows to the hierarchy
    /// when it was solved.
    fn solve_level(
        &self,
        set: &TaskSet,
        hierarchy: &mut Hierarchy,
        report: &mut LevelReport,
    ) -> LevelOutcome {
        let level = report.index;
        let budget = self.config.level_time_budget();
        let start = Instant::now();
        let mut set = set.clone();

        let (program, solution) = loop {
            let remaining = match budget {
                Some(budget) => {
                    let remaining = budget.saturating_sub(start.elapsed());
                    if remaining.is_zero() {
                        return self.timed_out(report, budget);
                    }
                    Some(remaining)
                }
                None => None,
            };

            let attempt = self.level_program(&set, hierarchy).and_then(|program| {
                let solution = self.solve_program(&program, hierarchy, remaining)?;
                Ok((program, solution))
            });
            let (program, solution) = match attempt {
                Ok(result) => result,
                Err(error) => {
                    return self.fail(
                        report,
                        Fault::SolverFailure {
                            level,
                            message: error.to_string(),
                        },
                    )
                }
            };

            report.solver_status = Some(solution.status());
            report.equality_rows = program.equality_target().len();
            report.inequality_rows = program.inequality_bound().len();
            report.iterations += solution.iterations();
            report.solve_time += solution.solve_time();
            trace!(
                "Level {} solved with status {} in {:?} ({} equalities, {} inequalities)",
                level,
                solution.status(),
                solution.solve_time(),
                report.equality_rows,
                report.inequality_rows
            );

            match solution.status() {
                QpStatus::Solved => break (program, solution),
                QpStatus::Infeasible => {
                    let candidate = match self.config.infeasibility_policy {
                        InfeasibilityPolicy::Relax => set.relaxation_candidate(),
                        InfeasibilityPolicy::HardFail => None,
                    };
                    let Some((index, block)) = candidate
                        .and_then(|index| set.inequality_blocks().get(index).map(|b| (index, b)))
                    else {
                        return self.fail(report, Fault::InfeasibleLevel { level });
                    };

                    let relaxation = Relaxation {
                        task: block.task().to_string(),
                        rows: block.rows().len(),
                    };
                    warn!(
                        "Level {} is infeasible, dropping {} inequality rows of task {}",
                        level, relaxation.rows, relaxation.task
                    );
                    report.relaxations.push(relaxation);

                    set = match set.without_inequality_block(index) {
                        Ok(relaxed) => relaxed,
                        Err(error) => {
                            return self.fail(
                                report,
                                Fault::SolverFailure {
                                    level,
                                    message: error.to_string(),
                                },
                            )
                        }
                    };
                }
                QpStatus::Unbounded => {
                    return self.fail(report, Fault::UnboundedLevel { level })
                }
                QpStatus::TimedOut => {
                    return self.timed_out(report, budget.unwrap_or_default());
                }
                QpStatus::Failed => {
                    return self.fail(
                        report,
                        Fault::SolverFailure {
                            level,
                            message: "the solver did not converge".to_string(),
                        },
                    )
                }
            }
        };

        let x = solution.x().clone();
        report.residual = set.residual(&x);

        let active = solution.active_set(&program, self.config.activity_tolerance);
        report.active_inequalities = active.len();
        let own_rows = set.inequality_bound().len();
        let own_active: Vec<usize> = active.into_iter().filter(|row| *row < own_rows).collect();
        let locked = stack_rows(
            &stack_rows(set.equality_matrix(), set.objective_matrix()),
            &select_matrix_rows(set.inequality_matrix(), &own_active),
        );

        match self.config.composition {
            CompositionStrategy::NullSpace => {
                let projection = match self.projector.project(&hierarchy.basis, &locked) {
                    Ok(projection) => projection,
                    Err(error) => {
                        return self.fail(
                            report,
                            Fault::SolverFailure {
                                level,
                                message: error.to_string(),
                            },
                        )
                    }
                };

                debug!(
                    "Level {} locks {} rows with rank {}, {} of {} dimensions remain free",
                    level,
                    projection.rows(),
                    projection.rank(),
                    projection.free_dimension(),
                    projection.free_dimension_before()
                );

                if projection.is_rank_deficient() {
                    let warning = Warning::RankDeficiency {
                        level,
                        rank: projection.rank(),
                        rows: projection.rows(),
                    };
                    warn!("{:?}", warning);
                    report.warnings.push(warning);
                }

                if projection.is_saturated() {
                    let warning = Warning::SaturatedHierarchy { level };
                    warn!("{:?}", warning);
                    report.warnings.push(warning);
                }

                report.free_dimension = Some(projection.free_dimension());
                hierarchy.basis = projection.into_basis();
            }
            CompositionStrategy::AugmentedEquality => {
                let target = &locked * &x;
                hierarchy.locked_matrix = stack_rows(&hierarchy.locked_matrix, &locked);
                hierarchy.locked_target = stack_vectors(&hierarchy.locked_target, &target);
            }
        }

        hierarchy.carried_matrix = stack_rows(&hierarchy.carried_matrix, set.inequality_matrix());
        hierarchy.carried_bound = stack_vectors(&hierarchy.carried_bound, set.inequality_bound());
        hierarchy.x = x;

        LevelOutcome::Solved
    }

    /// Solves the task sets of a cycle and decides on the command.
    fn run_cycle(
        &mut self,
        start: Instant,
        snapshot: Option<SnapshotVersion>,
        dimension: usize,
        sets: &[TaskSet],
        mut reports: Vec<LevelReport>,
    ) -> CycleOutput {
        let mut hierarchy = Hierarchy::new(dimension);
        let mut timed_out = false;
        for (set, report) in sets.iter().zip(reports.iter_mut()) {
            if set.is_empty() {
                trace!("Level {} has no tasks", report.index);
                continue;
            }

            if let LevelOutcome::TimedOut = self.solve_level(set, &mut hierarchy, report) {
                timed_out = true;
                break;
            }
        }

        if timed_out {
            self.consecutive_timeouts += 1;
        } else {
            self.consecutive_timeouts = 0;
        }

        let faults: Vec<&Fault> = reports.iter().flat_map(|r| r.faults.iter()).collect();
        let requires_fallback = faults.iter().any(|fault| fault.requires_fallback());
        let relaxed = reports.iter().any(|r| !r.relaxations.is_empty());

        let (status, command, used_fallback) =
            if timed_out && self.consecutive_timeouts >= self.config.max_consecutive_timeouts {
                error!(
                    "The solver timed out in {} consecutive cycles, commanding zero",
                    self.consecutive_timeouts
                );
                (CycleStatus::Escalated, DVector::zeros(dimension), true)
            } else if requires_fallback {
                (
                    CycleStatus::Degraded,
                    self.fallback_command(dimension),
                    true,
                )
            } else if !faults.is_empty() {
                (CycleStatus::Degraded, hierarchy.x, false)
            } else if relaxed {
                (CycleStatus::Relaxed, hierarchy.x, false)
            } else {
                (CycleStatus::Optimal, hierarchy.x, false)
            };

        for (set, report) in sets.iter().zip(reports.iter_mut()) {
            report.final_residual = set.residual(&command);
            let drift = (report.final_residual - report.residual).abs();
            if !used_fallback
                && report.solver_status == Some(QpStatus::Solved)
                && drift > self.config.residual_tolerance * (1.0 + report.residual)
            {
                warn!(
                    "The residual of level {} changed by {} after solving the levels below it",
                    report.index, drift
                );
            }
        }

        if !used_fallback && self.config.warm_start {
            self.previous_command = Some(command.clone());
        }

        CycleOutput {
            command,
            record: CycleRecord {
                status,
                snapshot,
                levels: reports,
                used_fallback,
                consecutive_timeouts: self.consecutive_timeouts,
                elapsed: start.elapsed(),
            },
        }
    }

    /// Returns the options of the stack.
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Returns the number of consecutive cycles that ended in a timeout.
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Creates a stack from a hierarchy description, creating the tasks through the
    /// registry.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when the configuration is not valid.
    /// * [Error::UnknownTaskKind] - Returned when a task kind is not registered.
    /// * Any error of a task factory, for instance [Error::InvalidTaskParameters].
    pub fn from_config(
        config: &ControllerConfig,
        registry: &FrozenTaskRegistry,
    ) -> Result<Self, Error> {
        config.validate()?;

        let mut stack = Self::with_clarabel(config.variable_space, config.engine.clone())?;
        for descriptor in config.levels.iter() {
            let mut level = PriorityLevel::new(descriptor.name.clone());
            for task in descriptor.tasks.iter() {
                level = level.with_task(registry.create(task, config.variable_space)?);
            }
            stack.push_level(level)?;
        }

        Ok(stack)
    }

    /// Returns the levels, highest priority first.
    pub fn levels(&self) -> &[PriorityLevel] {
        &self.levels
    }

    /// Creates an empty stack.
    ///
    /// ## Parameters
    ///
    /// * 'variable_space' - The variable space every task of the stack has to use
    /// * 'config' - The options of the stack
    /// * 'solver' - The quadratic program solver
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when an option is out of range.
    pub fn new(
        variable_space: VariableSpace,
        config: StackConfig,
        solver: Box<dyn QpSolver>,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            variable_space,
            projector: NullSpaceProjector::new(config.rank_tolerance),
            config,
            levels: vec![],
            solver,
            previous_command: None,
            consecutive_timeouts: 0,
        })
    }

    /// Returns the command of the last cycle that was not degraded, if warm start is
    /// enabled.
    pub fn previous_command(&self) -> Option<&DVector<f64>> {
        self.previous_command.as_ref()
    }

    /// Adds a level below the existing levels.
    ///
    /// ## Errors
    ///
    /// * [Error::VariableSpaceMismatch] - Returned when a task of the level uses another
    ///   variable space than the stack.
    pub fn push_level(&mut self, level: PriorityLevel) -> Result<(), Error> {
        if let Some(task) = level
            .tasks()
            .iter()
            .find(|task| task.variable_space() != self.variable_space)
        {
            return Err(Error::VariableSpaceMismatch {
                task: task.name().to_string(),
                expected: self.variable_space,
                found: task.variable_space(),
            });
        }

        self.levels.push(level);
        Ok(())
    }

    /// Forgets the previous command and the timeout history.
    pub fn reset(&mut self) {
        self.previous_command = None;
        self.consecutive_timeouts = 0;
    }

    /// Runs one control cycle: builds the tasks of every level from the state, aggregates
    /// them and solves the hierarchy.
    ///
    /// A task that cannot be built is left out of its level and recorded as a
    /// [Fault::MalformedTask]. The other tasks of the level are still solved.
    pub fn solve_cycle(&mut self, state: &RobotState) -> CycleOutput {
        let start = Instant::now();
        let layout = VariableLayout::for_state(self.variable_space, state);

        let targets = TargetLatch::new(
            self.levels
                .iter()
                .flat_map(|level| level.tasks().iter())
                .filter_map(|task| task.target()),
        );
        let mut sets = Vec::with_capacity(self.levels.len());
        let mut reports = Vec::with_capacity(self.levels.len());
        for (index, level) in self.levels.iter().enumerate() {
            let mut report = LevelReport::new(index, level.name());

            let built = build_level_tasks(level.tasks(), state, self.config.worker_threads);
            let mut tasks = Vec::with_capacity(built.len());
            for (specification, result) in level.tasks().iter().zip(built) {
                match result.and_then(|task| task.validate_for(&layout).map(|_| task)) {
                    Ok(task) => tasks.push(task),
                    Err(error) => {
                        let fault = Fault::MalformedTask {
                            task: specification.name().to_string(),
                            error,
                        };
                        warn!("{}", fault);
                        report.faults.push(fault);
                    }
                }
            }

            let set = if tasks.is_empty() {
                TaskSet::empty(self.variable_space, layout.dimension())
            } else {
                aggregate(&tasks).unwrap_or_else(|error| {
                    let fault = Fault::MalformedTask {
                        task: level.name().to_string(),
                        error,
                    };
                    warn!("{}", fault);
                    report.faults.push(fault);
                    TaskSet::empty(self.variable_space, layout.dimension())
                })
            };

            sets.push(set);
            reports.push(report);
        }
        drop(targets);

        self.run_cycle(
            start,
            Some(state.version()),
            layout.dimension(),
            &sets,
            reports,
        )
    }

    /// Solves a single task set in the subspace `x = origin + basis z`.
    ///
    /// The returned solution is expressed in the full variable space. Its multipliers
    /// belong to the inequality rows of the set.
    ///
    /// ## Errors
    ///
    /// * [Error::DimensionMismatch] - Returned when the origin or the basis do not match the
    ///   set.
    /// * [Error::SolverFailure] - Returned when the solver cannot process the program.
    pub fn solve_in_subspace(
        &self,
        set: &TaskSet,
        origin: &DVector<f64>,
        basis: &DMatrix<f64>,
    ) -> Result<QpSolution, Error> {
        let program = level_objective(set, origin)?;
        self.solve_reduced(&program, origin, basis, self.config.level_time_budget())
    }

    /// Solves already aggregated levels, highest priority first.
    ///
    /// The levels of the stack are only used to name the reports.
    ///
    /// ## Errors
    ///
    /// * [Error::VariableSpaceMismatch] - Returned when a set uses another variable space
    ///   than the stack.
    /// * [Error::DimensionMismatch] - Returned when the sets do not all have the same
    ///   number of columns.
    pub fn solve_task_sets(&mut self, sets: &[TaskSet]) -> Result<CycleOutput, Error> {
        let start = Instant::now();
        let dimension = sets.first().map(|set| set.dimension()).unwrap_or(0);
        for set in sets.iter() {
            if set.space() != self.variable_space {
                return Err(Error::VariableSpaceMismatch {
                    task: set.task_names().join(", "),
                    expected: self.variable_space,
                    found: set.space(),
                });
            }

            if set.dimension() != dimension {
                return Err(Error::DimensionMismatch {
                    what: "the task set columns".to_string(),
                    expected: dimension,
                    found: set.dimension(),
                });
            }
        }

        let reports = (0..sets.len())
            .map(|index| match self.levels.get(index) {
                Some(level) => LevelReport::new(index, level.name()),
                None => LevelReport::new(index, format!("level {}", index)),
            })
            .collect();

        Ok(self.run_cycle(start, None, dimension, sets, reports))
    }

    /// Returns the variable space of the stack.
    pub fn variable_space(&self) -> VariableSpace {
        self.variable_space
    }

    /// Creates an empty stack that uses the [ClarabelSolver] with the solver settings of
    /// the options.
    ///
    /// ## Errors
    ///
    /// * [Error::InvalidConfiguration] - Returned when an option is out of range.
    pub fn with_clarabel(variable_space: VariableSpace, config: StackConfig) -> Result<Self, Error> {
        let solver = ClarabelSolver::new(config.solver.clone());
        Self::new(variable_space, config, Box::new(solver))
    }
}
