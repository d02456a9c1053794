use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stack_of_tasks::{
    config::{CompositionStrategy, StackConfig},
    stack::{PriorityLevel, PriorityStack},
    state::{
        joint_state::{JointState, JointStateRange},
        robot_state::{FrameState, JointRecord, RobotState, RobotStateBuilder},
    },
    target::{Gains, TaskTarget},
    tasks::{
        cartesian::{CartesianTask, FrameSource},
        joint_limits::JointLimitsTask,
        minimum_effort::MinimumEffortTask,
        posture::PostureTask,
    },
    variable_space::VariableSpace,
};

const JOINTS: usize = 24;
const SPACE: VariableSpace = VariableSpace::KinematicVelocity;

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        solve_cycle_null_space,
        solve_cycle_augmented_equality,
}

criterion_main!(benches);

fn robot_state(rng: &mut ChaCha8Rng) -> Arc<RobotState> {
    let mut builder = RobotStateBuilder::new(0.002);
    for i in 0..JOINTS {
        builder = builder.joint(JointRecord::new(
            format!("joint_{}", i),
            JointState::new(rng.gen_range(-0.5..0.5), Some(0.0), None),
            Some(JointStateRange::new(
                JointState::new(-2.0, Some(-3.0), None),
                JointState::new(2.0, Some(3.0), None),
            )),
        ));
    }

    for frame in ["left_hand", "right_hand", "head"] {
        let jacobian = DMatrix::from_fn(6, JOINTS, |_, _| rng.gen_range(-1.0..1.0));
        let state = FrameState::new(DVector::zeros(6), DVector::zeros(6), jacobian)
            .unwrap();
        builder = builder.frame(frame, state);
    }

    builder.build().unwrap()
}

fn stack(composition: CompositionStrategy) -> PriorityStack {
    let config = StackConfig {
        composition,
        ..StackConfig::default()
    };
    let mut stack =
        PriorityStack::with_clarabel(SPACE, config).unwrap();

    let hand = |name: &str, x: f64| {
        Arc::new(CartesianTask::new(
            name,
            SPACE,
            FrameSource::Frame(name.to_string()),
            TaskTarget::new(DVector::from_vec(vec![x, 0.1, 0.2, 0.0, 0.0, 0.0])),
            Gains::default(),
            1.0,
        ))
    };

    let levels = vec![
        PriorityLevel::new("limits").with_task(Arc::new(JointLimitsTask::new("limits", SPACE))),
        PriorityLevel::new("hands")
            .with_task(hand("left_hand", 0.3))
            .with_task(hand("right_hand", -0.3)),
        PriorityLevel::new("head").with_task(hand("head", 0.0)),
        PriorityLevel::new("posture")
            .with_task(Arc::new(PostureTask::new(
                "posture",
                SPACE,
                TaskTarget::new(DVector::zeros(JOINTS)),
                Gains::default(),
                1.0,
            )))
            .with_task(Arc::new(MinimumEffortTask::new("effort", SPACE, 0.01))),
    ];
    for level in levels {
        stack
            .push_level(level)
            .unwrap();
    }

    stack
}

pub fn solve_cycle_null_space(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let state = robot_state(&mut rng);
    let mut stack = stack(CompositionStrategy::NullSpace);

    c.bench_function("PriorityStack::solve_cycle (null space)", |b| {
        b.iter(|| stack.solve_cycle(black_box(&state)))
    });
}

pub fn solve_cycle_augmented_equality(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let state = robot_state(&mut rng);
    let mut stack = stack(CompositionStrategy::AugmentedEquality);

    c.bench_function("PriorityStack::solve_cycle (augmented equality)", |b| {
        b.iter(|| stack.solve_cycle(black_box(&state)))
    });
}
