use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stack_of_tasks::null_space::{identity_basis, NullSpaceProjector, RankTolerance};

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        project_full_space,
        project_restricted_space,
}

criterion_main!(benches);

fn random_rows(rng: &mut ChaCha8Rng, rows: usize, columns: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, columns, |_, _| rng.gen_range(-1.0..1.0))
}

pub fn project_full_space(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let projector = NullSpaceProjector::new(RankTolerance::default());
    let basis = identity_basis(30);
    let active = random_rows(&mut rng, 12, 30);

    c.bench_function("NullSpaceProjector::project (30 free, 12 rows)", |b| {
        b.iter(|| projector.project(black_box(&basis), black_box(&active)))
    });
}

pub fn project_restricted_space(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let projector = NullSpaceProjector::new(RankTolerance::default());
    let first = random_rows(&mut rng, 12, 30);
    let basis = projector
        .project(&identity_basis(30), &first)
        .unwrap()
        .into_basis();
    let active = random_rows(&mut rng, 6, 30);

    c.bench_function("NullSpaceProjector::project (18 free, 6 rows)", |b| {
        b.iter(|| projector.project(black_box(&basis), black_box(&active)))
    });
}
