use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use std::hint::black_box;
use std::sync::Arc;
use thinkick_core::dispatcher::track_thin_slice_quadrupole;
use thinkick_core::element::{Quadrupole, ThinSliceQuadrupole};
use thinkick_types::config::TrackingConfig;
use thinkick_types::constants::ELECTRON_MASS_EV;
use thinkick_types::state::{ParticleSet, ReferenceParticle};

fn bench_dispatch(c: &mut Criterion) {
    let reference = ReferenceParticle::new(ELECTRON_MASS_EV, -1.0, 5e9).unwrap();
    let parent = Arc::new(
        Quadrupole::new(1.0, 1.2, 0.0)
            .unwrap()
            .with_radiation_flag(1)
            .unwrap(),
    );
    let slice = ThinSliceQuadrupole::new(parent, 0.25).unwrap();

    let mut group = c.benchmark_group("thin_slice_dispatch");
    for n in [1_000usize, 100_000] {
        let rows = Array2::from_shape_fn((n, 6), |(i, j)| match j {
            0 => 1e-6 * (i % 1000) as f64,
            2 => -1e-6 * (i % 700) as f64,
            _ => 0.0,
        });
        let set = ParticleSet::from_coordinates(reference, &rows).unwrap();
        for (label, parallel) in [("sequential", false), ("rayon", true)] {
            let config = TrackingConfig {
                parallel,
                ..TrackingConfig::default()
            };
            group.bench_with_input(BenchmarkId::new(label, n), &set, |b, set| {
                b.iter(|| {
                    let mut particles = set.clone();
                    track_thin_slice_quadrupole(&slice, &mut particles, &config);
                    black_box(particles.particles[0].px)
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
