use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use skyslice::metrics::cadence::{SupernovaMetric, UniformityMetric};
use skyslice::metrics::discovery::{DiscoveryChancesMetric, DiscoveryChancesParams};
use skyslice::metrics::Metric;
use skyslice::observations::{Filter, Visit};
use skyslice::slicers::{Slice, SlicePoint};

/// Ten years of visits on one field: a few visits on most nights, in random filters.
fn survey_slice(rng: &mut StdRng, n_nights: i32) -> Slice {
    let mut visits = Vec::new();
    for night in 0..n_nights {
        if !rng.random_bool(0.7) {
            continue;
        }
        for k in 0..rng.random_range(1..=4) {
            let time = 60000.0 + night as f64 + 0.01 * k as f64 + rng.random_range(0.0..0.005);
            let filter = Filter::ALL[rng.random_range(0..Filter::ALL.len())];
            visits.push(Visit::new(time, night, filter, rng.random_range(22.0..25.0)));
        }
    }

    Slice {
        index: 0,
        point: SlicePoint::HBin { h_index: 0, h: 0.0 },
        visits,
    }
}

fn bench_windowed(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    let slice = survey_slice(&mut rng, 3650);

    let discovery = DiscoveryChancesMetric::default();
    c.bench_function("discovery_chances/10y", |b| {
        b.iter(|| discovery.run(black_box(&slice)))
    });

    let unique = DiscoveryChancesMetric::new(
        DiscoveryChancesParams::builder()
            .unique_windows(true)
            .build()
            .unwrap(),
    );
    c.bench_function("discovery_chances/10y_unique", |b| {
        b.iter(|| unique.run(black_box(&slice)))
    });

    let supernova = SupernovaMetric::default();
    c.bench_function("supernova/10y", |b| {
        b.iter(|| supernova.run(black_box(&slice)))
    });

    let uniformity = UniformityMetric::default();
    c.bench_function("uniformity/10y", |b| {
        b.iter(|| uniformity.run(black_box(&slice)))
    });
}

criterion_group!(benches, bench_windowed);
criterion_main!(benches);
