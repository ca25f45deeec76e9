//! Work-decomposition benchmarks
//!
//! Measures the hot paths of the dispatch plan:
//! - POE -> IML interpolation throughput
//! - Site-block splitting
//! - Full parameter-space enumeration over an in-memory store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hazard_disagg::enumerate::enumerate_requests;
use hazard_disagg::store::{CurveKey, HazardStore, MemoryStore};
use hazard_disagg::{
    interpolate_iml, split_site_blocks, CalculationId, CalculationSettings, GsimSet, HazardCurve,
    Imt, ImtLevels, LogicTreePath, Realization, Site,
};
use std::sync::Arc;

/// A curve with `points` knots: ascending IMLs, descending POEs
fn make_curve(points: usize) -> HazardCurve {
    let imls: Vec<f64> = (0..points).map(|i| 0.01 * (i + 1) as f64).collect();
    let poes: Vec<f64> = (0..points)
        .map(|i| 0.9 * (1.0 - i as f64 / points as f64))
        .collect();
    HazardCurve::new(imls, poes).unwrap()
}

fn make_sites(count: usize) -> Vec<Site> {
    (0..count)
        .map(|i| Site::new(10.0 + 0.1 * i as f64, 45.0))
        .collect()
}

fn settings(n_poes: usize) -> CalculationSettings {
    CalculationSettings {
        imts: vec![ImtLevels::new(Imt::Pga, vec![0.1, 0.2, 0.3])],
        poes_disagg: (0..n_poes).map(|i| 0.5 / (i + 1) as f64).collect(),
        investigation_time: 50.0,
        truncation_level: 3.0,
        num_epsilon_bins: 6,
        mag_bin_width: 0.5,
        distance_bin_width: 10.0,
        coordinate_bin_width: 0.5,
        maximum_distance: 200.0,
        block_size: 100,
    }
}

fn bench_interpolation(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpolation");

    for points in [8usize, 32, 128].iter() {
        let curve = make_curve(*points);
        group.bench_with_input(BenchmarkId::from_parameter(points), points, |b, _| {
            b.iter(|| interpolate_iml(black_box(&curve), black_box(0.1)))
        });
    }

    group.finish();
}

fn bench_block_splitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_splitting");

    for count in [100usize, 1_000, 10_000].iter() {
        let sites = make_sites(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| split_site_blocks(black_box(&sites), 100))
        });
    }

    group.finish();
}

fn bench_enumeration(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("enumeration");
    group.sample_size(20);

    for count in [10usize, 100].iter() {
        let sites = make_sites(*count);
        let settings = settings(4);

        let store = MemoryStore::new();
        let realization = Realization::new(
            0u64,
            CalculationId::new(),
            LogicTreePath::new(vec!["b1"]),
            LogicTreePath::new(vec!["b1"]),
            *count as u32,
        );
        rt.block_on(async {
            for site in &sites {
                store
                    .put_curve(
                        CurveKey::new(*site, Imt::Pga, realization.id),
                        make_curve(32),
                    )
                    .await
                    .unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                rt.block_on(enumerate_requests(
                    &store,
                    &settings,
                    &realization,
                    &sites,
                    Arc::new(Vec::new()),
                    Arc::new(GsimSet::new()),
                ))
                .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_interpolation,
    bench_block_splitting,
    bench_enumeration
);
criterion_main!(benches);
