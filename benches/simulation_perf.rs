
use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use fairsim::baseline::BaselineMetrics;
use fairsim::config::SimulationConfig;
use fairsim::metrics::gini;
use fairsim::policy::{ElasticityDraw, transform};
use fairsim::simulation::{Simulation, run_trial};

use fixtures::{LARGE, MEDIUM, SMALL, active_policy, make_population};

// ── Group 1: transform: one person through the full effect pipeline ────────

fn bench_transform(c: &mut Criterion) {
    let people = make_population(1_000);
    let policy = active_policy();
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let draw = ElasticityDraw::sample(&policy, &mut rng);

    let mut group = c.benchmark_group("transform");
    group.throughput(Throughput::Elements(people.len() as u64));
    group.bench_function("1k_people", |b| {
        b.iter(|| {
            people.iter().map(|p| transform(p, &policy, &draw, &mut rng).income_change).sum::<f64>()
        })
    });
    group.finish();
}

// ── Group 2: gini and baseline: population size scaling ────────────────────

fn bench_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("baseline");
    for &n in &[1_000usize, 10_000, 100_000] {
        let people = make_population(n);
        let incomes: Vec<f64> = people.iter().map(|p| p.income).collect();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("gini", n), &incomes, |b, incomes| {
            b.iter(|| gini(incomes))
        });
        group.bench_with_input(BenchmarkId::new("compute", n), &people, |b, people| {
            b.iter(|| BaselineMetrics::compute(people))
        });
    }
    group.finish();
}

// ── Group 3: single_trial: one trial over the whole population ─────────────

fn bench_single_trial(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_trial");
    for (name, scenario) in [("small", &SMALL), ("medium", &MEDIUM), ("large", &LARGE)] {
        let people = make_population(scenario.people);
        let policy = active_policy();
        group.throughput(Throughput::Elements(scenario.people as u64));
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| run_trial(&people, &policy, 0, 42))
        });
    }
    group.finish();
}

// ── Group 4: full_run: chunked parallel run with aggregation ───────────────

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_run");
    for (name, scenario) in [("small", &SMALL), ("medium", &MEDIUM), ("large", &LARGE)] {
        if name == "large" {
            group.sample_size(10);
        }
        let people = Arc::new(make_population(scenario.people));
        let baseline = Arc::new(BaselineMetrics::compute(&people).expect("non-empty population"));
        let config = SimulationConfig {
            trials: scenario.trials,
            seed: Some(42),
            policy: active_policy(),
            ..SimulationConfig::canonical()
        };
        group.throughput(Throughput::Elements((scenario.people * scenario.trials) as u64));
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter_batched(
                || Simulation::new(people.clone(), Some(baseline.clone()), &config).expect("valid run"),
                |mut sim| sim.run(),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transform, bench_baseline, bench_single_trial, bench_full_run,);
criterion_main!(benches);
