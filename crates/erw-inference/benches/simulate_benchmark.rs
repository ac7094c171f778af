use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use erw_core::{ModelParameters, Posterior};
use erw_inference::{RiskMultiplierSource, SimulationConfig, TargetPolicy, simulate, summarize};
use std::hint::black_box;

fn posterior() -> Posterior {
    Posterior {
        eta_r_mean: -2.0,
        eta_r_var: 0.05,
        eta_phi_mean: 0.3,
        eta_phi_var: 0.1,
        parameters: ModelParameters {
            alpha_r: 0.001,
            alpha_phi: 0.0,
            sigma_r: 0.02,
            sigma_phi: 0.03,
            sigma_obs: 1e-3,
        },
    }
}

fn bench_simulate_threads(c: &mut Criterion) {
    let post = posterior();
    let risk = RiskMultiplierSource::Sequence(vec![1.0, 0.9, 0.8]);

    let mut group = c.benchmark_group("simulate/10k_runs_120m");
    group.sample_size(10);
    for n_threads in [1usize, 0] {
        let cfg = SimulationConfig { n_threads, ..SimulationConfig::new(10_000).with_seed(42) };
        group.bench_with_input(BenchmarkId::new("threads", n_threads), &cfg, |b, cfg| {
            b.iter(|| {
                let ens =
                    simulate(black_box(&post), Some(10.0), Some(0.5), Some(&risk), cfg).unwrap();
                black_box(ens.len());
            });
        });
    }
    group.finish();
}

fn bench_summarize(c: &mut Criterion) {
    let cfg = SimulationConfig::new(100_000).with_seed(7);
    let totals = simulate(&posterior(), Some(10.0), Some(0.5), None, &cfg).unwrap().totals();
    c.bench_function("summarize/100k", |b| {
        b.iter(|| {
            black_box(summarize(black_box(&totals), &TargetPolicy::explicit(50.0)).unwrap().p_hit)
        });
    });
}

criterion_group!(benches, bench_simulate_threads, bench_summarize);
criterion_main!(benches);
