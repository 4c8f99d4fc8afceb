use criterion::{black_box, criterion_group, criterion_main, Criterion};
use echo_policy_engine::cache::solve_policy;
use echo_policy_engine::catalogue::{default_catalogue, default_weights};
use echo_policy_engine::cost::{CostModel, CostWeights};
use echo_policy_engine::dp::{self, DpContext};
use echo_policy_engine::lambda_search::SearchParams;
use echo_policy_engine::scorer::{Scorer, ScorerVariant};
use std::sync::atomic::AtomicBool;

fn bench_dp_evaluate(c: &mut Criterion) {
    let catalogue = default_catalogue();
    let scorer = Scorer::new(ScorerVariant::Linear, default_weights());
    let cost = CostModel::new(
        CostWeights {
            w_echo: 1.0,
            w_tuner: 1.0,
            w_exp: 0.01,
        },
        0.66,
    );
    let ctx = DpContext {
        catalogue: &catalogue,
        scorer: &scorer,
        cost: &cost,
        target: 60.0,
    };
    let cancel = AtomicBool::new(false);

    c.bench_function("dp_evaluate_single_lambda", |b| {
        b.iter(|| black_box(dp::evaluate(black_box(12.0), &ctx, &cancel).unwrap()))
    });
}

fn bench_compute_policy(c: &mut Criterion) {
    c.bench_function("compute_policy_full_lambda_search", |b| {
        b.iter(|| {
            let catalogue = default_catalogue();
            let scorer = Scorer::new(ScorerVariant::Linear, default_weights());
            let cost = CostModel::new(
                CostWeights {
                    w_echo: 1.0,
                    w_tuner: 1.0,
                    w_exp: 0.01,
                },
                0.66,
            );
            let cancel = AtomicBool::new(false);
            black_box(solve_policy(catalogue, scorer, cost, 60.0, SearchParams::default(), &cancel).unwrap())
        })
    });
}

criterion_group!(benches, bench_dp_evaluate, bench_compute_policy);
criterion_main!(benches);
