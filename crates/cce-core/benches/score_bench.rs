//! Benchmarks for scoring and rule compilation.

use cce_core::{calculate_scores, default_policies, policies_to_rules, Severity, Violation};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn full_matrix_violations() -> Vec<Violation> {
    (1..=40u32)
        .flat_map(|stage| {
            Severity::ALL
                .iter()
                .map(move |s| Violation::new(format!("P-{stage}-{s}"), stage, *s))
        })
        .collect()
}

fn bench_scoring(c: &mut Criterion) {
    let violations = full_matrix_violations();
    c.bench_function("calculate_scores_200", |b| {
        b.iter(|| calculate_scores(black_box(&violations)));
    });
}

fn bench_compile(c: &mut Criterion) {
    let mut policies = Vec::new();
    for round in 0..20u32 {
        for mut policy in default_policies() {
            policy.policy_id = format!("{}-{round}", policy.policy_id);
            policies.push(policy);
        }
    }
    c.bench_function("policies_to_rules_120", |b| {
        b.iter(|| policies_to_rules(black_box(&policies)));
    });
}

criterion_group!(benches, bench_scoring, bench_compile);
criterion_main!(benches);
