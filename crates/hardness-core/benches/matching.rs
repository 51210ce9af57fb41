use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hardness_core::answer::{normalize, AnswerMatcher};

const LONG_OUTPUT: &str = "We start from 2x + 5 = 13. Subtracting 5 from both sides gives \
2x = 8, and dividing by two leaves x = 4. Checking: 2 * 4 + 5 = 13, which holds. \
Therefore the solution is unique.\n\n【答案：$x = 4$】\n";

fn bench_compare(c: &mut Criterion) {
    let matcher = AnswerMatcher::default();
    let mut group = c.benchmark_group("compare");

    group.bench_function("exact", |b| {
        b.iter(|| matcher.compare(black_box("【答案：4】"), black_box("4")))
    });

    group.bench_function("containment", |b| {
        b.iter(|| matcher.compare(black_box(LONG_OUTPUT), black_box("4")))
    });

    group.bench_function("numeric_fallback", |b| {
        b.iter(|| matcher.compare(black_box("Final Answer: 4.0 units"), black_box("x=4")))
    });

    group.bench_function("no_marker", |b| {
        b.iter(|| matcher.compare(black_box("I could not find the answer."), black_box("7")))
    });

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize", |b| {
        b.iter(|| normalize(black_box("  $\\frac{ 1 }{ 2 }$ \n")))
    });
}

criterion_group!(benches, bench_compare, bench_normalize);
criterion_main!(benches);
