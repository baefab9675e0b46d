use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mwcas_bench::ebr;

fn pin_unpin(c: &mut Criterion) {
    let mut group = c.benchmark_group("ebr_pin");
    group.bench_function("pin_unpin", |bencher| {
        bencher.iter(|| black_box(ebr::pin()));
    });
    group.finish();
}

criterion_group!(benches, pin_unpin);
criterion_main!(benches);
