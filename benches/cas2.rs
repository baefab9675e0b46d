use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use mwcas_bench::descriptor::cas2;
use mwcas_bench::{ebr, Atomic};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[cfg(feature = "mimalloc-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn cas2_sum(
    atomics: Arc<Box<[Atomic<*const u32>]>>,
    threads: usize,
    per_thread: usize,
) -> Box<[Atomic<*const u32>]> {
    let mut handles = Vec::new();
    for thread in 0..threads {
        let atomics = atomics.clone();
        let h = std::thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(thread as u64);
            let mut num_succeeded = 0usize;
            for _ in 0..per_thread {
                let _guard = ebr::pin();
                let first = &atomics[rng.gen_range(0, atomics.len())];
                let second = &atomics[rng.gen_range(0, atomics.len())];
                let first_current = first.load();
                let second_current = second.load();
                let new_first = Box::into_raw(Box::new(unsafe { *first_current } + 1)) as *const u32;
                let new_second =
                    Box::into_raw(Box::new(unsafe { *second_current } + 1)) as *const u32;

                let succeeded = unsafe {
                    cas2(first, second, first_current, second_current, new_first, new_second)
                };
                if succeeded {
                    ebr::retire(move || unsafe {
                        drop(Box::from_raw(first_current as *mut u32));
                    });
                    ebr::retire(move || unsafe {
                        drop(Box::from_raw(second_current as *mut u32));
                    });
                    num_succeeded += 1;
                } else {
                    unsafe {
                        drop(Box::from_raw(new_first as *mut u32));
                        drop(Box::from_raw(new_second as *mut u32));
                    }
                }
            }
            num_succeeded
        });
        handles.push(h);
    }

    let _total_succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    match Arc::try_unwrap(atomics) {
        Ok(a) => a,
        Err(_) => panic!("worker still holds a reference"),
    }
}

fn cas2_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cas2");
    let num_threads = 24u64;
    let per_thread = 50_000u64;
    group.throughput(Throughput::Elements(num_threads * per_thread));
    group.bench_function("cas2_sum", |b| {
        b.iter_batched(
            || {
                Arc::new(
                    (0..24_000)
                        .map(|_| Atomic::new(Box::into_raw(Box::new(0u32)) as *const u32))
                        .collect::<Vec<_>>()
                        .into_boxed_slice(),
                )
            },
            |map| cas2_sum(map, num_threads as usize, per_thread as usize),
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, cas2_benchmark);
criterion_main!(benches);
