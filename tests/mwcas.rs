//! Cross-module scenarios from spec.md §8 ("Concrete scenarios").

use mwcas_bench::descriptor::mwcas;
use mwcas_bench::{ebr, Atomic};
use std::sync::Arc;

#[test]
fn two_threads_arity_two_counter_to_two_hundred_thousand() {
    let a = Arc::new(Atomic::<usize>::new(0));
    let b = Arc::new(Atomic::<usize>::new(0));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let a = a.clone();
        let b = b.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..100_000 {
                loop {
                    let _guard = ebr::pin();
                    let curr_a = a.load();
                    let curr_b = b.load();
                    let addrs: [&Atomic<usize>; 2] = [&*a, &*b];
                    let expected = [curr_a, curr_b];
                    let new = [curr_a + 1, curr_b + 1];
                    if unsafe { mwcas(&addrs, &expected, &new) } {
                        break;
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(a.load(), 200_000);
    assert_eq!(b.load(), 200_000);
}

#[test]
fn mwcas_arity_four_with_foreign_descriptor_helping() {
    let fields = Arc::new(vec![
        Atomic::<usize>::new(0),
        Atomic::<usize>::new(0),
        Atomic::<usize>::new(0),
        Atomic::<usize>::new(0),
    ]);

    // two concurrent arity-4 attempts over the same fields: the slower
    // thread necessarily observes the other's in-flight descriptor and
    // must help it to completion before it can proceed.
    let mut handles = Vec::new();
    for t in 0..2u8 {
        let fields = fields.clone();
        handles.push(std::thread::spawn(move || {
            let addrs: Vec<&Atomic<usize>> = fields.iter().collect();
            let expected = [0usize; 4];
            let new = [t as usize + 1; 4];
            unsafe { mwcas(&addrs, &expected, &new) }
        }));
    }

    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|&&r| r).count(), 1);
}

#[test]
fn arity_k_stress_every_field_reflects_successful_mwcas_count() {
    const NUM_FIELDS: usize = 1_000;
    const ARITY: usize = 8;
    const NUM_THREADS: usize = 16;
    const OPS_PER_THREAD: usize = 10_000;

    let fields: Arc<Vec<Atomic<usize>>> =
        Arc::new((0..NUM_FIELDS).map(|_| Atomic::new(0)).collect());
    let success_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for t in 0..NUM_THREADS {
        let fields = fields.clone();
        let success_count = success_count.clone();
        handles.push(std::thread::spawn(move || {
            let mut rng_state = (t as u64 + 1).wrapping_mul(2_654_435_761);
            let mut next_index = || {
                rng_state ^= rng_state << 13;
                rng_state ^= rng_state >> 7;
                rng_state ^= rng_state << 17;
                (rng_state as usize) % NUM_FIELDS
            };
            for _ in 0..OPS_PER_THREAD {
                let mut targets = std::collections::HashSet::with_capacity(ARITY);
                while targets.len() < ARITY {
                    targets.insert(next_index());
                }
                let targets: Vec<usize> = targets.into_iter().collect();
                let _guard = ebr::pin();
                let addrs: Vec<&Atomic<usize>> = targets.iter().map(|&i| &fields[i]).collect();
                let expected: Vec<usize> = addrs.iter().map(|a| a.load()).collect();
                let new: Vec<usize> = expected.iter().map(|v| v + 1).collect();
                if unsafe { mwcas(&addrs, &expected, &new) } {
                    success_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let total: usize = fields.iter().map(|f| f.load()).sum();
    let successes = success_count.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(total, successes * ARITY);
}
