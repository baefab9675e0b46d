//! Cross-module scenarios from spec.md §8 ("Concrete scenarios").

use mwcas_bench::{MsQueue, MwQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn mwqueue_single_producer_single_consumer_preserves_order() {
    let q = Arc::new(MwQueue::new());
    let producer = {
        let q = q.clone();
        std::thread::spawn(move || {
            for i in 0..100_000u64 {
                q.push(i);
            }
        })
    };

    let done = Arc::new(AtomicBool::new(false));
    let consumer = {
        let q = q.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let mut popped = Vec::with_capacity(100_000);
            while popped.len() < 100_000 {
                match q.pop() {
                    Some(v) => popped.push(v),
                    None => {
                        if done.load(Ordering::Acquire) && q.is_empty() {
                            break;
                        }
                        std::thread::yield_now();
                    }
                }
            }
            popped
        })
    };

    producer.join().unwrap();
    done.store(true, Ordering::Release);
    let popped = consumer.join().unwrap();

    assert_eq!(popped.len(), 100_000);
    assert!(popped.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(popped[0], 0);
    assert_eq!(popped[popped.len() - 1], 99_999);
}

#[test]
fn msqueue_eight_producers_single_consumer_sums_to_total() {
    let q = Arc::new(MsQueue::new());
    let mut producers = Vec::new();
    for _ in 0..8 {
        let q = q.clone();
        producers.push(std::thread::spawn(move || {
            for _ in 0..100_000u64 {
                q.push(1u64);
            }
        }));
    }

    let done = Arc::new(AtomicBool::new(false));
    let consumer = {
        let q = q.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let mut total = 0u64;
            loop {
                match q.pop() {
                    Some(v) => total += v,
                    None => {
                        if done.load(Ordering::Acquire) && q.is_empty() {
                            break;
                        }
                        std::thread::yield_now();
                    }
                }
            }
            total
        })
    };

    for p in producers {
        p.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let total = consumer.join().unwrap();

    assert_eq!(total, 800_000);
    assert!(q.debug_is_valid());
}
