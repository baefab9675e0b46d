//! A closed sum type for the operations a worker performs, and the single
//! `perform` dispatcher that replaces a dynamic-dispatch worker hierarchy
//! (spec.md §9). The CLI surface (spec.md §6) drives only MwCAS/single-CAS
//! field updates — the queue containers have no op-kind flag and are
//! exercised directly in `tests/queue.rs` instead.
use crate::descriptor;
use crate::driver::config::Implementations;
use crate::Atomic;
use std::sync::Arc;

/// One MwCAS or single-CAS operation over a fixed arity of target fields.
#[derive(Debug, Clone)]
pub enum Op {
    Mwcas { targets: Vec<usize> },
    SingleCas { target: usize },
}

/// Shared state one worker's operation list targets.
pub struct Fields {
    pub ours: Vec<Atomic<*const u64>>,
    pub single: Vec<Atomic<*const u64>>,
}

impl Fields {
    pub fn new(num_field: usize, implementations: Implementations) -> Self {
        let make = || {
            (0..num_field)
                .map(|_| Atomic::new(Box::into_raw(Box::new(0u64)) as *const u64))
                .collect()
        };
        Self {
            ours: if implementations.ours { make() } else { Vec::new() },
            single: if implementations.single { make() } else { Vec::new() },
        }
    }
}

/// Runs one operation to completion. Called once per pre-generated op, with
/// an EBR guard already held by the caller (spec.md §2 "Each worker ...
/// enters an epoch guard, performs ..., and exits the guard").
pub fn perform(op: &Op, fields: &Arc<Fields>) {
    match op {
        Op::Mwcas { targets } => {
            let addrs: Vec<&Atomic<*const u64>> =
                targets.iter().map(|&i| &fields.ours[i]).collect();
            let expected: Vec<*const u64> = addrs.iter().map(|a| a.load()).collect();
            let new: Vec<*const u64> = expected
                .iter()
                .map(|&p| Box::into_raw(Box::new(unsafe { *p } + 1)) as *const u64)
                .collect();
            let succeeded = unsafe { descriptor::mwcas(&addrs, &expected, &new) };
            if succeeded {
                for (old, new) in expected.iter().zip(&new) {
                    let old = *old;
                    let new = *new;
                    if old != new {
                        crate::ebr::retire(move || unsafe {
                            drop(Box::from_raw(old as *mut u64));
                        });
                    }
                }
            } else {
                for p in new {
                    unsafe {
                        drop(Box::from_raw(p as *mut u64));
                    }
                }
            }
        }
        Op::SingleCas { target } => {
            let addr = &fields.single[*target];
            let backoff = crossbeam_utils::Backoff::new();
            loop {
                let curr = addr.load();
                let new = Box::into_raw(Box::new(unsafe { *curr } + 1)) as *const u64;
                match addr.compare_exchange(curr, new) {
                    Ok(_) => {
                        crate::ebr::retire(move || unsafe {
                            drop(Box::from_raw(curr as *mut u64));
                        });
                        break;
                    }
                    Err(_) => unsafe {
                        drop(Box::from_raw(new as *mut u64));
                        backoff.spin();
                    },
                }
            }
        }
    }
}
