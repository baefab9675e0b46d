//! Worker spawn/join orchestration: the two-gate barrier protocol of
//! spec.md §4.7 wired up around [`crate::driver::op::perform`].

use crate::driver::barrier::CountdownLatch;
use crate::driver::config::{Config, Mode};
use crate::driver::op::{perform, Fields, Op};
use crate::driver::stats::{self, LatencyPercentiles, ThroughputReport};
use crate::driver::workload;
use crate::ebr;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub enum Report {
    Throughput(ThroughputReport),
    Latency(LatencyPercentiles),
}

/// Build one worker's pre-generated operation list (spec.md §4.7:
/// "Pre-generates its operation list ... never during timing").
fn build_ops(config: &Config, ops_for_this_worker: usize, seed: u64) -> Vec<Op> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut selector = workload::selector(config.num_field, config.skew_parameter);
    let use_mwcas = config.implementations.ours;
    (0..ops_for_this_worker)
        .map(|_| {
            if use_mwcas {
                Op::Mwcas {
                    targets: distinct_targets(config.num_target, &mut *selector, &mut rng),
                }
            } else {
                Op::SingleCas {
                    target: selector.next(&mut rng),
                }
            }
        })
        .collect()
}

/// Samples `num_target` pairwise-distinct field indices (spec.md §5:
/// "addresses within one descriptor are pairwise distinct" — enforced again,
/// defensively, by `descriptor::mwcas` itself).
fn distinct_targets(
    num_target: usize,
    selector: &mut dyn workload::FieldSelector,
    rng: &mut SmallRng,
) -> Vec<usize> {
    let mut seen = HashSet::with_capacity(num_target);
    while seen.len() < num_target {
        seen.insert(selector.next(rng));
    }
    seen.into_iter().collect()
}

/// Runs `config.num_thread` workers through the two-gate barrier and
/// returns the aggregated report for whichever mode was configured.
pub fn run(config: Config) -> Report {
    let fields = Arc::new(Fields::new(config.num_field, config.implementations));
    let start_gate = Arc::new(CountdownLatch::new(config.num_thread));
    let finish_gate = Arc::new(CountdownLatch::new(config.num_thread));

    let base_seed = config.seed.unwrap_or(0);
    let ops_per_thread = config.num_exec / config.num_thread;
    let remainder = config.num_exec % config.num_thread;

    let mut handles = Vec::with_capacity(config.num_thread);
    for worker in 0..config.num_thread {
        let fields = fields.clone();
        let start_gate = start_gate.clone();
        let finish_gate = finish_gate.clone();
        let mode = config.mode;
        let ops_for_this_worker = ops_per_thread + usize::from(worker < remainder);
        let op_list = build_ops(&config, ops_for_this_worker, base_seed.wrapping_add(worker as u64));

        handles.push(std::thread::spawn(move || {
            // gate A: block until every worker has finished constructing
            // its private state (its op list, here)
            start_gate.count_down();
            start_gate.wait();

            let result = match mode {
                Mode::Throughput => {
                    let start = Instant::now();
                    for op in &op_list {
                        let _guard = ebr::pin();
                        perform(op, &fields);
                    }
                    WorkerResult::Elapsed(start.elapsed())
                }
                Mode::Latency => {
                    let mut latencies = Vec::with_capacity(op_list.len());
                    for op in &op_list {
                        let op_start = Instant::now();
                        {
                            let _guard = ebr::pin();
                            perform(op, &fields);
                        }
                        latencies.push(op_start.elapsed());
                    }
                    latencies.sort_unstable();
                    WorkerResult::Latencies(latencies)
                }
            };

            // gate B: block until aggregation is complete
            finish_gate.count_down();
            finish_gate.wait();
            result
        }));
    }

    info!(threads = config.num_thread, ops = config.num_exec, "run started");

    let results: Vec<WorkerResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    debug!("all workers crossed the finish gate");

    match config.mode {
        Mode::Throughput => {
            let durations: Vec<Duration> = results
                .into_iter()
                .map(|r| match r {
                    WorkerResult::Elapsed(d) => d,
                    WorkerResult::Latencies(_) => unreachable!(),
                })
                .collect();
            let report = stats::throughput(config.num_exec, &durations);
            info!(ops_per_sec = report.ops_per_sec, "throughput computed");
            Report::Throughput(report)
        }
        Mode::Latency => {
            let per_worker: Vec<Vec<Duration>> = results
                .into_iter()
                .map(|r| match r {
                    WorkerResult::Latencies(l) => l,
                    WorkerResult::Elapsed(_) => unreachable!(),
                })
                .collect();
            let percentiles = stats::percentiles(&per_worker)
                .expect("num_exec > 0 guarantees at least one latency sample");
            Report::Latency(percentiles)
        }
    }
}

enum WorkerResult {
    Elapsed(Duration),
    Latencies(Vec<Duration>),
}
