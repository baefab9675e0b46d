//! Throughput and latency aggregation (spec.md §4.7).

use std::time::Duration;

/// A non-fatal oddity observed during measurement (spec.md §7: "Measurement
/// anomalies ... reported but not fatal").
#[derive(Debug, Clone)]
pub enum Anomaly {
    ZeroElapsedTime { worker: usize },
}

pub struct ThroughputReport {
    pub ops_per_sec: f64,
    pub anomalies: Vec<Anomaly>,
}

/// `total_ops` split across `per_worker` wall-clock durations.
pub fn throughput(total_ops: usize, per_worker: &[Duration]) -> ThroughputReport {
    let mut anomalies = Vec::new();
    let mut sum = Duration::ZERO;
    for (worker, d) in per_worker.iter().enumerate() {
        if d.as_secs_f64() == 0.0 {
            anomalies.push(Anomaly::ZeroElapsedTime { worker });
        }
        sum += *d;
    }
    let mean_secs = sum.as_secs_f64() / per_worker.len().max(1) as f64;
    let ops_per_sec = if mean_secs > 0.0 {
        total_ops as f64 / mean_secs
    } else {
        0.0
    };
    ThroughputReport {
        ops_per_sec,
        anomalies,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LatencyPercentiles {
    pub min: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

/// Computes percentiles by a *k*-way merge across already-sorted per-worker
/// latency arrays (spec.md §4.7), walking from the largest value down so
/// only the tail the percentiles actually need is visited — no full
/// `O(N log N)` sort across the merged set.
pub fn percentiles(per_worker_sorted: &[Vec<Duration>]) -> Option<LatencyPercentiles> {
    let total: usize = per_worker_sorted.iter().map(Vec::len).sum();
    if total == 0 {
        return None;
    }

    // rank-from-the-top for each percentile, clamped into [0, total)
    let rank_from_top = |p: f64| -> usize {
        let rank_from_bottom = ((p * total as f64).ceil() as usize).saturating_sub(1);
        (total - 1).saturating_sub(rank_from_bottom)
    };

    let mut targets = [
        (rank_from_top(1.00), None), // max, rank 0 from the top
        (rank_from_top(0.99), None),
        (rank_from_top(0.95), None),
        (rank_from_top(0.90), None),
        (rank_from_top(0.50), None),
        (total - 1, None), // min, the last element visited
    ];
    targets.sort_by_key(|(rank, _)| *rank);

    let mut cursors: Vec<usize> = per_worker_sorted.iter().map(|w| w.len()).collect();
    let mut visited = 0usize;
    let mut target_idx = 0usize;

    while target_idx < targets.len() {
        // advance to the largest remaining element across all workers
        let mut best_worker = None;
        let mut best_value = None;
        for (w, cursor) in cursors.iter().enumerate() {
            if *cursor == 0 {
                continue;
            }
            let candidate = per_worker_sorted[w][*cursor - 1];
            if best_value.is_none() || Some(candidate) > best_value {
                best_value = Some(candidate);
                best_worker = Some(w);
            }
        }
        let worker = best_worker.expect("ranks within bounds of total elements");
        cursors[worker] -= 1;

        while target_idx < targets.len() && targets[target_idx].0 == visited {
            targets[target_idx].1 = best_value;
            target_idx += 1;
        }
        visited += 1;
    }

    let get = |rank: usize| -> Duration {
        targets
            .iter()
            .find(|(r, _)| *r == rank)
            .and_then(|(_, v)| *v)
            .expect("rank was visited by the merge")
    };

    Some(LatencyPercentiles {
        max: get(rank_from_top(1.00)),
        p99: get(rank_from_top(0.99)),
        p95: get(rank_from_top(0.95)),
        p90: get(rank_from_top(0.90)),
        p50: get(rank_from_top(0.50)),
        min: get(total - 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_flags_zero_elapsed_worker() {
        let report = throughput(100, &[Duration::from_secs(1), Duration::ZERO]);
        assert_eq!(report.anomalies.len(), 1);
    }

    #[test]
    fn percentiles_single_worker_sorted_ascending() {
        let data: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        let result = percentiles(&[data]).unwrap();
        assert_eq!(result.min, Duration::from_millis(1));
        assert_eq!(result.max, Duration::from_millis(100));
        assert_eq!(result.p50, Duration::from_millis(50));
    }

    #[test]
    fn percentiles_merges_across_workers() {
        let a: Vec<Duration> = (1..=50).map(Duration::from_millis).collect();
        let b: Vec<Duration> = (51..=100).map(Duration::from_millis).collect();
        let result = percentiles(&[a, b]).unwrap();
        assert_eq!(result.min, Duration::from_millis(1));
        assert_eq!(result.max, Duration::from_millis(100));
    }

    #[test]
    fn percentiles_empty_input_is_none() {
        assert!(percentiles(&[]).is_none());
        assert!(percentiles(&[Vec::new()]).is_none());
    }
}
