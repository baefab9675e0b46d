//! Concrete field-index generators satisfying the workload-generator
//! interface of spec.md §6 (`(&mut rng) -> usize`). The core crate never
//! names this trait — queues and the descriptor engine only ever see
//! `usize` addresses chosen by the driver.

use rand::rngs::SmallRng;
use rand::Rng;

/// Chooses a target field index in `[0, num_field)` for one operation.
pub trait FieldSelector: Send {
    fn next(&mut self, rng: &mut SmallRng) -> usize;
}

/// Uniform selection — `skew_parameter == 0.0` (spec.md §6).
pub struct Uniform {
    num_field: usize,
}

impl Uniform {
    pub fn new(num_field: usize) -> Self {
        assert!(num_field > 0);
        Self { num_field }
    }
}

impl FieldSelector for Uniform {
    fn next(&mut self, rng: &mut SmallRng) -> usize {
        rng.gen_range(0, self.num_field)
    }
}

/// Zipf-skewed selection over `[0, num_field)`. Precomputes the cumulative
/// distribution once so sampling is a binary search, not a per-call
/// normalization pass.
pub struct Zipf {
    cumulative: Vec<f64>,
}

impl Zipf {
    pub fn new(num_field: usize, skew: f64) -> Self {
        assert!(num_field > 0);
        assert!(skew >= 0.0);
        let mut weights: Vec<f64> = (1..=num_field)
            .map(|rank| 1.0 / (rank as f64).powf(skew))
            .collect();
        let total: f64 = weights.iter().sum();
        let mut running = 0.0;
        for w in weights.iter_mut() {
            running += *w / total;
            *w = running;
        }
        Self { cumulative: weights }
    }
}

impl FieldSelector for Zipf {
    fn next(&mut self, rng: &mut SmallRng) -> usize {
        let x: f64 = rng.gen();
        match self
            .cumulative
            .binary_search_by(|probe| probe.partial_cmp(&x).unwrap())
        {
            Ok(idx) => idx,
            Err(idx) => idx.min(self.cumulative.len() - 1),
        }
    }
}

/// Build the configured selector: `skew_parameter == 0.0` is plain uniform,
/// matching spec.md §6's "skew_parameter (>= 0): Zipf skew for target
/// selection".
pub fn selector(num_field: usize, skew_parameter: f64) -> Box<dyn FieldSelector> {
    if skew_parameter <= 0.0 {
        Box::new(Uniform::new(num_field))
    } else {
        Box::new(Zipf::new(num_field, skew_parameter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut sel = Uniform::new(10);
        for _ in 0..1_000 {
            assert!(sel.next(&mut rng) < 10);
        }
    }

    #[test]
    fn zipf_stays_in_range_and_favors_low_ranks() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut sel = Zipf::new(100, 1.2);
        let mut hist = vec![0u64; 100];
        for _ in 0..20_000 {
            let idx = sel.next(&mut rng);
            assert!(idx < 100);
            hist[idx] += 1;
        }
        assert!(hist[0] > hist[99]);
    }
}
