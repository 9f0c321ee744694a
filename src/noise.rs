//! White noise source

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::unit::DspUnit;

/// Uniform white noise in [-1, 1].
///
/// The generator is reseeded from entropy every time the voice is prepared,
/// so two instances never share a sequence. Use [`NoiseGenerator::with_seed`]
/// for reproducible output.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    rng: StdRng,
    seed: Option<u64>,
}

impl NoiseGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Deterministic generator; [`DspUnit::reset`] rewinds it to the start.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    #[inline]
    pub fn process(&mut self) -> f64 {
        self.rng.gen_range(-1.0..=1.0)
    }
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DspUnit for NoiseGenerator {
    fn reset(&mut self) {
        self.rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
    }

    fn set_sample_rate(&mut self, _: f64) {}

    fn type_id(&self) -> &'static str {
        "noise"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_and_mean() {
        let mut noise = NoiseGenerator::with_seed(7);
        let n = 100_000;
        let mut sum = 0.0;
        for _ in 0..n {
            let s = noise.process();
            assert!((-1.0..=1.0).contains(&s));
            sum += s;
        }
        assert!((sum / n as f64).abs() < 0.02);
    }

    #[test]
    fn test_roughly_uniform() {
        let mut noise = NoiseGenerator::with_seed(99);
        let mut buckets = [0usize; 4];
        let n = 40_000;
        for _ in 0..n {
            let s = noise.process();
            let idx = (((s + 1.0) / 2.0) * 4.0).min(3.0) as usize;
            buckets[idx] += 1;
        }
        for count in buckets {
            assert!((9_000..11_000).contains(&count), "bucket {}", count);
        }
    }

    #[test]
    fn test_seeded_reset_replays_sequence() {
        let mut noise = NoiseGenerator::with_seed(1234);
        let first: Vec<f64> = (0..16).map(|_| noise.process()).collect();
        noise.reset();
        let again: Vec<f64> = (0..16).map(|_| noise.process()).collect();
        assert_eq!(first, again);
    }
}
