//! Filters
//!
//! - [`LadderFilter`]: 4-pole zero-delay-feedback ladder with a tanh-limited
//!   resonance loop, lowpass or highpass output.
//! - [`OnePole`]: smoothing lowpass used in the delay feedback path and on
//!   the reverb return.

use core::f64::consts::PI;

use crate::unit::DspUnit;

/// Lowest cutoff the ladder accepts, in Hz.
pub const MIN_CUTOFF: f64 = 20.0;
/// Upper cutoff bound as a fraction of the sample rate.
pub const MAX_CUTOFF_RATIO: f64 = 0.45;

/// Output tap of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Lowpass,
    Highpass,
}

/// Voltage-Controlled Filter (VCF)
///
/// Four cascaded one-pole sections updated with the topology-preserving
/// transform:
///
/// ```text
/// u = tanh(x - k·s3)
/// for each stage: v = (u - s)·g;  y = v + s;  s = y + v;  u = y
/// ```
///
/// `g = t / (1 + t)` with `t = tan(π·fc/fs)` keeps every section stable for
/// `g` in [0, 1), and `k = 4·resonance` places self-oscillation at full
/// resonance. Highpass is derived as `x - s3`.
///
/// The lowpass state tracks the saturated input `tanh(x)`, not `x`, so the
/// highpass output settles at `x - tanh(x)` for a DC input: about 0.238 for
/// 1.0, and close to zero only for small levels.
#[derive(Debug, Clone)]
pub struct LadderFilter {
    sample_rate: f64,
    cutoff: f64,
    resonance: f64,
    mode: FilterMode,
    g: f64,
    k: f64,
    stages: [f64; 4],
}

impl LadderFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut filter = Self {
            sample_rate,
            cutoff: 1000.0,
            resonance: 0.0,
            mode: FilterMode::Lowpass,
            g: 0.0,
            k: 0.0,
            stages: [0.0; 4],
        };
        filter.update_coefficients();
        filter
    }

    /// Set cutoff in Hz, clamped to [20, 0.45·fs].
    pub fn set_cutoff(&mut self, hz: f64) {
        let max = (self.sample_rate * MAX_CUTOFF_RATIO).max(MIN_CUTOFF);
        self.cutoff = if hz.is_nan() {
            MIN_CUTOFF
        } else {
            hz.clamp(MIN_CUTOFF, max)
        };
        self.update_coefficients();
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn set_resonance(&mut self, resonance: f64) {
        self.resonance = if resonance.is_nan() {
            0.0
        } else {
            resonance.clamp(0.0, 1.0)
        };
        self.k = 4.0 * self.resonance;
    }

    pub fn resonance(&self) -> f64 {
        self.resonance
    }

    pub fn set_mode(&mut self, mode: FilterMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let feedback = self.stages[3] * self.k;
        let mut u = libm::tanh(input - feedback);

        for stage in self.stages.iter_mut() {
            let v = (u - *stage) * self.g;
            let y = v + *stage;
            *stage = y + v;
            u = y;
        }

        match self.mode {
            FilterMode::Lowpass => self.stages[3],
            // Leaves `x - tanh(x)` on DC; see the type docs
            FilterMode::Highpass => input - self.stages[3],
        }
    }

    fn update_coefficients(&mut self) {
        if self.sample_rate <= 0.0 {
            self.g = 0.0;
            return;
        }
        let fc = (self.cutoff / self.sample_rate).min(MAX_CUTOFF_RATIO);
        let t = libm::tan(PI * fc);
        self.g = t / (1.0 + t);
        self.k = 4.0 * self.resonance;
    }
}

impl Default for LadderFilter {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DspUnit for LadderFilter {
    fn reset(&mut self) {
        self.stages = [0.0; 4];
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        // Re-apply the clamp against the new Nyquist bound
        self.set_cutoff(self.cutoff);
    }

    fn type_id(&self) -> &'static str {
        "ladder_filter"
    }
}

/// One-pole lowpass: `y = y·a + x·(1 - a)` with `a = exp(-2π·fc/fs)`.
#[derive(Debug, Clone, Default)]
pub struct OnePole {
    coefficient: f64,
    state: f64,
}

impl OnePole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feedback coefficient for a cutoff at the given sample rate.
    pub fn coefficient_for(cutoff: f64, sample_rate: f64) -> f64 {
        if sample_rate <= 0.0 {
            return 0.0;
        }
        libm::exp(-2.0 * PI * cutoff.max(0.0) / sample_rate)
    }

    pub fn set_cutoff(&mut self, cutoff: f64, sample_rate: f64) {
        self.coefficient = Self::coefficient_for(cutoff, sample_rate);
    }

    pub fn set_coefficient(&mut self, coefficient: f64) {
        self.coefficient = coefficient.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        self.state = self.state * self.coefficient + input * (1.0 - self.coefficient);
        self.state
    }

    pub fn state(&self) -> f64 {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cutoff_clamped_to_range() {
        let mut filter = LadderFilter::new(48000.0);
        filter.set_cutoff(5.0);
        assert_eq!(filter.cutoff(), 20.0);
        filter.set_cutoff(40000.0);
        assert_abs_diff_eq!(filter.cutoff(), 48000.0 * 0.45, epsilon = 1e-9);
    }

    #[test]
    fn test_resonance_clamped() {
        let mut filter = LadderFilter::default();
        filter.set_resonance(2.0);
        assert_eq!(filter.resonance(), 1.0);
        filter.set_resonance(-1.0);
        assert_eq!(filter.resonance(), 0.0);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut filter = LadderFilter::new(44100.0);
        filter.set_mode(FilterMode::Highpass);
        filter.set_cutoff(1000.0);
        filter.set_resonance(0.0);

        let mut out = 1.0;
        for _ in 0..20000 {
            out = filter.process(0.01);
        }
        assert_abs_diff_eq!(out, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_highpass_dc_residue_is_drive_saturation() {
        // At full scale the tanh drive compresses what reaches the stages,
        // so the derived highpass keeps x - tanh(x).
        let mut filter = LadderFilter::new(44100.0);
        filter.set_mode(FilterMode::Highpass);
        filter.set_cutoff(1000.0);

        let mut out = 0.0;
        for _ in 0..20000 {
            out = filter.process(1.0);
        }
        assert_abs_diff_eq!(out, 1.0 - libm::tanh(1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = LadderFilter::new(44100.0);
        filter.set_cutoff(2000.0);
        let mut out = 0.0;
        for _ in 0..20000 {
            out = filter.process(0.5);
        }
        assert_abs_diff_eq!(out, libm::tanh(0.5), epsilon = 1e-6);
    }

    #[test]
    fn test_stable_at_full_resonance() {
        for &cutoff in &[20.0, 200.0, 2000.0, 19845.0] {
            let mut filter = LadderFilter::new(44100.0);
            filter.set_cutoff(cutoff);
            filter.set_resonance(1.0);

            let mut peak: f64 = 0.0;
            for i in 0..44100 {
                // Alternating full-scale square input
                let x = if (i / 50) % 2 == 0 { 1.0 } else { -1.0 };
                let y = filter.process(x);
                assert!(y.is_finite());
                peak = peak.max(y.abs());
            }
            assert!(peak < 8.0, "cutoff {} peaked at {}", cutoff, peak);
        }
    }

    #[test]
    fn test_reset_clears_stages() {
        let mut filter = LadderFilter::default();
        for _ in 0..100 {
            filter.process(1.0);
        }
        filter.reset();
        assert_eq!(filter.process(0.0), 0.0);
    }

    #[test]
    fn test_one_pole_converges() {
        let mut lp = OnePole::new();
        lp.set_cutoff(100.0, 44100.0);
        let mut y = 0.0;
        for _ in 0..44100 {
            y = lp.process(1.0);
        }
        assert_abs_diff_eq!(y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_one_pole_coefficient() {
        let a = OnePole::coefficient_for(8000.0, 44100.0);
        assert_abs_diff_eq!(a, (-2.0 * PI * 8000.0 / 44100.0).exp(), epsilon = 1e-12);
    }
}
