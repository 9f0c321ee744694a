//! Morphing Oscillator
//!
//! A naive (band-unlimited) phase-accumulating oscillator whose single
//! waveform control sweeps continuously through four shapes:
//!
//! ```text
//! 0.00 ── sine ──── 0.33 ── triangle ── 0.66 ── square ── 1.00 ── chaos
//! ```
//!
//! Each segment is a linear crossfade between its two endpoint shapes. The
//! "chaos" endpoint is a sawtooth enriched with seven partials and folded
//! through a sine stage and a tanh stage, giving a dense, aggressive tone.
//!
//! All transcendental functions go through `libm` so that the timbre is
//! identical on every target.

use core::f64::consts::TAU;

use crate::unit::DspUnit;

/// Morph position of the pure triangle shape.
pub const TRIANGLE_POSITION: f64 = 0.33;
/// Morph position of the pure square shape.
pub const SQUARE_POSITION: f64 = 0.66;

/// Voltage-Controlled Oscillator (VCO)
///
/// Produces one sample per `process*` call and then advances its phase.
/// The `process*` variants differ only in how the phase increment is scaled
/// for that sample. [`Oscillator::has_completed_cycle`] reports whether the
/// most recent call wrapped the phase, which drives hard sync of a slave
/// oscillator.
#[derive(Debug, Clone)]
pub struct Oscillator {
    sample_rate: f64,
    frequency: f64,
    phase: f64,
    phase_increment: f64,
    waveform_position: f64,
    completed_cycle: bool,
}

impl Oscillator {
    pub fn new(sample_rate: f64) -> Self {
        let mut osc = Self {
            sample_rate,
            frequency: 440.0,
            phase: 0.0,
            phase_increment: 0.0,
            waveform_position: 0.0,
            completed_cycle: false,
        };
        osc.update_increment();
        osc
    }

    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency = hz;
        self.update_increment();
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Set the morph position, clamped to [0, 1].
    pub fn set_waveform_position(&mut self, position: f64) {
        self.waveform_position = position.clamp(0.0, 1.0);
    }

    pub fn waveform_position(&self) -> f64 {
        self.waveform_position
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Render one sample at the nominal frequency.
    pub fn process(&mut self) -> f64 {
        self.render(self.phase_increment)
    }

    /// Render one sample with linear frequency modulation.
    ///
    /// The increment is scaled by `1 + fm_input * fm_amount * 4`, which may
    /// be negative; the phase wraps in both directions.
    pub fn process_fm(&mut self, fm_input: f64, fm_amount: f64) -> f64 {
        self.render(self.phase_increment * (1.0 + fm_input * fm_amount * 4.0))
    }

    /// Render one sample transposed by `semitones`.
    pub fn process_with_pitch_mod(&mut self, semitones: f64) -> f64 {
        self.render(self.phase_increment * libm::pow(2.0, semitones / 12.0))
    }

    /// Force the phase back to the start of the cycle (hard sync).
    pub fn sync(&mut self) {
        self.phase = 0.0;
    }

    /// True iff the phase wrapped during the most recent `process*` call.
    pub fn has_completed_cycle(&self) -> bool {
        self.completed_cycle
    }

    fn render(&mut self, increment: f64) -> f64 {
        self.completed_cycle = false;
        let output = morph(self.phase, self.waveform_position);

        self.phase += increment;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.completed_cycle = true;
        }
        while self.phase < 0.0 {
            self.phase += 1.0;
        }

        output
    }

    fn update_increment(&mut self) {
        self.phase_increment = if self.sample_rate > 0.0 && self.frequency.is_finite() {
            self.frequency / self.sample_rate
        } else {
            0.0
        };
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DspUnit for Oscillator {
    fn reset(&mut self) {
        self.phase = 0.0;
        self.completed_cycle = false;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_increment();
    }

    fn type_id(&self) -> &'static str {
        "oscillator"
    }
}

/// Evaluate the four-way morph at `phase` in [0, 1).
pub fn morph(phase: f64, position: f64) -> f64 {
    let pos = position.clamp(0.0, 1.0);

    if pos <= TRIANGLE_POSITION {
        let blend = pos / TRIANGLE_POSITION;
        sine(phase) * (1.0 - blend) + triangle(phase) * blend
    } else if pos <= SQUARE_POSITION {
        let blend = (pos - TRIANGLE_POSITION) / (SQUARE_POSITION - TRIANGLE_POSITION);
        triangle(phase) * (1.0 - blend) + square(phase) * blend
    } else {
        let blend = (pos - SQUARE_POSITION) / (1.0 - SQUARE_POSITION);
        square(phase) * (1.0 - blend) + chaos(phase) * blend
    }
}

#[inline]
pub fn sine(phase: f64) -> f64 {
    libm::sin(phase * TAU)
}

#[inline]
pub fn triangle(phase: f64) -> f64 {
    if phase < 0.5 {
        4.0 * phase - 1.0
    } else {
        3.0 - 4.0 * phase
    }
}

#[inline]
pub fn square(phase: f64) -> f64 {
    if phase < 0.5 {
        1.0
    } else {
        -1.0
    }
}

/// Partial number and amplitude added on top of the sawtooth.
const CHAOS_PARTIALS: [(f64, f64); 7] = [
    (2.0, 0.7),
    (3.0, 0.6),
    (4.0, 0.5),
    (5.0, 0.45),
    (7.0, 0.35),
    (9.0, 0.25),
    (11.0, 0.2),
];

/// Folded, harmonically dense waveform at the top of the morph range.
pub fn chaos(phase: f64) -> f64 {
    let theta = phase * TAU;

    let mut x = 1.0 - 2.0 * phase;
    for &(k, amp) in CHAOS_PARTIALS.iter() {
        x += libm::sin(theta * k) * amp;
    }

    // Two folding stages
    x = libm::sin(x * 2.5);
    x = libm::tanh(x * 3.0);

    // Knee
    if x > 0.8 {
        x = 0.8 + (x - 0.8) * 0.3;
    }
    if x < -0.8 {
        x = -0.8 + (x + 0.8) * 0.3;
    }

    x.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_output_bounded_across_morph_range() {
        for p in 0..=100 {
            let position = p as f64 / 100.0;
            let mut osc = Oscillator::new(48000.0);
            osc.set_frequency(331.0);
            osc.set_waveform_position(position);
            for _ in 0..2000 {
                let s = osc.process();
                assert!((-1.0..=1.0).contains(&s), "pos {} gave {}", position, s);
            }
        }
    }

    #[test]
    fn test_morph_endpoints() {
        // Quarter phase: sine peaks, triangle sits at 0
        assert_relative_eq!(morph(0.25, 0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(morph(0.25, TRIANGLE_POSITION), 0.0, epsilon = 1e-12);
        assert_relative_eq!(morph(0.25, SQUARE_POSITION), 1.0, epsilon = 1e-12);
        assert_relative_eq!(morph(0.25, 1.0), chaos(0.25), epsilon = 1e-12);
    }

    #[test]
    fn test_morph_segment_blend_is_linear() {
        let pos = TRIANGLE_POSITION * 0.5;
        let expected = 0.5 * sine(0.1) + 0.5 * triangle(0.1);
        assert_relative_eq!(morph(0.1, pos), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_phase_wrap_sets_completed_cycle() {
        let mut osc = Oscillator::new(100.0);
        osc.set_frequency(25.0); // increment 0.25

        let mut wraps = 0;
        for _ in 0..8 {
            osc.process();
            if osc.has_completed_cycle() {
                wraps += 1;
            }
        }
        assert_eq!(wraps, 2);
    }

    #[test]
    fn test_negative_fm_wraps_backwards() {
        let mut osc = Oscillator::new(100.0);
        osc.set_frequency(10.0);
        // 1 + (-1)(1)(4) = -3 → increment -0.3
        osc.process_fm(-1.0, 1.0);
        assert_relative_eq!(osc.phase(), 0.7, epsilon = 1e-12);
        assert!(!osc.has_completed_cycle());
    }

    #[test]
    fn test_pitch_mod_octave_doubles_increment() {
        let mut a = Oscillator::new(1000.0);
        let mut b = Oscillator::new(1000.0);
        a.set_frequency(10.0);
        b.set_frequency(20.0);
        for _ in 0..37 {
            a.process_with_pitch_mod(12.0);
            b.process();
        }
        assert_relative_eq!(a.phase(), b.phase(), epsilon = 1e-9);
    }

    #[test]
    fn test_sync_resets_phase() {
        let mut osc = Oscillator::new(1000.0);
        osc.set_frequency(100.0);
        osc.process();
        osc.process();
        assert!(osc.phase() > 0.0);
        osc.sync();
        assert_eq!(osc.phase(), 0.0);
    }

    #[test]
    fn test_zero_sample_rate_is_silent_dc() {
        let mut osc = Oscillator::new(0.0);
        osc.set_frequency(440.0);
        let first = osc.process();
        for _ in 0..10 {
            assert_eq!(osc.process(), first);
        }
    }

    #[test]
    fn test_waveform_position_clamped() {
        let mut osc = Oscillator::default();
        osc.set_waveform_position(3.0);
        assert_eq!(osc.waveform_position(), 1.0);
        osc.set_waveform_position(-1.0);
        assert_eq!(osc.waveform_position(), 0.0);
    }
}
