//! Per-sample effects: tuned delay, ring modulator and panning

use core::f64::consts::{FRAC_PI_4, TAU};

use crate::filter::OnePole;
use crate::unit::DspUnit;

/// Reference pitch (C2) the tuned delay is measured from.
pub const KARPLUS_BASE_HZ: f64 = 65.41;

/// Longest delay the buffer is sized for, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 2.0;

/// Circular delay buffer.
///
/// `read(d)` returns the sample written `d` writes ago, so `read(0)` is the
/// slot about to be overwritten.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(2)],
            write_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Reallocate for a new capacity. Not real-time safe.
    pub fn resize(&mut self, capacity: usize) {
        self.buffer = vec![0.0; capacity.max(2)];
        self.write_pos = 0;
    }

    /// Delay in samples, clamped to `[1, len - 1]`.
    #[inline]
    pub fn clamp_delay(&self, delay: i64) -> usize {
        delay.clamp(1, self.len() as i64 - 1) as usize
    }

    #[inline]
    pub fn read(&self, delay: usize) -> f64 {
        let size = self.len();
        let delay = delay.min(size - 1);
        self.buffer[(self.write_pos + size - delay) % size]
    }

    #[inline]
    pub fn write(&mut self, sample: f64) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.len();
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Karplus-Strong-tuned feedback delay.
///
/// The delay length is the period of a pitch relative to C2, plus a free
/// time offset:
///
/// ```text
/// seconds = 1 / (65.41 · 2^(semitones/12)) + offset
/// ```
///
/// The feedback path runs through a one-pole lowpass; the wet signal mixed
/// back into the output is the unfiltered read.
#[derive(Debug, Clone)]
pub struct TunedDelay {
    sample_rate: f64,
    line: DelayLine,
    damping: OnePole,
}

impl TunedDelay {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            line: DelayLine::new(Self::capacity_for(sample_rate)),
            damping: OnePole::new(),
        }
    }

    fn capacity_for(sample_rate: f64) -> usize {
        (sample_rate.max(0.0) * MAX_DELAY_SECONDS) as usize
    }

    /// Delay in seconds for a pitch offset from C2.
    pub fn period_for(semitones: f64) -> f64 {
        1.0 / (KARPLUS_BASE_HZ * libm::pow(2.0, semitones / 12.0))
    }

    /// Delay in samples after clamping to the buffer.
    pub fn delay_samples(&self, semitones: f64, offset_seconds: f64) -> usize {
        let seconds = Self::period_for(semitones) + offset_seconds.max(0.0);
        let samples = seconds * self.sample_rate;
        let samples = if samples.is_finite() { samples as i64 } else { 1 };
        self.line.clamp_delay(samples)
    }

    /// Set the feedback lowpass coefficient, usually from [`OnePole::coefficient_for`].
    pub fn set_damping_coefficient(&mut self, coefficient: f64) {
        self.damping.set_coefficient(coefficient);
    }

    pub fn capacity(&self) -> usize {
        self.line.len()
    }

    pub fn process(
        &mut self,
        input: f64,
        semitones: f64,
        offset_seconds: f64,
        feedback: f64,
        mix: f64,
    ) -> f64 {
        let delay = self.delay_samples(semitones, offset_seconds);
        let delayed = self.line.read(delay);

        let filtered = self.damping.process(delayed);
        self.line.write(input + filtered * feedback);

        input + delayed * mix
    }
}

impl Default for TunedDelay {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DspUnit for TunedDelay {
    fn reset(&mut self) {
        self.line.clear();
        self.damping.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.line.resize(Self::capacity_for(sample_rate));
    }

    fn type_id(&self) -> &'static str {
        "tuned_delay"
    }
}

/// Sine-carrier ring modulator with dry/wet crossfade.
#[derive(Debug, Clone)]
pub struct RingModulator {
    sample_rate: f64,
    phase: f64,
}

impl RingModulator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            phase: 0.0,
        }
    }

    /// Carrier frequency scaling from a step value (0..1 → 0.25x..4x)
    /// and a bipolar octave offset (±2 octaves at full scale).
    pub fn frequency_ratio(step_amount: f64, octave_mod: f64) -> f64 {
        (0.25 + step_amount.clamp(0.0, 1.0) * 3.75) * libm::pow(2.0, octave_mod * 2.0)
    }

    /// With `mix <= 0` the input passes through and the carrier is not advanced.
    pub fn process(&mut self, input: f64, frequency: f64, mix: f64) -> f64 {
        if mix <= 0.0 {
            return input;
        }

        let carrier = libm::sin(self.phase * TAU);
        if self.sample_rate > 0.0 {
            self.phase += frequency / self.sample_rate;
        }
        if self.phase >= 1.0 {
            self.phase -= libm::floor(self.phase);
        }

        let mix = mix.min(1.0);
        input * (1.0 - mix) + input * carrier * mix
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl Default for RingModulator {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DspUnit for RingModulator {
    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn type_id(&self) -> &'static str {
        "ring_modulator"
    }
}

/// Equal-power pan law. Returns `(left, right)` gains for pan in [-1, 1].
#[inline]
pub fn equal_power_pan(pan: f64) -> (f64, f64) {
    let pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) };
    let angle = (pan + 1.0) * FRAC_PI_4;
    (libm::cos(angle), libm::sin(angle))
}
