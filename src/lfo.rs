//! Low-Frequency Oscillator (LFO)
//!
//! Bipolar modulation source with six shapes. The sample-and-hold shape
//! draws a fresh random level each time the phase wraps and holds it for the
//! whole cycle; the held level lives on the instance.

use core::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::unit::DspUnit;

pub const MIN_RATE: f64 = 0.1;
pub const MAX_RATE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LfoShape {
    #[default]
    Sine,
    Triangle,
    Square,
    SawUp,
    SawDown,
    SampleAndHold,
}

impl LfoShape {
    pub const ALL: [LfoShape; 6] = [
        LfoShape::Sine,
        LfoShape::Triangle,
        LfoShape::Square,
        LfoShape::SawUp,
        LfoShape::SawDown,
        LfoShape::SampleAndHold,
    ];

    /// Decode an integer-coded choice; unknown codes fall back to sine.
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_default()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Low-Frequency Oscillator
#[derive(Debug, Clone)]
pub struct Lfo {
    sample_rate: f64,
    shape: LfoShape,
    phase: f64,
    increment: f64,
    last_phase: f64,
    held: f64,
    rng: StdRng,
}

impl Lfo {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_rng(sample_rate, StdRng::from_entropy())
    }

    pub fn with_seed(sample_rate: f64, seed: u64) -> Self {
        Self::with_rng(sample_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(sample_rate: f64, rng: StdRng) -> Self {
        let mut lfo = Self {
            sample_rate,
            shape: LfoShape::Sine,
            phase: 0.0,
            increment: 0.0,
            last_phase: 0.0,
            held: 0.0,
            rng,
        };
        lfo.set_rate(1.0);
        lfo
    }

    pub fn set_shape(&mut self, shape: LfoShape) {
        self.shape = shape;
    }

    /// Free-running rate in Hz, clamped to [0.1, 20].
    pub fn set_rate(&mut self, hz: f64) {
        let hz = if hz.is_nan() { 1.0 } else { hz.clamp(MIN_RATE, MAX_RATE) };
        self.increment = if self.sample_rate > 0.0 {
            hz / self.sample_rate
        } else {
            0.0
        };
    }

    /// Tempo-locked rate: `cycles_per_beat` cycles for every beat at `bpm`.
    pub fn set_synced_rate(&mut self, cycles_per_beat: f64, bpm: f64) {
        let cycles = if cycles_per_beat.is_nan() {
            1.0
        } else {
            cycles_per_beat.clamp(MIN_RATE, MAX_RATE)
        };
        self.increment = if self.sample_rate > 0.0 && bpm.is_finite() {
            cycles * (bpm.max(0.0) / 60.0) / self.sample_rate
        } else {
            0.0
        };
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Return the value at the current phase, then advance.
    pub fn process(&mut self) -> f64 {
        let value = self.value();
        self.last_phase = self.phase;
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }

    fn value(&mut self) -> f64 {
        let p = self.phase;
        match self.shape {
            LfoShape::Sine => libm::sin(p * TAU),
            LfoShape::Triangle => {
                if p < 0.25 {
                    p * 4.0
                } else if p < 0.75 {
                    1.0 - (p - 0.25) * 4.0
                } else {
                    -1.0 + (p - 0.75) * 4.0
                }
            }
            LfoShape::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoShape::SawUp => p * 2.0 - 1.0,
            LfoShape::SawDown => 1.0 - p * 2.0,
            LfoShape::SampleAndHold => {
                if p < self.last_phase {
                    self.held = self.rng.gen_range(-1.0..=1.0);
                }
                self.held
            }
        }
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DspUnit for Lfo {
    fn reset(&mut self) {
        self.phase = 0.0;
        self.last_phase = 0.0;
        self.held = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        let hz = self.increment * self.sample_rate;
        self.sample_rate = sample_rate;
        self.set_rate(hz);
    }

    fn type_id(&self) -> &'static str {
        "lfo"
    }
}
