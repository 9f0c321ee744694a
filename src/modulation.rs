//! Modulation Matrix
//!
//! Four independent slots, each routing one bipolar source through a signed
//! amount into one destination. Contributions to the same destination sum.
//!
//! ```text
//! source value (-1..1) × amount (-1..1) × destination scale → accumulator
//! ```
//!
//! Sources and destinations are closed enums. Evaluation goes through
//! [`ModSource::value`], accumulation through the [`ROUTES`] table, so the
//! integer codes used for persistence only matter at the decoding boundary.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::unit::DspUnit;

pub const NUM_SLOTS: usize = 4;

/// Modulation sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModSource {
    #[default]
    Off,
    Lfo,
    PitchEnv,
    FilterEnv,
    VcaEnv,
    Velocity,
    Random,
}

impl ModSource {
    pub const ALL: [ModSource; 7] = [
        ModSource::Off,
        ModSource::Lfo,
        ModSource::PitchEnv,
        ModSource::FilterEnv,
        ModSource::VcaEnv,
        ModSource::Velocity,
        ModSource::Random,
    ];

    /// Decode an integer-coded choice; unknown codes are treated as Off.
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_default()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Bipolar value of this source. Unipolar sources are remapped via `2v - 1`.
    #[inline]
    pub fn value(self, sources: &ModSourceValues) -> f64 {
        match self {
            ModSource::Off => 0.0,
            ModSource::Lfo => sources.lfo,
            ModSource::PitchEnv => unipolar_to_bipolar(sources.pitch_env),
            ModSource::FilterEnv => unipolar_to_bipolar(sources.filter_env),
            ModSource::VcaEnv => unipolar_to_bipolar(sources.vca_env),
            ModSource::Velocity => unipolar_to_bipolar(sources.velocity),
            ModSource::Random => sources.random,
        }
    }
}

#[inline]
fn unipolar_to_bipolar(value: f64) -> f64 {
    value * 2.0 - 1.0
}

/// Modulation destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModDestination {
    #[default]
    Off,
    FilterCutoff,
    FilterResonance,
    Vco1Pitch,
    Vco2Pitch,
    RingModFreq,
    Pan,
    Vco1Level,
    Vco2Level,
    VcaDecay,
    NoiseVcf,
    FilterEnvAmount,
    FmAmount,
}

impl ModDestination {
    pub const ALL: [ModDestination; 13] = [
        ModDestination::Off,
        ModDestination::FilterCutoff,
        ModDestination::FilterResonance,
        ModDestination::Vco1Pitch,
        ModDestination::Vco2Pitch,
        ModDestination::RingModFreq,
        ModDestination::Pan,
        ModDestination::Vco1Level,
        ModDestination::Vco2Level,
        ModDestination::VcaDecay,
        ModDestination::NoiseVcf,
        ModDestination::FilterEnvAmount,
        ModDestination::FmAmount,
    ];

    /// Decode an integer-coded choice; unknown codes are treated as Off.
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_default()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Accumulation route, or `None` for Off.
    pub fn route(self) -> Option<&'static Route> {
        match self {
            ModDestination::Off => None,
            dest => ROUTES.get(dest.index() - 1),
        }
    }
}

/// How a destination accumulates one slot's contribution.
pub struct Route {
    pub destination: ModDestination,
    /// Units per full-scale slot output (semitones, level, ...)
    pub scale: f64,
    accumulate: fn(&mut ModOutputs, f64),
}

impl Route {
    #[inline]
    pub fn apply(&self, outputs: &mut ModOutputs, contribution: f64) {
        (self.accumulate)(outputs, contribution * self.scale);
    }
}

/// Dispatch table, ordered like [`ModDestination::ALL`] without Off.
pub static ROUTES: [Route; 12] = [
    Route {
        destination: ModDestination::FilterCutoff,
        scale: 1.0,
        accumulate: |o, v| o.filter_cutoff += v,
    },
    Route {
        destination: ModDestination::FilterResonance,
        scale: 1.0,
        accumulate: |o, v| o.filter_resonance += v,
    },
    Route {
        destination: ModDestination::Vco1Pitch,
        scale: 12.0,
        accumulate: |o, v| o.vco1_pitch += v,
    },
    Route {
        destination: ModDestination::Vco2Pitch,
        scale: 12.0,
        accumulate: |o, v| o.vco2_pitch += v,
    },
    Route {
        destination: ModDestination::RingModFreq,
        scale: 1.0,
        accumulate: |o, v| o.ring_mod_freq += v,
    },
    Route {
        destination: ModDestination::Pan,
        scale: 1.0,
        accumulate: |o, v| o.pan += v,
    },
    Route {
        destination: ModDestination::Vco1Level,
        scale: 0.5,
        accumulate: |o, v| o.vco1_level += v,
    },
    Route {
        destination: ModDestination::Vco2Level,
        scale: 0.5,
        accumulate: |o, v| o.vco2_level += v,
    },
    Route {
        destination: ModDestination::VcaDecay,
        scale: 1.0,
        accumulate: |o, v| o.vca_decay += v,
    },
    Route {
        destination: ModDestination::NoiseVcf,
        scale: 1.0,
        accumulate: |o, v| o.noise_vcf += v,
    },
    Route {
        destination: ModDestination::FilterEnvAmount,
        scale: 1.0,
        accumulate: |o, v| o.filter_env_amount += v,
    },
    Route {
        destination: ModDestination::FmAmount,
        scale: 0.5,
        accumulate: |o, v| o.fm_amount += v,
    },
];

/// Per-sample source readings fed to the matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModSourceValues {
    /// Bipolar LFO output
    pub lfo: f64,
    /// Envelope levels, 0..1
    pub pitch_env: f64,
    pub filter_env: f64,
    pub vca_env: f64,
    /// Current step velocity, 0..1
    pub velocity: f64,
    /// Held random value, -1..1
    pub random: f64,
}

/// Summed destination values for one sample.
///
/// Pitch fields are in semitones, level and FM fields are direct offsets;
/// the remaining fields are raw sums the engine scales at the point of use.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModOutputs {
    pub filter_cutoff: f64,
    pub filter_resonance: f64,
    pub vco1_pitch: f64,
    pub vco2_pitch: f64,
    pub ring_mod_freq: f64,
    pub pan: f64,
    pub vco1_level: f64,
    pub vco2_level: f64,
    pub vca_decay: f64,
    pub noise_vcf: f64,
    pub filter_env_amount: f64,
    pub fm_amount: f64,
}

impl ModOutputs {
    pub fn get(&self, destination: ModDestination) -> f64 {
        match destination {
            ModDestination::Off => 0.0,
            ModDestination::FilterCutoff => self.filter_cutoff,
            ModDestination::FilterResonance => self.filter_resonance,
            ModDestination::Vco1Pitch => self.vco1_pitch,
            ModDestination::Vco2Pitch => self.vco2_pitch,
            ModDestination::RingModFreq => self.ring_mod_freq,
            ModDestination::Pan => self.pan,
            ModDestination::Vco1Level => self.vco1_level,
            ModDestination::Vco2Level => self.vco2_level,
            ModDestination::VcaDecay => self.vca_decay,
            ModDestination::NoiseVcf => self.noise_vcf,
            ModDestination::FilterEnvAmount => self.filter_env_amount,
            ModDestination::FmAmount => self.fm_amount,
        }
    }
}

/// One routing slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModSlot {
    pub source: ModSource,
    pub destination: ModDestination,
    /// Signed depth, -1..1
    pub amount: f64,
}

impl ModSlot {
    pub fn new(source: ModSource, destination: ModDestination, amount: f64) -> Self {
        Self {
            source,
            destination,
            amount: if amount.is_nan() {
                0.0
            } else {
                amount.clamp(-1.0, 1.0)
            },
        }
    }

    pub fn is_active(&self) -> bool {
        self.source != ModSource::Off && self.destination != ModDestination::Off
    }
}

/// Modulation Matrix
#[derive(Debug, Clone, Default)]
pub struct ModMatrix {
    slots: [ModSlot; NUM_SLOTS],
}

impl ModMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_slot(&mut self, index: usize, slot: ModSlot) {
        if let Some(s) = self.slots.get_mut(index) {
            *s = ModSlot::new(slot.source, slot.destination, slot.amount);
        }
    }

    pub fn set_slots(&mut self, slots: &[ModSlot; NUM_SLOTS]) {
        for (index, slot) in slots.iter().enumerate() {
            self.set_slot(index, *slot);
        }
    }

    pub fn slots(&self) -> &[ModSlot; NUM_SLOTS] {
        &self.slots
    }

    /// True if an active slot reads `source`.
    pub fn uses_source(&self, source: ModSource) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_active() && slot.source == source)
    }

    /// Evaluate every active slot and sum into fresh accumulators.
    pub fn evaluate(&self, sources: &ModSourceValues) -> ModOutputs {
        let mut outputs = ModOutputs::default();
        for slot in self.slots.iter().filter(|s| s.is_active()) {
            if let Some(route) = slot.destination.route() {
                route.apply(&mut outputs, slot.source.value(sources) * slot.amount);
            }
        }
        outputs
    }
}

/// Update rate of the random source, in Hz (approximate).
pub const RANDOM_RATE: f64 = 50.0;

/// Slowly stepping random source.
///
/// Draws a new bipolar value once its sample counter passes `fs / 50`, so
/// the value changes at roughly 50 Hz regardless of sample rate.
#[derive(Debug, Clone)]
pub struct RandomSource {
    sample_rate: f64,
    interval: u64,
    counter: u64,
    value: f64,
    rng: StdRng,
}

impl RandomSource {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_rng(sample_rate, StdRng::from_entropy())
    }

    pub fn with_seed(sample_rate: f64, seed: u64) -> Self {
        Self::with_rng(sample_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(sample_rate: f64, rng: StdRng) -> Self {
        let mut source = Self {
            sample_rate,
            interval: 0,
            counter: 0,
            value: 0.0,
            rng,
        };
        source.update_interval();
        source
    }

    /// Advance one sample and return the held value.
    pub fn tick(&mut self) -> f64 {
        self.counter += 1;
        if self.counter > self.interval {
            self.value = self.rng.gen_range(-1.0..=1.0);
            self.counter = 0;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    fn update_interval(&mut self) {
        self.interval = if self.sample_rate > 0.0 {
            (self.sample_rate / RANDOM_RATE) as u64
        } else {
            0
        };
    }
}

impl DspUnit for RandomSource {
    fn reset(&mut self) {
        self.counter = 0;
        self.value = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_interval();
    }

    fn type_id(&self) -> &'static str {
        "random_source"
    }
}
