//! Parameters and Persistence
//!
//! Every knob, toggle and choice the voice reads is described once here by
//! a [`ParamId`] and its [`ParamInfo`] (range, default, unit, step count).
//! From that table come the public [`ParamDef`] layout, the clamped
//! [`ParamSnapshot`] the engine consumes per block, and the flat
//! [`VoiceState`] used to save and restore a patch.
//!
//! Keys are snake_case: `filter_cutoff`, `step3_pitch`, `mod2_amount`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::FilterMode;
use crate::lfo::LfoShape;
use crate::modulation::{ModDestination, ModSlot, ModSource, NUM_SLOTS};
use crate::quantizer::Scale;
use crate::sequencer::{Direction, Step, NUM_STEPS};

/// Current version of the saved state layout.
pub const STATE_VERSION: u32 = 1;

/// Tempo multipliers selectable by `tempo_multiplier`.
pub const TEMPO_MULTIPLIERS: [f64; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

/// Identifies one parameter. Step and slot indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    VcoDecay,
    SeqPitchMod,
    Vco1EgAmount,
    Vco1Freq,
    Vco1Wave,
    Vco1Level,
    SubLevel,
    NoiseLevel,
    FmAmount,
    HardSync,
    Vco2EgAmount,
    Vco2Freq,
    Vco2Wave,
    Vco2Level,
    FilterCutoff,
    FilterMode,
    FilterResonance,
    FilterDecay,
    FilterEnvAmount,
    NoiseVcfMod,
    VcaEgMode,
    VcaLevel,
    VcaDecay,
    DelayTime,
    DelayFeedback,
    DelayFilter,
    DelayMix,
    ReverbDecay,
    ReverbFilter,
    ReverbMix,
    RingModFreq,
    RingModMix,
    Tempo,
    TempoMultiplier,
    Swing,
    SeqDirection,
    HostSync,
    SeqRun,
    Glide,
    Drone,
    MidiHold,
    ScaleType,
    ScaleRoot,
    LfoRate,
    LfoWave,
    LfoSync,
    StepPitch(usize),
    StepVelocity(usize),
    StepPan(usize),
    StepWave(usize),
    StepRingMod(usize),
    StepDelayPitch(usize),
    ModSource(usize),
    ModDestination(usize),
    ModAmount(usize),
}

/// Static description of a parameter's range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamInfo {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub unit: &'static str,
    /// Number of steps (0 = continuous)
    pub steps: u32,
}

impl ParamInfo {
    fn continuous(name: &'static str, min: f64, max: f64, default: f64, unit: &'static str) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit,
            steps: 0,
        }
    }

    fn toggle(name: &'static str) -> Self {
        Self {
            name,
            min: 0.0,
            max: 1.0,
            default: 0.0,
            unit: "",
            steps: 1,
        }
    }

    fn choice(name: &'static str, count: u32, default: f64) -> Self {
        Self {
            name,
            min: 0.0,
            max: (count - 1) as f64,
            default,
            unit: "",
            steps: count - 1,
        }
    }

    /// Snap to the step grid; continuous parameters pass through.
    pub fn quantize(&self, value: f64) -> f64 {
        if self.steps == 0 {
            return value;
        }
        let step_size = (self.max - self.min) / self.steps as f64;
        let steps = libm::round((value - self.min) / step_size);
        self.min + steps * step_size
    }

    /// Clamp into range and snap to the step grid; NaN becomes the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.default;
        }
        self.quantize(value.clamp(self.min, self.max))
    }
}

const STEP_FIELDS: [&str; 6] = ["pitch", "velocity", "pan", "wave", "ring_mod", "delay_pitch"];
const SLOT_FIELDS: [&str; 3] = ["source", "destination", "amount"];

impl ParamId {
    /// Global (non-step, non-slot) parameters in layout order.
    pub const GLOBALS: [ParamId; 46] = [
        ParamId::VcoDecay,
        ParamId::SeqPitchMod,
        ParamId::Vco1EgAmount,
        ParamId::Vco1Freq,
        ParamId::Vco1Wave,
        ParamId::Vco1Level,
        ParamId::SubLevel,
        ParamId::NoiseLevel,
        ParamId::FmAmount,
        ParamId::HardSync,
        ParamId::Vco2EgAmount,
        ParamId::Vco2Freq,
        ParamId::Vco2Wave,
        ParamId::Vco2Level,
        ParamId::FilterCutoff,
        ParamId::FilterMode,
        ParamId::FilterResonance,
        ParamId::FilterDecay,
        ParamId::FilterEnvAmount,
        ParamId::NoiseVcfMod,
        ParamId::VcaEgMode,
        ParamId::VcaLevel,
        ParamId::VcaDecay,
        ParamId::DelayTime,
        ParamId::DelayFeedback,
        ParamId::DelayFilter,
        ParamId::DelayMix,
        ParamId::ReverbDecay,
        ParamId::ReverbFilter,
        ParamId::ReverbMix,
        ParamId::RingModFreq,
        ParamId::RingModMix,
        ParamId::Tempo,
        ParamId::TempoMultiplier,
        ParamId::Swing,
        ParamId::SeqDirection,
        ParamId::HostSync,
        ParamId::SeqRun,
        ParamId::Glide,
        ParamId::Drone,
        ParamId::MidiHold,
        ParamId::ScaleType,
        ParamId::ScaleRoot,
        ParamId::LfoRate,
        ParamId::LfoWave,
        ParamId::LfoSync,
    ];

    /// Every parameter in layout order: globals, then steps, then slots.
    pub fn all() -> impl Iterator<Item = ParamId> {
        let steps = (0..NUM_STEPS).flat_map(|i| {
            [
                ParamId::StepPitch(i),
                ParamId::StepVelocity(i),
                ParamId::StepPan(i),
                ParamId::StepWave(i),
                ParamId::StepRingMod(i),
                ParamId::StepDelayPitch(i),
            ]
        });
        let slots = (0..NUM_SLOTS).flat_map(|i| {
            [
                ParamId::ModSource(i),
                ParamId::ModDestination(i),
                ParamId::ModAmount(i),
            ]
        });
        Self::GLOBALS.into_iter().chain(steps).chain(slots)
    }

    /// Key of a global parameter; `None` for step and slot parameters.
    pub fn global_key(self) -> Option<&'static str> {
        let key = match self {
            ParamId::VcoDecay => "vco_decay",
            ParamId::SeqPitchMod => "seq_pitch_mod",
            ParamId::Vco1EgAmount => "vco1_eg_amount",
            ParamId::Vco1Freq => "vco1_freq",
            ParamId::Vco1Wave => "vco1_wave",
            ParamId::Vco1Level => "vco1_level",
            ParamId::SubLevel => "sub_level",
            ParamId::NoiseLevel => "noise_level",
            ParamId::FmAmount => "fm_amount",
            ParamId::HardSync => "hard_sync",
            ParamId::Vco2EgAmount => "vco2_eg_amount",
            ParamId::Vco2Freq => "vco2_freq",
            ParamId::Vco2Wave => "vco2_wave",
            ParamId::Vco2Level => "vco2_level",
            ParamId::FilterCutoff => "filter_cutoff",
            ParamId::FilterMode => "filter_mode",
            ParamId::FilterResonance => "filter_resonance",
            ParamId::FilterDecay => "filter_decay",
            ParamId::FilterEnvAmount => "filter_env_amount",
            ParamId::NoiseVcfMod => "noise_vcf_mod",
            ParamId::VcaEgMode => "vca_eg_mode",
            ParamId::VcaLevel => "vca_level",
            ParamId::VcaDecay => "vca_decay",
            ParamId::DelayTime => "delay_time",
            ParamId::DelayFeedback => "delay_feedback",
            ParamId::DelayFilter => "delay_filter",
            ParamId::DelayMix => "delay_mix",
            ParamId::ReverbDecay => "reverb_decay",
            ParamId::ReverbFilter => "reverb_filter",
            ParamId::ReverbMix => "reverb_mix",
            ParamId::RingModFreq => "ring_mod_freq",
            ParamId::RingModMix => "ring_mod_mix",
            ParamId::Tempo => "tempo",
            ParamId::TempoMultiplier => "tempo_multiplier",
            ParamId::Swing => "swing",
            ParamId::SeqDirection => "seq_direction",
            ParamId::HostSync => "host_sync",
            ParamId::SeqRun => "seq_run",
            ParamId::Glide => "glide",
            ParamId::Drone => "drone",
            ParamId::MidiHold => "midi_hold",
            ParamId::ScaleType => "scale_type",
            ParamId::ScaleRoot => "scale_root",
            ParamId::LfoRate => "lfo_rate",
            ParamId::LfoWave => "lfo_wave",
            ParamId::LfoSync => "lfo_sync",
            _ => return None,
        };
        Some(key)
    }

    /// Parameter key, e.g. `filter_cutoff` or `step3_pitch`.
    pub fn key(self) -> String {
        if let Some(key) = self.global_key() {
            return key.to_string();
        }
        match self {
            ParamId::StepPitch(i) => format!("step{}_{}", i + 1, STEP_FIELDS[0]),
            ParamId::StepVelocity(i) => format!("step{}_{}", i + 1, STEP_FIELDS[1]),
            ParamId::StepPan(i) => format!("step{}_{}", i + 1, STEP_FIELDS[2]),
            ParamId::StepWave(i) => format!("step{}_{}", i + 1, STEP_FIELDS[3]),
            ParamId::StepRingMod(i) => format!("step{}_{}", i + 1, STEP_FIELDS[4]),
            ParamId::StepDelayPitch(i) => format!("step{}_{}", i + 1, STEP_FIELDS[5]),
            ParamId::ModSource(i) => format!("mod{}_{}", i + 1, SLOT_FIELDS[0]),
            ParamId::ModDestination(i) => format!("mod{}_{}", i + 1, SLOT_FIELDS[1]),
            ParamId::ModAmount(i) => format!("mod{}_{}", i + 1, SLOT_FIELDS[2]),
            _ => String::new(),
        }
    }

    /// Parse a key produced by [`ParamId::key`].
    pub fn from_key(key: &str) -> Option<ParamId> {
        if let Some(id) = Self::GLOBALS
            .iter()
            .copied()
            .find(|id| id.global_key() == Some(key))
        {
            return Some(id);
        }

        if let Some(rest) = key.strip_prefix("step") {
            let (index, field) = split_indexed(rest, NUM_STEPS)?;
            return match field {
                "pitch" => Some(ParamId::StepPitch(index)),
                "velocity" => Some(ParamId::StepVelocity(index)),
                "pan" => Some(ParamId::StepPan(index)),
                "wave" => Some(ParamId::StepWave(index)),
                "ring_mod" => Some(ParamId::StepRingMod(index)),
                "delay_pitch" => Some(ParamId::StepDelayPitch(index)),
                _ => None,
            };
        }

        if let Some(rest) = key.strip_prefix("mod") {
            let (index, field) = split_indexed(rest, NUM_SLOTS)?;
            return match field {
                "source" => Some(ParamId::ModSource(index)),
                "destination" => Some(ParamId::ModDestination(index)),
                "amount" => Some(ParamId::ModAmount(index)),
                _ => None,
            };
        }

        None
    }

    pub fn info(self) -> ParamInfo {
        use ParamInfo as P;
        match self {
            ParamId::VcoDecay => P::continuous("VCO Decay", 10.0, 2000.0, 200.0, "ms"),
            ParamId::SeqPitchMod => P::choice("Seq Pitch Mod", 3, 0.0),
            ParamId::Vco1EgAmount => P::continuous("VCO1 EG Amount", -1.0, 1.0, 0.0, ""),
            ParamId::Vco1Freq => P::continuous("VCO1 Frequency", -24.0, 24.0, 0.0, "st"),
            ParamId::Vco1Wave => P::continuous("VCO1 Wave", 0.0, 1.0, 0.33, ""),
            ParamId::Vco1Level => P::continuous("VCO1 Level", 0.0, 1.0, 0.5, ""),
            ParamId::SubLevel => P::continuous("Sub Level", 0.0, 1.0, 0.5, ""),
            ParamId::NoiseLevel => P::continuous("Noise Level", 0.0, 1.0, 0.0, ""),
            ParamId::FmAmount => P::continuous("FM Amount", 0.0, 1.0, 0.0, ""),
            ParamId::HardSync => P::toggle("Hard Sync"),
            ParamId::Vco2EgAmount => P::continuous("VCO2 EG Amount", -1.0, 1.0, 0.0, ""),
            ParamId::Vco2Freq => P::continuous("VCO2 Frequency", -24.0, 24.0, 0.0, "st"),
            ParamId::Vco2Wave => P::continuous("VCO2 Wave", 0.0, 1.0, 0.33, ""),
            ParamId::Vco2Level => P::continuous("VCO2 Level", 0.0, 1.0, 0.5, ""),
            ParamId::FilterCutoff => P::continuous("Cutoff", 20.0, 20000.0, 1000.0, "Hz"),
            ParamId::FilterMode => P::toggle("Highpass"),
            ParamId::FilterResonance => P::continuous("Resonance", 0.0, 1.0, 0.2, ""),
            ParamId::FilterDecay => P::continuous("VCF Decay", 10.0, 2000.0, 200.0, "ms"),
            ParamId::FilterEnvAmount => P::continuous("VCF EG Amount", -1.0, 1.0, 0.5, ""),
            ParamId::NoiseVcfMod => P::continuous("Noise/VCF Mod", -1.0, 1.0, 0.0, ""),
            ParamId::VcaEgMode => P::toggle("VCA EG Slow"),
            ParamId::VcaLevel => P::continuous("Volume", 0.0, 1.0, 0.8, ""),
            ParamId::VcaDecay => P::continuous("VCA Decay", 10.0, 2000.0, 200.0, "ms"),
            ParamId::DelayTime => P::continuous("Delay Time", 0.0, 2.0, 0.0, "s"),
            ParamId::DelayFeedback => P::continuous("Delay Feedback", 0.0, 0.95, 0.3, ""),
            ParamId::DelayFilter => P::continuous("Delay Filter", 200.0, 20000.0, 8000.0, "Hz"),
            ParamId::DelayMix => P::continuous("Delay Mix", 0.0, 1.0, 0.0, ""),
            ParamId::ReverbDecay => P::continuous("Reverb Decay", 0.0, 1.0, 0.5, ""),
            ParamId::ReverbFilter => P::continuous("Reverb Filter", 200.0, 20000.0, 8000.0, "Hz"),
            ParamId::ReverbMix => P::continuous("Reverb Mix", 0.0, 1.0, 0.0, ""),
            ParamId::RingModFreq => P::continuous("Ring Mod Freq", 1.0, 5000.0, 440.0, "Hz"),
            ParamId::RingModMix => P::continuous("Ring Mod Mix", 0.0, 1.0, 0.0, ""),
            ParamId::Tempo => P::continuous("Tempo", 30.0, 300.0, 120.0, "BPM"),
            ParamId::TempoMultiplier => P::choice("Tempo Multiplier", 5, 2.0),
            ParamId::Swing => P::continuous("Swing", 0.0, 1.0, 0.5, ""),
            ParamId::SeqDirection => P::choice("Direction", 3, 0.0),
            ParamId::HostSync => P::toggle("Host Sync"),
            ParamId::SeqRun => P::toggle("Run"),
            ParamId::Glide => P::continuous("Glide", 0.0, 1.0, 0.0, ""),
            ParamId::Drone => P::toggle("Drone"),
            ParamId::MidiHold => P::toggle("MIDI Hold"),
            ParamId::ScaleType => P::choice("Scale", 13, 0.0),
            ParamId::ScaleRoot => P::choice("Root", 12, 0.0),
            ParamId::LfoRate => P::continuous("LFO Rate", 0.1, 20.0, 1.0, "Hz"),
            ParamId::LfoWave => P::choice("LFO Wave", 6, 0.0),
            ParamId::LfoSync => P::toggle("LFO Sync"),
            ParamId::StepPitch(_) => P::continuous("Pitch", -24.0, 24.0, 0.0, "st"),
            ParamId::StepVelocity(_) => P::continuous("Velocity", 0.0, 1.0, 0.8, ""),
            ParamId::StepPan(_) => P::continuous("Pan", -1.0, 1.0, 0.0, ""),
            ParamId::StepWave(_) => P::continuous("Wave", 0.0, 1.0, 0.33, ""),
            ParamId::StepRingMod(_) => P::continuous("Ring Mod", 0.0, 1.0, 0.5, ""),
            ParamId::StepDelayPitch(_) => P::continuous("Delay Pitch", -24.0, 48.0, 0.0, "st"),
            ParamId::ModSource(_) => P::choice("Source", ModSource::ALL.len() as u32, 0.0),
            ParamId::ModDestination(_) => {
                P::choice("Destination", ModDestination::ALL.len() as u32, 0.0)
            }
            ParamId::ModAmount(_) => P::continuous("Amount", -1.0, 1.0, 0.0, ""),
        }
    }

    /// Display name, including the step or slot number.
    pub fn display_name(self) -> String {
        let name = self.info().name;
        match self {
            ParamId::StepPitch(i)
            | ParamId::StepVelocity(i)
            | ParamId::StepPan(i)
            | ParamId::StepWave(i)
            | ParamId::StepRingMod(i)
            | ParamId::StepDelayPitch(i) => format!("Step {} {}", i + 1, name),
            ParamId::ModSource(i) | ParamId::ModDestination(i) | ParamId::ModAmount(i) => {
                format!("Mod {} {}", i + 1, name)
            }
            _ => name.to_string(),
        }
    }
}

/// Split `"3_pitch"` into `(2, "pitch")`, checking the 1-based index.
fn split_indexed(rest: &str, count: usize) -> Option<(usize, &str)> {
    let (number, field) = rest.split_once('_')?;
    let n: usize = number.parse().ok()?;
    if n == 0 || n > count {
        return None;
    }
    Some((n - 1, field))
}

/// Parameter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub id: ParamId,
    /// Stable snake_case key used in saved state
    pub key: String,
    /// Display name
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Unit label (e.g., "Hz", "ms", "st")
    pub unit: String,
    /// Number of steps (0 = continuous)
    pub steps: u32,
}

impl ParamDef {
    pub fn new(id: ParamId) -> Self {
        let info = id.info();
        Self {
            id,
            key: id.key(),
            name: id.display_name(),
            min: info.min,
            max: info.max,
            default: info.default,
            unit: info.unit.to_string(),
            steps: info.steps,
        }
    }

    /// Normalize a value to 0.0-1.0 range
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }

    /// Denormalize from 0.0-1.0 to parameter range
    pub fn denormalize(&self, normalized: f64) -> f64 {
        self.min + normalized * (self.max - self.min)
    }

    /// Range description this definition was built from.
    pub fn info(&self) -> ParamInfo {
        self.id.info()
    }

    /// Quantize to steps (if discrete)
    pub fn quantize(&self, value: f64) -> f64 {
        self.info().quantize(value)
    }

    /// Clamp to range, then quantize. NaN becomes the default.
    pub fn clamp(&self, value: f64) -> f64 {
        self.info().clamp(value)
    }
}

/// The full parameter layout, in a stable order.
pub fn param_layout() -> Vec<ParamDef> {
    ParamId::all().map(ParamDef::new).collect()
}

/// Which oscillators follow the sequencer pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PitchRouting {
    #[default]
    Both,
    Off,
    Vco2,
}

impl PitchRouting {
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => PitchRouting::Off,
            2 => PitchRouting::Vco2,
            _ => PitchRouting::Both,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Typed, clamped view of every parameter, taken once per block.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSnapshot {
    /// Pitch envelope decay, ms
    pub vco_decay: f64,
    pub pitch_routing: PitchRouting,
    pub vco1_eg_amount: f64,
    /// Semitones relative to C2
    pub vco1_freq: f64,
    pub vco1_wave: f64,
    pub vco1_level: f64,
    pub sub_level: f64,
    pub noise_level: f64,
    pub fm_amount: f64,
    pub hard_sync: bool,
    pub vco2_eg_amount: f64,
    pub vco2_freq: f64,
    pub vco2_wave: f64,
    pub vco2_level: f64,

    pub filter_cutoff: f64,
    pub filter_mode: FilterMode,
    pub filter_resonance: f64,
    pub filter_decay: f64,
    pub filter_env_amount: f64,
    pub noise_vcf_mod: f64,

    /// Stretches the VCA decay by 4x
    pub vca_slow: bool,
    pub vca_level: f64,
    pub vca_decay: f64,

    /// Seconds added to the tuned delay period
    pub delay_time: f64,
    pub delay_feedback: f64,
    pub delay_filter: f64,
    pub delay_mix: f64,

    pub reverb_decay: f64,
    pub reverb_filter: f64,
    pub reverb_mix: f64,

    pub ring_mod_freq: f64,
    pub ring_mod_mix: f64,

    pub tempo: f64,
    /// Index into [`TEMPO_MULTIPLIERS`]
    pub tempo_multiplier: usize,
    pub swing: f64,
    pub direction: Direction,
    pub host_sync: bool,
    pub running: bool,
    pub glide: f64,
    pub drone: bool,
    pub midi_hold: bool,

    pub scale: Scale,
    pub scale_root: i32,

    pub lfo_rate: f64,
    pub lfo_shape: LfoShape,
    pub lfo_sync: bool,

    pub steps: [Step; NUM_STEPS],
    pub mod_slots: [ModSlot; NUM_SLOTS],
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        let mut snapshot = Self {
            vco_decay: 0.0,
            pitch_routing: PitchRouting::Both,
            vco1_eg_amount: 0.0,
            vco1_freq: 0.0,
            vco1_wave: 0.0,
            vco1_level: 0.0,
            sub_level: 0.0,
            noise_level: 0.0,
            fm_amount: 0.0,
            hard_sync: false,
            vco2_eg_amount: 0.0,
            vco2_freq: 0.0,
            vco2_wave: 0.0,
            vco2_level: 0.0,
            filter_cutoff: 0.0,
            filter_mode: FilterMode::Lowpass,
            filter_resonance: 0.0,
            filter_decay: 0.0,
            filter_env_amount: 0.0,
            noise_vcf_mod: 0.0,
            vca_slow: false,
            vca_level: 0.0,
            vca_decay: 0.0,
            delay_time: 0.0,
            delay_feedback: 0.0,
            delay_filter: 0.0,
            delay_mix: 0.0,
            reverb_decay: 0.0,
            reverb_filter: 0.0,
            reverb_mix: 0.0,
            ring_mod_freq: 0.0,
            ring_mod_mix: 0.0,
            tempo: 0.0,
            tempo_multiplier: 0,
            swing: 0.0,
            direction: Direction::Forward,
            host_sync: false,
            running: false,
            glide: 0.0,
            drone: false,
            midi_hold: false,
            scale: Scale::Off,
            scale_root: 0,
            lfo_rate: 0.0,
            lfo_shape: LfoShape::Sine,
            lfo_sync: false,
            steps: [Step::default(); NUM_STEPS],
            mod_slots: [ModSlot::default(); NUM_SLOTS],
        };
        for id in ParamId::all() {
            snapshot.set(id, id.info().default);
        }
        snapshot
    }
}

#[inline]
fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

impl ParamSnapshot {
    /// Store a raw value, clamped and snapped to the parameter's range.
    pub fn set(&mut self, id: ParamId, value: f64) {
        let v = id.info().clamp(value);
        let on = v >= 0.5;
        let code = v as i64;
        match id {
            ParamId::VcoDecay => self.vco_decay = v,
            ParamId::SeqPitchMod => self.pitch_routing = PitchRouting::from_index(code),
            ParamId::Vco1EgAmount => self.vco1_eg_amount = v,
            ParamId::Vco1Freq => self.vco1_freq = v,
            ParamId::Vco1Wave => self.vco1_wave = v,
            ParamId::Vco1Level => self.vco1_level = v,
            ParamId::SubLevel => self.sub_level = v,
            ParamId::NoiseLevel => self.noise_level = v,
            ParamId::FmAmount => self.fm_amount = v,
            ParamId::HardSync => self.hard_sync = on,
            ParamId::Vco2EgAmount => self.vco2_eg_amount = v,
            ParamId::Vco2Freq => self.vco2_freq = v,
            ParamId::Vco2Wave => self.vco2_wave = v,
            ParamId::Vco2Level => self.vco2_level = v,
            ParamId::FilterCutoff => self.filter_cutoff = v,
            ParamId::FilterMode => {
                self.filter_mode = if on {
                    FilterMode::Highpass
                } else {
                    FilterMode::Lowpass
                }
            }
            ParamId::FilterResonance => self.filter_resonance = v,
            ParamId::FilterDecay => self.filter_decay = v,
            ParamId::FilterEnvAmount => self.filter_env_amount = v,
            ParamId::NoiseVcfMod => self.noise_vcf_mod = v,
            ParamId::VcaEgMode => self.vca_slow = on,
            ParamId::VcaLevel => self.vca_level = v,
            ParamId::VcaDecay => self.vca_decay = v,
            ParamId::DelayTime => self.delay_time = v,
            ParamId::DelayFeedback => self.delay_feedback = v,
            ParamId::DelayFilter => self.delay_filter = v,
            ParamId::DelayMix => self.delay_mix = v,
            ParamId::ReverbDecay => self.reverb_decay = v,
            ParamId::ReverbFilter => self.reverb_filter = v,
            ParamId::ReverbMix => self.reverb_mix = v,
            ParamId::RingModFreq => self.ring_mod_freq = v,
            ParamId::RingModMix => self.ring_mod_mix = v,
            ParamId::Tempo => self.tempo = v,
            ParamId::TempoMultiplier => self.tempo_multiplier = code as usize,
            ParamId::Swing => self.swing = v,
            ParamId::SeqDirection => self.direction = Direction::from_index(code),
            ParamId::HostSync => self.host_sync = on,
            ParamId::SeqRun => self.running = on,
            ParamId::Glide => self.glide = v,
            ParamId::Drone => self.drone = on,
            ParamId::MidiHold => self.midi_hold = on,
            ParamId::ScaleType => self.scale = Scale::from_index(code),
            ParamId::ScaleRoot => self.scale_root = code as i32,
            ParamId::LfoRate => self.lfo_rate = v,
            ParamId::LfoWave => self.lfo_shape = LfoShape::from_index(code),
            ParamId::LfoSync => self.lfo_sync = on,
            ParamId::StepPitch(i) => {
                if let Some(step) = self.steps.get_mut(i) {
                    step.pitch = v;
                }
            }
            ParamId::StepVelocity(i) => {
                if let Some(step) = self.steps.get_mut(i) {
                    step.velocity = v;
                }
            }
            ParamId::StepPan(i) => {
                if let Some(step) = self.steps.get_mut(i) {
                    step.pan = v;
                }
            }
            ParamId::StepWave(i) => {
                if let Some(step) = self.steps.get_mut(i) {
                    step.wave = v;
                }
            }
            ParamId::StepRingMod(i) => {
                if let Some(step) = self.steps.get_mut(i) {
                    step.ring_mod = v;
                }
            }
            ParamId::StepDelayPitch(i) => {
                if let Some(step) = self.steps.get_mut(i) {
                    step.delay_pitch = v;
                }
            }
            ParamId::ModSource(i) => {
                if let Some(slot) = self.mod_slots.get_mut(i) {
                    slot.source = ModSource::from_index(code);
                }
            }
            ParamId::ModDestination(i) => {
                if let Some(slot) = self.mod_slots.get_mut(i) {
                    slot.destination = ModDestination::from_index(code);
                }
            }
            ParamId::ModAmount(i) => {
                if let Some(slot) = self.mod_slots.get_mut(i) {
                    slot.amount = v;
                }
            }
        }
    }

    /// Raw value of a parameter, as stored in saved state.
    pub fn get(&self, id: ParamId) -> f64 {
        match id {
            ParamId::VcoDecay => self.vco_decay,
            ParamId::SeqPitchMod => self.pitch_routing.index() as f64,
            ParamId::Vco1EgAmount => self.vco1_eg_amount,
            ParamId::Vco1Freq => self.vco1_freq,
            ParamId::Vco1Wave => self.vco1_wave,
            ParamId::Vco1Level => self.vco1_level,
            ParamId::SubLevel => self.sub_level,
            ParamId::NoiseLevel => self.noise_level,
            ParamId::FmAmount => self.fm_amount,
            ParamId::HardSync => flag(self.hard_sync),
            ParamId::Vco2EgAmount => self.vco2_eg_amount,
            ParamId::Vco2Freq => self.vco2_freq,
            ParamId::Vco2Wave => self.vco2_wave,
            ParamId::Vco2Level => self.vco2_level,
            ParamId::FilterCutoff => self.filter_cutoff,
            ParamId::FilterMode => flag(self.filter_mode == FilterMode::Highpass),
            ParamId::FilterResonance => self.filter_resonance,
            ParamId::FilterDecay => self.filter_decay,
            ParamId::FilterEnvAmount => self.filter_env_amount,
            ParamId::NoiseVcfMod => self.noise_vcf_mod,
            ParamId::VcaEgMode => flag(self.vca_slow),
            ParamId::VcaLevel => self.vca_level,
            ParamId::VcaDecay => self.vca_decay,
            ParamId::DelayTime => self.delay_time,
            ParamId::DelayFeedback => self.delay_feedback,
            ParamId::DelayFilter => self.delay_filter,
            ParamId::DelayMix => self.delay_mix,
            ParamId::ReverbDecay => self.reverb_decay,
            ParamId::ReverbFilter => self.reverb_filter,
            ParamId::ReverbMix => self.reverb_mix,
            ParamId::RingModFreq => self.ring_mod_freq,
            ParamId::RingModMix => self.ring_mod_mix,
            ParamId::Tempo => self.tempo,
            ParamId::TempoMultiplier => self.tempo_multiplier as f64,
            ParamId::Swing => self.swing,
            ParamId::SeqDirection => self.direction.index() as f64,
            ParamId::HostSync => flag(self.host_sync),
            ParamId::SeqRun => flag(self.running),
            ParamId::Glide => self.glide,
            ParamId::Drone => flag(self.drone),
            ParamId::MidiHold => flag(self.midi_hold),
            ParamId::ScaleType => self.scale.index() as f64,
            ParamId::ScaleRoot => self.scale_root as f64,
            ParamId::LfoRate => self.lfo_rate,
            ParamId::LfoWave => self.lfo_shape.index() as f64,
            ParamId::LfoSync => flag(self.lfo_sync),
            ParamId::StepPitch(i) => self.steps.get(i).map_or(0.0, |s| s.pitch),
            ParamId::StepVelocity(i) => self.steps.get(i).map_or(0.0, |s| s.velocity),
            ParamId::StepPan(i) => self.steps.get(i).map_or(0.0, |s| s.pan),
            ParamId::StepWave(i) => self.steps.get(i).map_or(0.0, |s| s.wave),
            ParamId::StepRingMod(i) => self.steps.get(i).map_or(0.0, |s| s.ring_mod),
            ParamId::StepDelayPitch(i) => self.steps.get(i).map_or(0.0, |s| s.delay_pitch),
            ParamId::ModSource(i) => self
                .mod_slots
                .get(i)
                .map_or(0.0, |s| s.source.index() as f64),
            ParamId::ModDestination(i) => self
                .mod_slots
                .get(i)
                .map_or(0.0, |s| s.destination.index() as f64),
            ParamId::ModAmount(i) => self.mod_slots.get(i).map_or(0.0, |s| s.amount),
        }
    }

    /// Selected tempo multiplier (0.25x..4x).
    pub fn tempo_multiplier(&self) -> f64 {
        TEMPO_MULTIPLIERS
            .get(self.tempo_multiplier)
            .copied()
            .unwrap_or(1.0)
    }

    /// Flatten into the saved-state form.
    pub fn to_state(&self) -> VoiceState {
        let mut state = VoiceState::new();
        for id in ParamId::all() {
            state.parameters.insert(id.key(), self.get(id));
        }
        state
    }

    /// Rebuild from saved state.
    ///
    /// Unknown keys are skipped, missing keys keep their defaults and values
    /// are clamped into range. Non-finite values are rejected.
    pub fn from_state(state: &VoiceState) -> Result<Self, StateError> {
        if state.version == 0 || state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion(state.version));
        }

        let mut snapshot = Self::default();
        let mut restored = 0usize;
        for (key, &value) in &state.parameters {
            let Some(id) = ParamId::from_key(key) else {
                log::warn!("ignoring unknown parameter '{}'", key);
                continue;
            };
            if !value.is_finite() {
                return Err(StateError::InvalidValue {
                    key: key.clone(),
                    value,
                });
            }
            snapshot.set(id, value);
            restored += 1;
        }
        log::debug!("restored {} parameters", restored);
        Ok(snapshot)
    }
}

/// Flat key→value form of the full parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceState {
    /// Schema version for forward compatibility
    pub version: u32,
    pub parameters: BTreeMap<String, f64>,
}

impl VoiceState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            parameters: BTreeMap::new(),
        }
    }

    /// Serialize to JSON string
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, StateError> {
        serde_json::to_string_pretty(self).map_err(|e| StateError::Parse(e.to_string()))
    }

    /// Deserialize from JSON string
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let state: Self =
            serde_json::from_str(json).map_err(|e| StateError::Parse(e.to_string()))?;
        if state.version == 0 || state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }
}

impl Default for VoiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised while restoring saved state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateError {
    Parse(String),
    InvalidValue { key: String, value: f64 },
    UnsupportedVersion(u32),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Parse(msg) => write!(f, "Malformed state: {}", msg),
            StateError::InvalidValue { key, value } => {
                write!(f, "Invalid value {} for parameter '{}'", value, key)
            }
            StateError::UnsupportedVersion(v) => write!(f, "Unsupported state version {}", v),
        }
    }
}

impl std::error::Error for StateError {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::collections::HashSet;

    #[test]
    fn test_layout_keys_unique_and_parseable() {
        let layout = param_layout();
        assert_eq!(layout.len(), 46 + NUM_STEPS * 6 + NUM_SLOTS * 3);

        let keys: HashSet<&str> = layout.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys.len(), layout.len());

        for def in &layout {
            assert_eq!(ParamId::from_key(&def.key), Some(def.id), "{}", def.key);
            assert!(def.min < def.max);
            assert!((def.min..=def.max).contains(&def.default), "{}", def.key);
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(ParamId::FilterCutoff.key(), "filter_cutoff");
        assert_eq!(ParamId::StepPitch(2).key(), "step3_pitch");
        assert_eq!(ParamId::StepDelayPitch(7).key(), "step8_delay_pitch");
        assert_eq!(ParamId::ModAmount(0).key(), "mod1_amount");
        assert_eq!(ParamId::StepRingMod(0).display_name(), "Step 1 Ring Mod");

        assert_eq!(ParamId::from_key("step0_pitch"), None);
        assert_eq!(ParamId::from_key("step9_pitch"), None);
        assert_eq!(ParamId::from_key("mod5_source"), None);
        assert_eq!(ParamId::from_key("step1_color"), None);
        assert_eq!(ParamId::from_key("cutoff"), None);
    }

    #[test]
    fn test_param_def_scaling() {
        let def = ParamDef::new(ParamId::FilterCutoff);
        assert_abs_diff_eq!(def.normalize(20.0), 0.0);
        assert_abs_diff_eq!(def.normalize(20000.0), 1.0);
        assert_abs_diff_eq!(def.denormalize(0.5), 10010.0);
        assert_eq!(def.quantize(1234.5), 1234.5);
        assert_eq!(def.clamp(50000.0), 20000.0);
        assert_eq!(def.unit, "Hz");

        let choice = ParamDef::new(ParamId::ScaleType);
        assert_eq!(choice.steps, 12);
        assert_eq!(choice.quantize(3.4), 3.0);
        assert_eq!(choice.clamp(99.0), 12.0);
        assert_eq!(choice.clamp(f64::NAN), 0.0);
    }

    #[test]
    fn test_def_and_info_clamp_agree() {
        for def in param_layout() {
            let info = def.id.info();
            assert_eq!(def.info(), info);
            for value in [-1e9, -3.3, 0.0, 0.49, 0.51, 2.5, 1e9, f64::NAN] {
                let from_def = def.clamp(value);
                let from_info = info.clamp(value);
                assert_eq!(from_def.to_bits(), from_info.to_bits(), "{} at {}", def.key, value);
                assert_eq!(def.quantize(from_def), from_def);
            }
        }
    }

    #[test]
    fn test_snapshot_defaults() {
        let snap = ParamSnapshot::default();
        assert_eq!(snap.tempo, 120.0);
        assert_eq!(snap.tempo_multiplier(), 1.0);
        assert_eq!(snap.swing, 0.5);
        assert_eq!(snap.filter_cutoff, 1000.0);
        assert_eq!(snap.vca_level, 0.8);
        assert_eq!(snap.pitch_routing, PitchRouting::Both);
        assert_eq!(snap.direction, Direction::Forward);
        assert!(!snap.running);
        assert_eq!(snap.steps[4], Step::default());
        assert!(snap.mod_slots.iter().all(|s| !s.is_active()));
    }

    #[test]
    fn test_snapshot_set_clamps_and_decodes() {
        let mut snap = ParamSnapshot::default();
        snap.set(ParamId::Tempo, 1000.0);
        assert_eq!(snap.tempo, 300.0);
        snap.set(ParamId::TempoMultiplier, 4.0);
        assert_eq!(snap.tempo_multiplier(), 4.0);
        snap.set(ParamId::SeqDirection, 2.2);
        assert_eq!(snap.direction, Direction::PingPong);
        snap.set(ParamId::FilterMode, 1.0);
        assert_eq!(snap.filter_mode, FilterMode::Highpass);
        snap.set(ParamId::StepDelayPitch(3), 60.0);
        assert_eq!(snap.steps[3].delay_pitch, 48.0);
        snap.set(ParamId::ModDestination(1), 4.0);
        assert_eq!(snap.mod_slots[1].destination, ModDestination::Vco2Pitch);
        snap.set(ParamId::ModAmount(1), -3.0);
        assert_eq!(snap.mod_slots[1].amount, -1.0);
        snap.set(ParamId::SeqPitchMod, 1.0);
        assert_eq!(snap.pitch_routing, PitchRouting::Off);
    }

    #[test]
    fn test_state_round_trip() {
        let mut snap = ParamSnapshot::default();
        snap.set(ParamId::ScaleType, 5.0);
        snap.set(ParamId::StepPitch(6), -7.0);
        snap.set(ParamId::ModSource(3), 6.0);
        snap.set(ParamId::Drone, 1.0);

        let state = snap.to_state();
        assert_eq!(state.parameters.len(), param_layout().len());
        assert_eq!(state.parameters["step7_pitch"], -7.0);

        let restored = ParamSnapshot::from_state(&state);
        assert_eq!(restored, Ok(snap));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_state_json_round_trip() {
        let mut snap = ParamSnapshot::default();
        snap.set(ParamId::DelayMix, 0.4);
        snap.set(ParamId::LfoWave, 5.0);

        let json = snap.to_state().to_json().unwrap();
        assert!(json.contains("\"delay_mix\""));
        let state = VoiceState::from_json(&json).unwrap();
        assert_eq!(ParamSnapshot::from_state(&state).unwrap(), snap);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            VoiceState::from_json("{ not json"),
            Err(StateError::Parse(_))
        ));
        assert_eq!(
            VoiceState::from_json(r#"{"version": 9, "parameters": {}}"#),
            Err(StateError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_restore_is_lenient_on_keys_and_ranges() {
        let mut state = VoiceState::new();
        state.parameters.insert("legacy_knob".into(), 3.0);
        state.parameters.insert("filter_cutoff".into(), 99999.0);
        state.parameters.insert("swing".into(), -1.0);

        let snap = ParamSnapshot::from_state(&state).unwrap();
        assert_eq!(snap.filter_cutoff, 20000.0);
        assert_eq!(snap.swing, 0.0);
        // Missing keys keep defaults
        assert_eq!(snap.tempo, 120.0);
    }

    #[test]
    fn test_restore_rejects_non_finite() {
        let mut state = VoiceState::new();
        state.parameters.insert("glide".into(), f64::INFINITY);
        assert_eq!(
            ParamSnapshot::from_state(&state),
            Err(StateError::InvalidValue {
                key: "glide".into(),
                value: f64::INFINITY
            })
        );

        let state = VoiceState {
            version: 0,
            parameters: BTreeMap::new(),
        };
        assert_eq!(
            ParamSnapshot::from_state(&state),
            Err(StateError::UnsupportedVersion(0))
        );
    }

    #[test]
    fn test_error_display() {
        let err = StateError::InvalidValue {
            key: "tempo".into(),
            value: f64::NAN,
        };
        assert_eq!(err.to_string(), "Invalid value NaN for parameter 'tempo'");
    }
}
