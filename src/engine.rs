//! Voice Engine
//!
//! Owns every DSP unit of the voice and renders blocks. Per block the engine
//! takes a [`ParamSnapshot`] and a [`BlockContext`] (host transport, MIDI
//! note, manual buttons), configures the units once, then runs the per-sample
//! chain:
//!
//! ```text
//! Sequencer ─→ EGs ─→ LFO/Random ─→ ModMatrix
//!                                      │
//!   Glide ─→ VCO2 ─┬─(sync, FM)─→ VCO1 ┤
//!                  └──────────── Sub ──┤
//!                              Noise ──┴─→ Mix ─→ Ladder ─→ VCA
//!                                                             │
//!          Pan ←── Ring Mod ←── Tuned Delay ←─────────────────┘
//! ```
//!
//! and finally blends the reverb send over the whole block.

use std::sync::Arc;

use crate::envelope::Envelope;
use crate::filter::{LadderFilter, OnePole};
use crate::fx::{equal_power_pan, RingModulator, TunedDelay};
use crate::io::Telemetry;
use crate::lfo::Lfo;
use crate::modulation::{ModMatrix, ModSource, ModSourceValues, RandomSource};
use crate::noise::NoiseGenerator;
use crate::oscillator::{Oscillator, SQUARE_POSITION, TRIANGLE_POSITION};
use crate::params::{ParamSnapshot, PitchRouting};
use crate::quantizer::quantize;
use crate::reverb::{Freeverb, ReverbSend, ReverbSettings, StereoReverb, DEFAULT_MAX_BLOCK};
use crate::sequencer::{Sequencer, NUM_STEPS};
use crate::slew::{Glide, Smoother};
use crate::unit::{prepare_all, DspUnit};

/// Frequency of the oscillators at 0 semitones (C2).
pub const BASE_FREQUENCY: f64 = 65.41;

/// Semitones of pitch-envelope sweep at full EG amount.
pub const PITCH_EG_RANGE: f64 = 24.0;

/// Semitones of VCO1 deviation for a full-scale VCO2 sample at full FM.
pub const FM_RANGE: f64 = 24.0;

/// Octaves of cutoff sweep at full filter-envelope amount.
pub const FILTER_EG_RANGE: f64 = 10.0;

/// Octaves of cutoff sweep per unit of matrix cutoff modulation.
pub const MOD_CUTOFF_RANGE: f64 = 5.0;

/// Depth of the per-step wave offset: ±0.25 around the knob.
const STEP_WAVE_DEPTH: f64 = 0.5;

/// Inverse time constant of the drone-mode wave smoother, 1/s.
const DRONE_WAVE_RATE: f64 = 5.0;

const MIN_CUTOFF: f64 = 20.0;
const MAX_CUTOFF: f64 = 20000.0;

/// Play state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HostTransport {
    /// Host tempo, when it reports one
    pub bpm: Option<f64>,
    pub playing: bool,
}

/// Per-block inputs that do not come from the parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlockContext {
    /// Host transport; only consulted when host sync is on
    pub host: Option<HostTransport>,
    /// MIDI note offset in semitones from C2
    pub note_pitch: f64,
    pub note_held: bool,
    pub manual_trigger: bool,
    pub manual_advance: bool,
}

/// Monophonic voice: oscillators, filter, VCA, sequencer, modulation and
/// effects.
pub struct VoiceEngine<R: StereoReverb = Freeverb> {
    sample_rate: f64,
    max_block: usize,

    vco1: Oscillator,
    vco2: Oscillator,
    sub: Oscillator,
    noise: NoiseGenerator,
    filter: LadderFilter,

    pitch_env: Envelope,
    filter_env: Envelope,
    vca_env: Envelope,

    sequencer: Sequencer,
    matrix: ModMatrix,
    lfo: Lfo,
    random: RandomSource,

    glide: Glide,
    wave1: Smoother,
    wave2: Smoother,

    delay: TunedDelay,
    ring: RingModulator,
    reverb: ReverbSend<R>,

    telemetry: Arc<Telemetry>,
}

impl VoiceEngine<Freeverb> {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_reverb(Freeverb::new(sample_rate), sample_rate)
    }

    /// Engine with reproducible noise, LFO sample-and-hold and random source.
    pub fn with_seed(sample_rate: f64, seed: u64) -> Self {
        let mut engine = Self::new(sample_rate);
        engine.noise = NoiseGenerator::with_seed(seed);
        engine.lfo = Lfo::with_seed(sample_rate, seed.wrapping_add(1));
        engine.random = RandomSource::with_seed(sample_rate, seed.wrapping_add(2));
        engine
    }
}

impl Default for VoiceEngine<Freeverb> {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl<R: StereoReverb> VoiceEngine<R> {
    pub fn with_reverb(reverb: R, sample_rate: f64) -> Self {
        let mut engine = Self {
            sample_rate,
            max_block: DEFAULT_MAX_BLOCK,
            vco1: Oscillator::new(sample_rate),
            vco2: Oscillator::new(sample_rate),
            sub: Oscillator::new(sample_rate),
            noise: NoiseGenerator::new(),
            filter: LadderFilter::new(sample_rate),
            pitch_env: Envelope::new(sample_rate),
            filter_env: Envelope::new(sample_rate),
            vca_env: Envelope::new(sample_rate),
            sequencer: Sequencer::new(sample_rate),
            matrix: ModMatrix::new(),
            lfo: Lfo::new(sample_rate),
            random: RandomSource::new(sample_rate),
            glide: Glide::new(),
            wave1: Smoother::new(TRIANGLE_POSITION, DRONE_WAVE_RATE, sample_rate),
            wave2: Smoother::new(TRIANGLE_POSITION, DRONE_WAVE_RATE, sample_rate),
            delay: TunedDelay::new(sample_rate),
            ring: RingModulator::new(sample_rate),
            reverb: ReverbSend::new(reverb, sample_rate),
            telemetry: Arc::new(Telemetry::new()),
        };
        engine.sub.set_waveform_position(SQUARE_POSITION);
        engine
    }

    /// Re-clock every unit and clear all state. Allocates the delay and
    /// reverb buffers; never call concurrently with `process_block`.
    pub fn prepare(&mut self, sample_rate: f64, max_block: usize) {
        self.sample_rate = sample_rate;
        self.max_block = max_block.max(1);

        prepare_all(&mut self.units(), sample_rate);
        self.reverb.prepare(sample_rate, self.max_block);

        self.wave1.set_rate(DRONE_WAVE_RATE, sample_rate);
        self.wave2.set_rate(DRONE_WAVE_RATE, sample_rate);
        self.reset_transient();

        log::debug!(
            "voice prepared at {} Hz, max block {} samples",
            sample_rate,
            self.max_block
        );
    }

    /// Clear all running state, keeping the sample rate.
    pub fn reset(&mut self) {
        for unit in self.units().iter_mut() {
            unit.reset();
        }
        self.reverb.reset();
        self.reset_transient();
    }

    fn reset_transient(&mut self) {
        self.glide.reset();
        self.wave1.set(TRIANGLE_POSITION);
        self.wave2.set(TRIANGLE_POSITION);
    }

    fn units(&mut self) -> [&mut dyn DspUnit; 13] {
        [
            &mut self.vco1,
            &mut self.vco2,
            &mut self.sub,
            &mut self.noise,
            &mut self.filter,
            &mut self.pitch_env,
            &mut self.filter_env,
            &mut self.vca_env,
            &mut self.sequencer,
            &mut self.lfo,
            &mut self.random,
            &mut self.delay,
            &mut self.ring,
        ]
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Shared handle the UI can poll for step and transport state.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn reverb(&self) -> &ReverbSend<R> {
        &self.reverb
    }

    /// Render one block into `left` (and `right` when stereo), overwriting
    /// their contents. When the channels differ in length only the common
    /// prefix is rendered and the rest is zeroed. Real-time safe: no
    /// allocation, locking or logging.
    pub fn process_block(
        &mut self,
        params: &ParamSnapshot,
        ctx: &BlockContext,
        left: &mut [f64],
        right: Option<&mut [f64]>,
    ) {
        let frames = right
            .as_deref()
            .map_or(left.len(), |r| r.len().min(left.len()));
        // Samples past the shorter channel are silenced, never left stale
        let (left, left_tail) = left.split_at_mut(frames);
        left_tail.fill(0.0);
        let mut right = right.map(|r| {
            let (head, tail) = r.split_at_mut(frames);
            tail.fill(0.0);
            head
        });

        self.configure(params, ctx);

        let sr = self.sample_rate;
        let drone = params.drone;
        let uses_random = self.matrix.uses_source(ModSource::Random);

        for i in 0..frames {
            // 1. clock and triggers
            let mut triggered = self.sequencer.process();
            if i == 0 && ctx.manual_advance {
                self.sequencer.advance_step();
                triggered = true;
            }
            if i == 0 && ctx.manual_trigger {
                triggered = true;
            }
            if triggered && !drone {
                let velocity = self.sequencer.current_velocity();
                self.pitch_env.trigger(velocity);
                self.filter_env.trigger(velocity);
                self.vca_env.trigger(velocity);
            }

            // 2. envelopes and LFO
            let pitch_env = self.pitch_env.process();
            let filter_env = self.filter_env.process();
            let vca_env = self.vca_env.process();
            let lfo = self.lfo.process();
            let random = if uses_random {
                self.random.tick()
            } else {
                self.random.value()
            };

            // 3. matrix
            let m = self.matrix.evaluate(&ModSourceValues {
                lfo,
                pitch_env,
                filter_env,
                vca_env,
                velocity: self.sequencer.current_velocity(),
                random,
            });

            // 4-5. pitch with glide
            let seq_pitch = if params.pitch_routing != PitchRouting::Off {
                self.glide.set_target(self.sequencer.current_pitch());
                self.glide.process(params.glide, drone, sr)
            } else {
                0.0
            };
            let mut vco1_pitch = pitch_env * params.vco1_eg_amount * PITCH_EG_RANGE + m.vco1_pitch;
            let mut vco2_pitch = pitch_env * params.vco2_eg_amount * PITCH_EG_RANGE + m.vco2_pitch;
            match params.pitch_routing {
                PitchRouting::Both => {
                    vco1_pitch += seq_pitch;
                    vco2_pitch += seq_pitch;
                }
                PitchRouting::Vco2 => vco2_pitch += seq_pitch,
                PitchRouting::Off => {}
            }

            // 6. wave morph
            let wave_offset = (self.sequencer.current_wave() - 0.5) * STEP_WAVE_DEPTH;
            let wave1 = (params.vco1_wave + wave_offset).clamp(0.0, 1.0);
            let wave2 = (params.vco2_wave + wave_offset).clamp(0.0, 1.0);
            if drone {
                self.vco1.set_waveform_position(self.wave1.process(wave1));
                self.vco2.set_waveform_position(self.wave2.process(wave2));
            } else {
                self.wave1.set(wave1);
                self.wave2.set(wave2);
                self.vco1.set_waveform_position(wave1);
                self.vco2.set_waveform_position(wave2);
            }

            // 7. oscillators
            let vco2 = self.vco2.process_with_pitch_mod(vco2_pitch);
            if params.hard_sync && self.vco2.has_completed_cycle() {
                self.vco1.sync();
            }
            let fm = (params.fm_amount + m.fm_amount).clamp(0.0, 1.0);
            let vco1 = self
                .vco1
                .process_with_pitch_mod(vco1_pitch + vco2 * fm * FM_RANGE);
            let sub = if params.sub_level > 0.0 {
                self.sub.process_with_pitch_mod(vco1_pitch)
            } else {
                0.0
            };
            let noise = self.noise.process();

            // 8. mix
            let level1 = (params.vco1_level + m.vco1_level).clamp(0.0, 1.0);
            let level2 = (params.vco2_level + m.vco2_level).clamp(0.0, 1.0);
            let mixed = vco1 * level1
                + vco2 * level2
                + noise * params.noise_level
                + sub * params.sub_level;

            // 9. filter
            let noise_vcf = (params.noise_vcf_mod + m.noise_vcf).clamp(-1.0, 1.0);
            let env_amount = (params.filter_env_amount + m.filter_env_amount).clamp(-1.0, 1.0);
            let octaves = filter_env * env_amount * FILTER_EG_RANGE
                + noise.abs() * noise_vcf * 2.0
                + m.filter_cutoff * MOD_CUTOFF_RANGE;
            let cutoff =
                (params.filter_cutoff * libm::exp2(octaves)).clamp(MIN_CUTOFF, MAX_CUTOFF);
            let resonance = (params.filter_resonance + m.filter_resonance * 0.5).clamp(0.0, 1.0);
            self.filter.set_cutoff(cutoff);
            self.filter.set_resonance(resonance);
            let filtered = self.filter.process(mixed);

            // 10. VCA
            let vca = if drone {
                1.0
            } else {
                shape_vca(vca_env, m.vca_decay)
            };
            let mut out = filtered * vca * params.vca_level;

            // 11-12. delay and ring mod
            out = self.delay.process(
                out,
                self.sequencer.current_delay_pitch(),
                params.delay_time,
                params.delay_feedback,
                params.delay_mix,
            );
            let ring_freq = params.ring_mod_freq
                * RingModulator::frequency_ratio(self.sequencer.current_ring_mod(), m.ring_mod_freq);
            out = self.ring.process(out, ring_freq, params.ring_mod_mix);

            // 13. pan
            let (gain_l, gain_r) = equal_power_pan(self.sequencer.current_pan() + m.pan);
            left[i] = out * gain_l;
            if let Some(r) = right.as_deref_mut() {
                r[i] = out * gain_r;
            }
        }

        // 14. reverb send
        self.reverb.process(left, right, params.reverb_mix);

        self.telemetry
            .publish(self.sequencer.current_step(), self.sequencer.is_running());
    }

    /// Per-block setup from the snapshot and transport.
    fn configure(&mut self, params: &ParamSnapshot, ctx: &BlockContext) {
        let sr = self.sample_rate;

        let (mut tempo, running) = match ctx.host {
            Some(host) if params.host_sync => (host.bpm.unwrap_or(params.tempo), host.playing),
            _ => (params.tempo, params.running),
        };
        tempo *= params.tempo_multiplier();

        for i in 0..NUM_STEPS {
            let mut step = params.steps[i];
            step.pitch = quantize(step.pitch, params.scale, params.scale_root);
            step.delay_pitch = quantize(step.delay_pitch, params.scale, params.scale_root);
            self.sequencer.set_step(i, step);
        }
        self.sequencer.set_tempo(tempo);
        self.sequencer.set_swing(params.swing);
        self.sequencer.set_direction(params.direction);
        self.sequencer.set_running(running);

        self.pitch_env.set_decay_ms(params.vco_decay);
        self.filter_env.set_decay_ms(params.filter_decay);
        let vca_decay = if params.vca_slow {
            params.vca_decay * 4.0
        } else {
            params.vca_decay
        };
        self.vca_env.set_decay_ms(vca_decay);

        self.filter.set_mode(params.filter_mode);
        self.filter.set_resonance(params.filter_resonance);

        let midi = if ctx.note_held { ctx.note_pitch } else { 0.0 };
        let vco1_hz = BASE_FREQUENCY * libm::exp2((params.vco1_freq + midi) / 12.0);
        let vco2_hz = BASE_FREQUENCY * libm::exp2((params.vco2_freq + midi) / 12.0);
        self.vco1.set_frequency(vco1_hz);
        self.vco2.set_frequency(vco2_hz);
        self.sub.set_frequency(vco1_hz * 0.5);

        self.lfo.set_shape(params.lfo_shape);
        if params.lfo_sync {
            self.lfo.set_synced_rate(params.lfo_rate, tempo);
        } else {
            self.lfo.set_rate(params.lfo_rate);
        }

        self.matrix.set_slots(&params.mod_slots);

        self.delay
            .set_damping_coefficient(OnePole::coefficient_for(params.delay_filter, sr));
        self.reverb
            .set_filter_coefficient(OnePole::coefficient_for(params.reverb_filter, sr));
        self.reverb
            .set_settings(&ReverbSettings::from_decay(params.reverb_decay));
    }
}

/// Reshape the VCA envelope: positive bias stretches the decay, negative
/// bias tightens it.
#[inline]
fn shape_vca(env: f64, bias: f64) -> f64 {
    let bias = bias.clamp(-1.0, 1.0);
    if bias > 0.0 {
        libm::pow(env, 1.0 - bias * 0.8)
    } else if bias < 0.0 {
        libm::pow(env, 1.0 - bias * 2.0)
    } else {
        env
    }
}
