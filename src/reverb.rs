//! Reverb send
//!
//! The voice hands its finished block to a stereo reverb through the
//! [`StereoReverb`] trait. [`Freeverb`] is the default network: two
//! Schroeder reverbs (four parallel combs into two series allpasses) with a
//! small stereo spread between channels.
//!
//! ```text
//! dry ──→ [pre-delay 30 ms] ──→ [StereoReverb] ──→ [one-pole LP] ──┐
//!  │                                                               ├─→ out
//!  └──────────────────────────── · (1 - mix) ──────────── · mix ───┘
//! ```

use crate::filter::OnePole;
use crate::fx::DelayLine;

/// Pre-delay applied before the reverb, in seconds.
pub const PRE_DELAY_SECONDS: f64 = 0.03;

/// Pre-delay buffer capacity, in seconds.
pub const PRE_DELAY_CAPACITY_SECONDS: f64 = 0.1;

/// Scratch size used until `prepare` is called.
pub const DEFAULT_MAX_BLOCK: usize = 512;

const COMB_DELAYS_MS: [f64; 4] = [29.7, 37.1, 41.1, 43.7];
const ALLPASS_DELAYS_MS: [f64; 2] = [5.0, 1.7];
const STEREO_SPREAD: f64 = 23.0;
const SPREAD_REFERENCE_RATE: f64 = 44100.0;

/// Room settings handed to a [`StereoReverb`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbSettings {
    pub room_size: f64,
    pub damping: f64,
    pub width: f64,
    pub wet: f64,
    pub dry: f64,
}

impl ReverbSettings {
    /// Derive the room from the single decay knob (0..1).
    pub fn from_decay(decay: f64) -> Self {
        let d = if decay.is_nan() { 0.0 } else { decay.clamp(0.0, 1.0) };
        Self {
            room_size: 0.2 + d * 0.5,
            damping: 0.7 + d * 0.25,
            width: 0.6 + d * 0.3,
            wet: 1.0,
            dry: 0.0,
        }
    }
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self::from_decay(0.5)
    }
}

/// Stereo reverb processor driven by the voice.
///
/// Implementations may allocate in `set_sample_rate` but not in
/// `process_block`.
pub trait StereoReverb: Send {
    fn set_sample_rate(&mut self, sample_rate: f64);
    fn set_settings(&mut self, settings: &ReverbSettings);
    /// Process in place; both slices have the same length.
    fn process_block(&mut self, left: &mut [f64], right: &mut [f64]);
    fn reset(&mut self);
}

/// Feedback comb with a one-pole lowpass in the loop.
#[derive(Debug, Clone)]
pub struct CombFilter {
    buffer: Vec<f64>,
    write_pos: usize,
    feedback: f64,
    damp: f64,
    filter_state: f64,
}

impl CombFilter {
    pub fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
            feedback: 0.5,
            damp: 0.5,
            filter_state: 0.0,
        }
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.99);
    }

    pub fn set_damp(&mut self, damp: f64) {
        self.damp = damp.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.buffer[self.write_pos];
        self.filter_state = output * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer[self.write_pos] = input + self.filter_state * self.feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

/// Schroeder allpass diffuser.
#[derive(Debug, Clone)]
pub struct AllpassFilter {
    buffer: Vec<f64>,
    write_pos: usize,
    feedback: f64,
}

impl AllpassFilter {
    pub fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
            feedback: 0.5,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let delayed = self.buffer[self.write_pos];
        let output = -self.feedback * input + delayed;
        self.buffer[self.write_pos] = input + self.feedback * output;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[derive(Debug, Clone)]
struct Network {
    combs: [CombFilter; 4],
    allpasses: [AllpassFilter; 2],
}

impl Network {
    fn new(sample_rate: f64, spread: f64) -> Self {
        let samples = |ms: f64| ((ms * sample_rate / 1000.0).max(0.0) + spread) as usize;
        Self {
            combs: COMB_DELAYS_MS.map(|ms| CombFilter::new(samples(ms))),
            allpasses: ALLPASS_DELAYS_MS.map(|ms| AllpassFilter::new(samples(ms))),
        }
    }

    fn configure(&mut self, settings: &ReverbSettings) {
        let feedback = 0.7 + settings.room_size.clamp(0.0, 1.0) * 0.28;
        for comb in &mut self.combs {
            comb.set_feedback(feedback);
            comb.set_damp(settings.damping);
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let mut output = 0.0;
        for comb in &mut self.combs {
            output += comb.process(input);
        }
        output *= 0.25;
        for allpass in &mut self.allpasses {
            output = allpass.process(output);
        }
        output
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::reset);
        self.allpasses.iter_mut().for_each(AllpassFilter::reset);
    }
}

/// Default stereo reverb.
#[derive(Debug, Clone)]
pub struct Freeverb {
    left: Network,
    right: Network,
    settings: ReverbSettings,
}

impl Freeverb {
    pub fn new(sample_rate: f64) -> Self {
        let spread = STEREO_SPREAD * sample_rate / SPREAD_REFERENCE_RATE;
        let settings = ReverbSettings::default();
        let mut reverb = Self {
            left: Network::new(sample_rate, 0.0),
            right: Network::new(sample_rate, spread),
            settings,
        };
        reverb.set_settings(&settings);
        reverb
    }

    pub fn settings(&self) -> &ReverbSettings {
        &self.settings
    }
}

impl Default for Freeverb {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl StereoReverb for Freeverb {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let settings = self.settings;
        *self = Self::new(sample_rate);
        self.set_settings(&settings);
    }

    fn set_settings(&mut self, settings: &ReverbSettings) {
        self.settings = *settings;
        self.left.configure(settings);
        self.right.configure(settings);
    }

    fn process_block(&mut self, left: &mut [f64], right: &mut [f64]) {
        let width = self.settings.width.clamp(0.0, 1.0);
        let wet1 = self.settings.wet * (width / 2.0 + 0.5);
        let wet2 = self.settings.wet * ((1.0 - width) / 2.0);
        let dry = self.settings.dry;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let input = (*l + *r) * 0.5;
            let out_l = self.left.process(input);
            let out_r = self.right.process(input);
            let (dry_l, dry_r) = (*l, *r);
            *l = out_l * wet1 + out_r * wet2 + dry_l * dry;
            *r = out_r * wet1 + out_l * wet2 + dry_r * dry;
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// Pre-delay, reverb, wet tone filter and dry/wet blend.
pub struct ReverbSend<R: StereoReverb = Freeverb> {
    reverb: R,
    pre_delay: [DelayLine; 2],
    pre_delay_samples: usize,
    wet_filters: [OnePole; 2],
    scratch_left: Vec<f64>,
    scratch_right: Vec<f64>,
}

impl<R: StereoReverb> ReverbSend<R> {
    pub fn new(reverb: R, sample_rate: f64) -> Self {
        let mut send = Self {
            reverb,
            pre_delay: [DelayLine::new(2), DelayLine::new(2)],
            pre_delay_samples: 1,
            wet_filters: [OnePole::new(), OnePole::new()],
            scratch_left: Vec::new(),
            scratch_right: Vec::new(),
        };
        send.prepare(sample_rate, DEFAULT_MAX_BLOCK);
        send
    }

    /// Size buffers for `sample_rate` and blocks up to `max_block` samples.
    /// Allocates; call from the setup thread only.
    pub fn prepare(&mut self, sample_rate: f64, max_block: usize) {
        let capacity = (sample_rate.max(0.0) * PRE_DELAY_CAPACITY_SECONDS) as usize;
        for line in &mut self.pre_delay {
            line.resize(capacity);
        }
        self.pre_delay_samples = self.pre_delay[0]
            .clamp_delay((sample_rate.max(0.0) * PRE_DELAY_SECONDS) as i64);

        let max_block = max_block.max(1);
        self.scratch_left = vec![0.0; max_block];
        self.scratch_right = vec![0.0; max_block];

        self.reverb.set_sample_rate(sample_rate);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.pre_delay.iter_mut().for_each(DelayLine::clear);
        self.wet_filters.iter_mut().for_each(OnePole::reset);
        self.reverb.reset();
    }

    pub fn pre_delay_samples(&self) -> usize {
        self.pre_delay_samples
    }

    pub fn set_settings(&mut self, settings: &ReverbSettings) {
        self.reverb.set_settings(settings);
    }

    /// Set the wet lowpass coefficient, usually from [`OnePole::coefficient_for`].
    pub fn set_filter_coefficient(&mut self, coefficient: f64) {
        for filter in &mut self.wet_filters {
            filter.set_coefficient(coefficient);
        }
    }

    pub fn reverb(&self) -> &R {
        &self.reverb
    }

    pub fn reverb_mut(&mut self) -> &mut R {
        &mut self.reverb
    }

    /// Blend the reverb into the block in place. Without a right channel the
    /// left signal feeds both reverb inputs and only left is written.
    pub fn process(&mut self, left: &mut [f64], mut right: Option<&mut [f64]>, mix: f64) {
        if mix <= 0.0 || mix.is_nan() {
            return;
        }
        let mix = mix.min(1.0);
        let chunk = self.scratch_left.len();
        let delay = self.pre_delay_samples;

        let mut start = 0;
        while start < left.len() {
            let end = (start + chunk).min(left.len());
            let n = end - start;

            for i in 0..n {
                let dry_l = left[start + i];
                let dry_r = match right.as_deref() {
                    Some(r) => r[start + i],
                    None => dry_l,
                };
                self.scratch_left[i] = self.pre_delay[0].read(delay);
                self.pre_delay[0].write(dry_l);
                self.scratch_right[i] = self.pre_delay[1].read(delay);
                self.pre_delay[1].write(dry_r);
            }

            self.reverb
                .process_block(&mut self.scratch_left[..n], &mut self.scratch_right[..n]);

            for i in 0..n {
                let wet_l = self.wet_filters[0].process(self.scratch_left[i]);
                let wet_r = self.wet_filters[1].process(self.scratch_right[i]);
                let l = &mut left[start + i];
                *l = *l * (1.0 - mix) + wet_l * mix;
                if let Some(r) = right.as_deref_mut() {
                    let r = &mut r[start + i];
                    *r = *r * (1.0 - mix) + wet_r * mix;
                }
            }

            start = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comb_filter_creates_echo() {
        let mut comb = CombFilter::new(10);
        comb.set_feedback(0.5);
        comb.set_damp(0.0);

        assert_eq!(comb.process(1.0), 0.0);
        for _ in 0..9 {
            comb.process(0.0);
        }
        assert_eq!(comb.process(0.0), 1.0);
        for _ in 0..9 {
            comb.process(0.0);
        }
        assert_eq!(comb.process(0.0), 0.5);
    }

    #[test]
    fn test_allpass_preserves_energy() {
        let mut allpass = AllpassFilter::new(5);
        let mut energy_in = 0.0;
        let mut energy_out = 0.0;
        for i in 0..200 {
            let input = if i < 10 { 1.0 } else { 0.0 };
            let output = allpass.process(input);
            energy_in += input * input;
            energy_out += output * output;
        }
        assert!(energy_out > energy_in * 0.8);
        assert!(energy_out < energy_in * 1.2);
    }

    #[test]
    fn test_settings_from_decay() {
        let s = ReverbSettings::from_decay(1.0);
        assert!((s.room_size - 0.7).abs() < 1e-12);
        assert!((s.damping - 0.95).abs() < 1e-12);
        assert!((s.width - 0.9).abs() < 1e-12);
        assert_eq!(s.wet, 1.0);
        assert_eq!(s.dry, 0.0);
        assert_eq!(ReverbSettings::from_decay(-3.0), ReverbSettings::from_decay(0.0));
    }

    #[test]
    fn test_freeverb_tail() {
        let mut reverb = Freeverb::new(48000.0);
        let mut left = vec![0.0; 9600];
        let mut right = vec![0.0; 9600];
        left[0] = 1.0;
        right[0] = 1.0;
        reverb.process_block(&mut left, &mut right);

        // Nothing before the shortest comb
        assert!(left[..1400].iter().all(|&x| x == 0.0));
        let energy: f64 = left.iter().map(|x| x * x).sum();
        assert!(energy > 0.0);
        assert!(left.iter().chain(right.iter()).all(|x| x.is_finite() && x.abs() < 2.0));
        // The right network is offset by the spread
        assert_ne!(left, right);
    }

    #[test]
    fn test_send_zero_mix_is_bypass() {
        let mut send = ReverbSend::new(Freeverb::default(), 44100.0);
        let mut left = vec![0.5; 64];
        let mut right = vec![-0.5; 64];
        send.process(&mut left, Some(&mut right), 0.0);
        assert!(left.iter().all(|&x| x == 0.5));
        assert!(right.iter().all(|&x| x == -0.5));
    }

    #[test]
    fn test_send_pre_delay_holds_back_wet() {
        let sample_rate = 10000.0;
        let mut send = ReverbSend::new(Freeverb::new(sample_rate), sample_rate);
        send.prepare(sample_rate, 64);
        send.set_filter_coefficient(0.0);
        assert_eq!(send.pre_delay_samples(), 300);

        // Longer than the scratch, so the block is chunked
        let mut left = vec![0.0; 2000];
        left[0] = 1.0;
        send.process(&mut left, None, 1.0);

        // 30 ms pre-delay plus the 29.7 ms shortest comb
        assert!(left[..597].iter().all(|&x| x == 0.0));
        assert!(left[597..].iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_send_partial_mix_keeps_dry() {
        let mut send = ReverbSend::new(Freeverb::default(), 44100.0);
        let mut left = vec![1.0; 32];
        send.process(&mut left, None, 0.25);
        // The wet path is still silent inside the pre-delay
        assert!(left.iter().all(|&x| (x - 0.75).abs() < 1e-12));
    }
}
