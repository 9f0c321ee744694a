//! Eight-Step Pattern Sequencer
//!
//! Runs its own sample clock. Each step lasts an eighth note at the current
//! tempo, stretched or compressed by swing:
//!
//! ```text
//! nominal = fs / ((bpm / 60) · 2)
//! offset  = (swing - 0.5) · 2          // -1 .. +1
//! odd     = nominal · (1 + offset/2)   // off-beats
//! even    = nominal · (1 - offset/2)
//! ```
//!
//! so an even/odd pair always spans two nominal steps. [`Sequencer::process`]
//! returns `true` on exactly the sample where a new step becomes current.

use crate::unit::DspUnit;

pub const NUM_STEPS: usize = 8;

pub const MIN_TEMPO: f64 = 30.0;
pub const MAX_TEMPO: f64 = 300.0;

/// Playback order of the steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
    PingPong,
}

impl Direction {
    /// Decode an integer-coded choice; out-of-range codes are clamped.
    pub fn from_index(index: i64) -> Self {
        match index {
            i64::MIN..=0 => Direction::Forward,
            1 => Direction::Backward,
            _ => Direction::PingPong,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-step values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// Pitch offset in semitones, [-24, 24]
    pub pitch: f64,
    /// Trigger velocity, [0, 1]
    pub velocity: f64,
    /// Stereo position, [-1, 1]
    pub pan: f64,
    /// Waveform-morph offset source, [0, 1]
    pub wave: f64,
    /// Ring-modulator frequency scaling, [0, 1]
    pub ring_mod: f64,
    /// Tuned-delay pitch in semitones, [-24, 48]
    pub delay_pitch: f64,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            velocity: 0.8,
            pan: 0.0,
            wave: 0.33,
            ring_mod: 0.5,
            delay_pitch: 0.0,
        }
    }
}

impl Step {
    /// Copy with every field clamped to its valid range.
    pub fn clamped(self) -> Self {
        Self {
            pitch: clamp_or(self.pitch, -24.0, 24.0, 0.0),
            velocity: clamp_or(self.velocity, 0.0, 1.0, 0.0),
            pan: clamp_or(self.pan, -1.0, 1.0, 0.0),
            wave: clamp_or(self.wave, 0.0, 1.0, 0.0),
            ring_mod: clamp_or(self.ring_mod, 0.0, 1.0, 0.0),
            delay_pitch: clamp_or(self.delay_pitch, -24.0, 48.0, 0.0),
        }
    }
}

#[inline]
fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Step Sequencer
#[derive(Debug, Clone)]
pub struct Sequencer {
    steps: [Step; NUM_STEPS],
    sample_rate: f64,
    tempo: f64,
    swing: f64,
    direction: Direction,
    running: bool,
    current: usize,
    /// +1 or -1 while in ping-pong mode
    ping_pong: i8,
    counter: f64,
    samples_per_step: f64,
}

impl Sequencer {
    pub fn new(sample_rate: f64) -> Self {
        let mut seq = Self {
            steps: [Step::default(); NUM_STEPS],
            sample_rate,
            tempo: 120.0,
            swing: 0.5,
            direction: Direction::Forward,
            running: false,
            current: 0,
            ping_pong: 1,
            counter: 0.0,
            samples_per_step: 0.0,
        };
        seq.update_timing();
        seq
    }

    // --- step data ---

    pub fn set_step(&mut self, index: usize, step: Step) {
        if let Some(slot) = self.steps.get_mut(index) {
            *slot = step.clamped();
        }
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn set_step_pitch(&mut self, index: usize, semitones: f64) {
        if let Some(step) = self.steps.get_mut(index) {
            step.pitch = clamp_or(semitones, -24.0, 24.0, 0.0);
        }
    }

    pub fn set_step_velocity(&mut self, index: usize, velocity: f64) {
        if let Some(step) = self.steps.get_mut(index) {
            step.velocity = clamp_or(velocity, 0.0, 1.0, 0.0);
        }
    }

    pub fn set_step_pan(&mut self, index: usize, pan: f64) {
        if let Some(step) = self.steps.get_mut(index) {
            step.pan = clamp_or(pan, -1.0, 1.0, 0.0);
        }
    }

    pub fn set_step_wave(&mut self, index: usize, wave: f64) {
        if let Some(step) = self.steps.get_mut(index) {
            step.wave = clamp_or(wave, 0.0, 1.0, 0.0);
        }
    }

    pub fn set_step_ring_mod(&mut self, index: usize, amount: f64) {
        if let Some(step) = self.steps.get_mut(index) {
            step.ring_mod = clamp_or(amount, 0.0, 1.0, 0.0);
        }
    }

    pub fn set_step_delay_pitch(&mut self, index: usize, semitones: f64) {
        if let Some(step) = self.steps.get_mut(index) {
            step.delay_pitch = clamp_or(semitones, -24.0, 48.0, 0.0);
        }
    }

    // --- transport ---

    /// Set tempo in BPM, clamped to [30, 300].
    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo = clamp_or(bpm, MIN_TEMPO, MAX_TEMPO, 120.0);
        self.update_timing();
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_swing(&mut self, swing: f64) {
        self.swing = clamp_or(swing, 0.0, 1.0, 0.5);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Start or stop the clock. Starting always restarts from the first step.
    pub fn set_running(&mut self, running: bool) {
        if running && !self.running {
            self.rewind();
        }
        self.running = running;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn samples_per_step(&self) -> f64 {
        self.samples_per_step
    }

    /// Swing-adjusted length of the given step in samples.
    pub fn step_length(&self, index: usize) -> f64 {
        let offset = (self.swing - 0.5) * 2.0;
        if index % 2 == 1 {
            self.samples_per_step * (1.0 + offset * 0.5)
        } else {
            self.samples_per_step * (1.0 - offset * 0.5)
        }
    }

    /// Advance the clock by one sample; true when a new step begins.
    pub fn process(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.counter += 1.0;
        let length = self.step_length(self.current);

        if self.counter >= length {
            self.counter -= length;
            self.next_index();
            return true;
        }

        false
    }

    /// Move to the next step immediately and restart the step clock.
    pub fn advance_step(&mut self) {
        self.next_index();
        self.counter = 0.0;
    }

    pub fn current_step(&self) -> usize {
        self.current
    }

    // --- current step accessors ---

    pub fn current(&self) -> &Step {
        &self.steps[self.current]
    }

    pub fn current_pitch(&self) -> f64 {
        self.current().pitch
    }

    /// Current pitch as a frequency ratio, `2^(semitones/12)`.
    pub fn current_pitch_multiplier(&self) -> f64 {
        libm::pow(2.0, self.current().pitch / 12.0)
    }

    pub fn current_velocity(&self) -> f64 {
        self.current().velocity
    }

    pub fn current_pan(&self) -> f64 {
        self.current().pan
    }

    pub fn current_wave(&self) -> f64 {
        self.current().wave
    }

    pub fn current_ring_mod(&self) -> f64 {
        self.current().ring_mod
    }

    pub fn current_delay_pitch(&self) -> f64 {
        self.current().delay_pitch
    }

    fn next_index(&mut self) {
        let last = NUM_STEPS - 1;
        self.current = match self.direction {
            Direction::Forward => (self.current + 1) % NUM_STEPS,
            Direction::Backward => (self.current + last) % NUM_STEPS,
            Direction::PingPong => {
                let next = self.current as i64 + self.ping_pong as i64;
                if next >= last as i64 {
                    self.ping_pong = -1;
                    last
                } else if next <= 0 {
                    self.ping_pong = 1;
                    0
                } else {
                    next as usize
                }
            }
        };
    }

    fn rewind(&mut self) {
        self.current = 0;
        self.counter = 0.0;
        self.ping_pong = 1;
    }

    fn update_timing(&mut self) {
        self.samples_per_step = self.sample_rate / ((self.tempo / 60.0) * 2.0);
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DspUnit for Sequencer {
    fn reset(&mut self) {
        self.rewind();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_timing();
    }

    fn type_id(&self) -> &'static str {
        "sequencer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Collect the indices visited over `count` step boundaries.
    fn visit(seq: &mut Sequencer, count: usize) -> Vec<usize> {
        let mut visited = vec![seq.current_step()];
        while visited.len() < count {
            if seq.process() {
                visited.push(seq.current_step());
            }
        }
        visited
    }

    fn running(sample_rate: f64, direction: Direction) -> Sequencer {
        let mut seq = Sequencer::new(sample_rate);
        seq.set_direction(direction);
        seq.set_tempo(300.0);
        seq.set_running(true);
        seq
    }

    #[test]
    fn test_forward_order() {
        let mut seq = running(1000.0, Direction::Forward);
        assert_eq!(
            visit(&mut seq, 12),
            vec![0, 1, 2, 3, 4, 5, 6, 7, 0, 1, 2, 3]
        );
    }

    #[test]
    fn test_backward_order() {
        let mut seq = running(1000.0, Direction::Backward);
        assert_eq!(visit(&mut seq, 10), vec![0, 7, 6, 5, 4, 3, 2, 1, 0, 7]);
    }

    #[test]
    fn test_ping_pong_never_repeats_endpoint() {
        let mut seq = running(1000.0, Direction::PingPong);
        let visited = visit(&mut seq, 23);
        assert_eq!(
            visited,
            vec![0, 1, 2, 3, 4, 5, 6, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 6]
        );
        for pair in visited.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_step_period_at_120_bpm() {
        let sample_rate = 44100.0;
        let mut seq = Sequencer::new(sample_rate);
        seq.set_tempo(120.0);
        seq.set_swing(0.5);
        seq.set_running(true);

        let period = (sample_rate / (2.0 * (120.0 / 60.0))) as usize;
        assert_eq!(period, 11025);

        let mut triggers = 0;
        for _ in 0..period - 1 {
            if seq.process() {
                triggers += 1;
            }
        }
        assert_eq!(triggers, 0);
        assert_eq!(seq.current_step(), 0);

        assert!(seq.process());
        assert_eq!(seq.current_step(), 1);
    }

    #[test]
    fn test_swing_lengths_are_symmetric() {
        let mut seq = Sequencer::new(48000.0);
        seq.set_tempo(97.0);

        seq.set_swing(0.5);
        assert_relative_eq!(seq.step_length(0), seq.step_length(1));

        for &swing in &[0.0, 0.2, 0.66, 1.0] {
            seq.set_swing(swing);
            let pair = seq.step_length(0) + seq.step_length(1);
            assert_relative_eq!(pair, 2.0 * seq.samples_per_step(), max_relative = 1e-12);
        }

        seq.set_swing(1.0);
        assert_relative_eq!(seq.step_length(1), 1.5 * seq.samples_per_step());
        assert_relative_eq!(seq.step_length(0), 0.5 * seq.samples_per_step());
    }

    #[test]
    fn test_at_most_one_trigger_per_sample_and_counter_carries() {
        let mut seq = Sequencer::new(1000.0);
        seq.set_tempo(300.0); // 100 samples per step
        seq.set_swing(0.75);
        seq.set_running(true);

        let mut boundaries = Vec::new();
        for i in 1..=1000 {
            if seq.process() {
                boundaries.push(i);
            }
        }
        // 75 on even steps, 125 on odd steps
        assert_eq!(&boundaries[..4], &[75, 200, 275, 400]);
    }

    #[test]
    fn test_stopped_never_triggers() {
        let mut seq = Sequencer::new(1000.0);
        for _ in 0..10_000 {
            assert!(!seq.process());
        }
    }

    #[test]
    fn test_restart_resets_to_first_step() {
        let mut seq = running(1000.0, Direction::Forward);
        visit(&mut seq, 4);
        assert_eq!(seq.current_step(), 3);
        seq.set_running(false);
        seq.set_running(true);
        assert_eq!(seq.current_step(), 0);

        // Staying in the running state keeps position
        seq.advance_step();
        seq.set_running(true);
        assert_eq!(seq.current_step(), 1);
    }

    #[test]
    fn test_advance_step_resets_counter() {
        let mut seq = Sequencer::new(1000.0);
        seq.set_tempo(300.0);
        seq.set_running(true);
        for _ in 0..99 {
            assert!(!seq.process());
        }
        seq.advance_step();
        assert_eq!(seq.current_step(), 1);
        for _ in 0..99 {
            assert!(!seq.process());
        }
        assert!(seq.process());
        assert_eq!(seq.current_step(), 2);
    }

    #[test]
    fn test_step_accessors_and_clamps() {
        let mut seq = Sequencer::default();
        seq.set_step_pitch(0, 36.0);
        seq.set_step_delay_pitch(0, 60.0);
        seq.set_step_velocity(0, 2.0);
        seq.set_step_pan(0, -3.0);
        seq.set_step_pitch(12, 5.0); // ignored

        assert_eq!(seq.current_pitch(), 24.0);
        assert_relative_eq!(seq.current_pitch_multiplier(), 4.0);
        assert_eq!(seq.current_delay_pitch(), 48.0);
        assert_eq!(seq.current_velocity(), 1.0);
        assert_eq!(seq.current_pan(), -1.0);
        assert_eq!(seq.current_wave(), 0.33);
        assert_eq!(seq.current_ring_mod(), 0.5);
    }

    #[test]
    fn test_tempo_clamped() {
        let mut seq = Sequencer::default();
        seq.set_tempo(1000.0);
        assert_eq!(seq.tempo(), 300.0);
        seq.set_tempo(1.0);
        assert_eq!(seq.tempo(), 30.0);
    }

    #[test]
    fn test_direction_from_index() {
        assert_eq!(Direction::from_index(-4), Direction::Forward);
        assert_eq!(Direction::from_index(1), Direction::Backward);
        assert_eq!(Direction::from_index(2), Direction::PingPong);
        assert_eq!(Direction::from_index(9), Direction::PingPong);
    }
}
