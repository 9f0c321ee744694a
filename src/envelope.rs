//! One-shot exponential decay envelope

use crate::unit::DspUnit;

/// Level the envelope reaches after its nominal decay time (-60 dB).
const DECAY_TARGET: f64 = 0.001;

/// Below this the envelope snaps to zero and goes idle.
const SILENCE_THRESHOLD: f64 = 1e-4;

/// Decay Envelope Generator (EG)
///
/// `trigger` jumps straight to the velocity; every `process` call then
/// returns the current level and multiplies it by a fixed per-sample
/// coefficient chosen so that the level falls to 0.001 of its start after
/// `decay_time * sample_rate` samples.
#[derive(Debug, Clone)]
pub struct Envelope {
    sample_rate: f64,
    decay_time: f64,
    coefficient: f64,
    value: f64,
    active: bool,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        let mut env = Self {
            sample_rate,
            decay_time: 0.2,
            coefficient: 0.0,
            value: 0.0,
            active: false,
        };
        env.update_coefficient();
        env
    }

    /// Set the -60 dB decay time in seconds.
    pub fn set_decay_time(&mut self, seconds: f64) {
        self.decay_time = seconds;
        self.update_coefficient();
    }

    /// Convenience for parameter values expressed in milliseconds.
    pub fn set_decay_ms(&mut self, ms: f64) {
        self.set_decay_time(ms / 1000.0);
    }

    pub fn decay_time(&self) -> f64 {
        self.decay_time
    }

    pub fn trigger(&mut self, velocity: f64) {
        self.value = velocity.clamp(0.0, 1.0);
        self.active = true;
    }

    pub fn process(&mut self) -> f64 {
        if !self.active {
            return 0.0;
        }

        let output = self.value;
        self.value *= self.coefficient;

        if self.value < SILENCE_THRESHOLD {
            self.value = 0.0;
            self.active = false;
        }

        output
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    fn update_coefficient(&mut self) {
        let samples = self.decay_time * self.sample_rate;
        self.coefficient = if self.decay_time > 0.0 && self.sample_rate > 0.0 {
            libm::pow(DECAY_TARGET, 1.0 / samples)
        } else {
            0.0
        };
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DspUnit for Envelope {
    fn reset(&mut self) {
        self.value = 0.0;
        self.active = false;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coefficient();
    }

    fn type_id(&self) -> &'static str {
        "envelope"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trigger_then_process_returns_velocity() {
        let mut env = Envelope::new(44100.0);
        env.trigger(0.7);
        assert_eq!(env.process(), 0.7);
        assert!(env.is_active());
    }

    #[test]
    fn test_reaches_minus_60db_after_decay_time() {
        let sample_rate = 44100.0;
        let mut env = Envelope::new(sample_rate);
        env.set_decay_time(0.2);
        env.trigger(1.0);

        let n = (0.2_f64 * sample_rate).ceil() as usize;
        for _ in 0..n {
            env.process();
        }
        assert_relative_eq!(env.value(), 0.001, max_relative = 1e-3);
        assert!(env.value() <= 0.001 + 1e-9);
    }

    #[test]
    fn test_snaps_to_zero_and_deactivates() {
        let mut env = Envelope::new(1000.0);
        env.set_decay_time(0.01); // 10 samples to -60 dB
        env.trigger(1.0);

        let mut last_nonzero = 0;
        for i in 0..100 {
            if env.process() > 0.0 {
                last_nonzero = i;
            }
        }
        assert!(!env.is_active());
        assert_eq!(env.value(), 0.0);
        assert_eq!(env.process(), 0.0);
        // 1e-4 is reached after ~13 samples
        assert!(last_nonzero < 20);
    }

    #[test]
    fn test_zero_decay_time_cuts_immediately() {
        let mut env = Envelope::new(44100.0);
        env.set_decay_time(0.0);
        env.trigger(0.9);
        assert_eq!(env.process(), 0.9);
        assert_eq!(env.process(), 0.0);
        assert!(!env.is_active());
    }

    #[test]
    fn test_retrigger_restarts_level() {
        let mut env = Envelope::new(1000.0);
        env.set_decay_ms(100.0);
        env.trigger(1.0);
        for _ in 0..50 {
            env.process();
        }
        env.trigger(0.5);
        assert_eq!(env.process(), 0.5);
    }

    #[test]
    fn test_velocity_clamped() {
        let mut env = Envelope::default();
        env.trigger(4.0);
        assert_eq!(env.process(), 1.0);
    }
}
