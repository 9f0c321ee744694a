//! Common interface for the engine's DSP building blocks
//!
//! Every stateful unit the voice owns can be re-clocked and cleared the same
//! way, which lets the engine walk them uniformly when the host renegotiates
//! the sample rate.

/// Lifecycle interface shared by oscillators, envelopes, filters and effects.
pub trait DspUnit: Send {
    /// Clear all running state (phase, stages, buffers) without touching settings.
    fn reset(&mut self);

    /// Update the sample rate and recompute any derived coefficients.
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Short identifier, used in log output.
    fn type_id(&self) -> &'static str {
        "unknown"
    }
}

/// Prepare a set of units for a new sample rate.
///
/// Equivalent to calling [`DspUnit::set_sample_rate`] and then
/// [`DspUnit::reset`] on each unit.
pub fn prepare_all(units: &mut [&mut dyn DspUnit], sample_rate: f64) {
    for unit in units.iter_mut() {
        unit.set_sample_rate(sample_rate);
        unit.reset();
        log::trace!("prepared {} at {} Hz", unit.type_id(), sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::oscillator::Oscillator;

    #[test]
    fn test_prepare_all_reclocks_and_clears() {
        let mut osc = Oscillator::new(44100.0);
        osc.set_frequency(1000.0);
        for _ in 0..10 {
            osc.process();
        }
        let mut env = Envelope::new(44100.0);
        env.trigger(1.0);

        prepare_all(&mut [&mut osc, &mut env], 48000.0);

        assert_eq!(osc.phase(), 0.0);
        osc.process();
        assert!((osc.phase() - 1000.0 / 48000.0).abs() < 1e-12);
        assert!(!env.is_active());
    }
}
