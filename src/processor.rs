//! Host-facing processor
//!
//! Glues the shared control surfaces in [`crate::io`] to a [`VoiceEngine`].
//! The host calls [`VoiceProcessor::process`] once per audio block; UI and
//! MIDI threads hold clones of the `Arc` handles and write into them freely.

use std::sync::Arc;

use crate::engine::{BlockContext, HostTransport, VoiceEngine};
use crate::io::{ManualControls, MidiNoteState, ParamStore, Telemetry};
use crate::params::{StateError, VoiceState};
use crate::reverb::{Freeverb, StereoReverb};

pub struct VoiceProcessor<R: StereoReverb = Freeverb> {
    params: Arc<ParamStore>,
    midi: Arc<MidiNoteState>,
    controls: Arc<ManualControls>,
    engine: VoiceEngine<R>,
}

impl VoiceProcessor<Freeverb> {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_engine(VoiceEngine::new(sample_rate))
    }
}

impl Default for VoiceProcessor<Freeverb> {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl<R: StereoReverb> VoiceProcessor<R> {
    pub fn with_engine(engine: VoiceEngine<R>) -> Self {
        Self {
            params: Arc::new(ParamStore::new()),
            midi: Arc::new(MidiNoteState::new()),
            controls: Arc::new(ManualControls::new()),
            engine,
        }
    }

    /// See [`VoiceEngine::prepare`].
    pub fn prepare(&mut self, sample_rate: f64, max_block: usize) {
        self.engine.prepare(sample_rate, max_block);
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.midi.release();
    }

    pub fn params(&self) -> Arc<ParamStore> {
        Arc::clone(&self.params)
    }

    pub fn midi(&self) -> Arc<MidiNoteState> {
        Arc::clone(&self.midi)
    }

    pub fn controls(&self) -> Arc<ManualControls> {
        Arc::clone(&self.controls)
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.engine.telemetry()
    }

    pub fn engine(&self) -> &VoiceEngine<R> {
        &self.engine
    }

    pub fn save_state(&self) -> VoiceState {
        self.params.save_state()
    }

    pub fn load_state(&self, state: &VoiceState) -> Result<(), StateError> {
        self.params.load_state(state)
    }

    /// Render one block.
    ///
    /// `midi` holds the raw messages that arrived with this block; they are
    /// applied before any audio is rendered. Manual presses are consumed only
    /// by a block with at least one frame.
    pub fn process(
        &mut self,
        midi: &[&[u8]],
        host: Option<HostTransport>,
        left: &mut [f64],
        right: Option<&mut [f64]>,
    ) {
        let params = self.params.snapshot();

        for msg in midi {
            self.midi.handle_message(msg, params.midi_hold);
        }

        let frames = right
            .as_deref()
            .map_or(left.len(), |r| r.len().min(left.len()));
        if frames == 0 {
            // Nothing to render: pending button presses wait for the next block
            left.fill(0.0);
            if let Some(r) = right {
                r.fill(0.0);
            }
            return;
        }

        let (note_pitch, note_held) = self.midi.note();
        let (manual_trigger, manual_advance) = self.controls.take();

        let ctx = BlockContext {
            host,
            note_pitch,
            note_held,
            manual_trigger,
            manual_advance,
        };
        self.engine.process_block(&params, &ctx, left, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamId;

    fn processor() -> VoiceProcessor {
        let mut processor = VoiceProcessor::with_engine(VoiceEngine::with_seed(44100.0, 7));
        processor.prepare(44100.0, 128);
        processor
    }

    fn peak(buf: &[f64]) -> f64 {
        buf.iter().fold(0.0, |acc, x| acc.max(x.abs()))
    }

    #[test]
    fn test_manual_trigger_is_consumed_once() {
        let mut processor = processor();
        processor.controls().trigger();

        let mut left = vec![0.0; 128];
        let mut right = vec![0.0; 128];
        processor.process(&[], None, &mut left, Some(&mut right));
        assert!(peak(&left) > 0.0);
        assert_eq!(processor.controls().take(), (false, false));
    }

    #[test]
    fn test_empty_block_keeps_pending_presses() {
        let mut processor = processor();
        processor.controls().trigger();
        processor.controls().advance();

        let mut empty: Vec<f64> = Vec::new();
        processor.process(&[], None, &mut empty, None);
        let mut left = vec![0.0; 64];
        let mut right: Vec<f64> = Vec::new();
        processor.process(&[], None, &mut left, Some(&mut right));
        assert_eq!(processor.telemetry().current_step(), 0);

        let mut left = vec![0.0; 128];
        processor.process(&[], None, &mut left, None);
        assert!(peak(&left) > 0.0);
        assert_eq!(processor.telemetry().current_step(), 1);
        assert_eq!(processor.controls().take(), (false, false));
    }

    #[test]
    fn test_midi_applied_before_render() {
        let mut processor = processor();
        let mut left = vec![0.0; 64];
        processor.process(&[&[0x90, 60, 100]], None, &mut left, None);
        assert!(processor.midi().is_held());
        assert_eq!(processor.midi().pitch_offset(), 24.0);

        processor.process(&[&[0x80, 60, 0]], None, &mut left, None);
        assert!(!processor.midi().is_held());
    }

    #[test]
    fn test_midi_hold_from_params() {
        let mut processor = processor();
        processor.params().set(ParamId::MidiHold, 1.0);
        let mut left = vec![0.0; 64];
        processor.process(&[&[0x90, 40, 100], &[0x80, 40, 0]], None, &mut left, None);
        assert!(processor.midi().is_held());
    }

    #[test]
    fn test_param_changes_reach_engine() {
        let mut processor = processor();
        let params = processor.params();
        params.set(ParamId::SeqRun, 1.0);
        params.set(ParamId::Tempo, 90.0);

        let mut left = vec![0.0; 64];
        processor.process(&[], None, &mut left, None);
        assert_eq!(processor.engine().sequencer().tempo(), 90.0);
        assert!(processor.telemetry().is_running());
    }

    #[test]
    fn test_host_transport_drives_sequencer() {
        let mut processor = processor();
        processor.params().set(ParamId::HostSync, 1.0);
        let host = HostTransport {
            bpm: Some(140.0),
            playing: true,
        };
        let mut left = vec![0.0; 64];
        processor.process(&[], Some(host), &mut left, None);
        assert_eq!(processor.engine().sequencer().tempo(), 140.0);
        assert!(processor.telemetry().is_running());
    }

    #[test]
    fn test_state_round_trip_between_processors() {
        let a = processor();
        a.params().set(ParamId::FilterCutoff, 640.0);
        a.params().set(ParamId::StepVelocity(7), 0.25);

        let b = processor();
        b.load_state(&a.save_state()).unwrap();
        assert_eq!(b.params().get(ParamId::FilterCutoff), Some(640.0));
        assert_eq!(b.params().get(ParamId::StepVelocity(7)), Some(0.25));
    }

    #[test]
    fn test_reset_releases_note() {
        let mut processor = processor();
        let mut left = vec![0.0; 32];
        processor.process(&[&[0x90, 36, 100]], None, &mut left, None);
        processor.reset();
        assert!(!processor.midi().is_held());
    }
}
