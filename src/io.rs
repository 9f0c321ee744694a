//! External I/O Integration
//!
//! Lock-free surfaces shared between the control, MIDI and audio threads:
//! parameter slots, the held MIDI note, the one-shot manual buttons and the
//! telemetry the UI polls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::params::{param_layout, ParamDef, ParamId, ParamSnapshot, StateError, VoiceState};

/// MIDI note that plays the oscillators at their knob pitch (C2).
pub const REFERENCE_NOTE: u8 = 36;

/// Atomic f64 for lock-free communication between threads
///
/// Uses AtomicU64 internally since there's no native AtomicF64.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Load with specified ordering
    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.0.load(ordering))
    }

    /// Store with specified ordering
    pub fn store(&self, value: f64, ordering: Ordering) {
        self.0.store(value.to_bits(), ordering);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// Parameter values shared between the control thread and the audio thread.
///
/// Writers store clamped values into per-parameter atomics; the audio thread
/// reads all of them once per block through [`ParamStore::snapshot`].
/// Lookups by [`ParamId`] go through a hash index built once at construction.
#[derive(Debug)]
pub struct ParamStore {
    defs: Vec<ParamDef>,
    values: Vec<Arc<AtomicF64>>,
    index: HashMap<ParamId, usize>,
    /// Default snapshot that each block's snapshot starts from
    template: ParamSnapshot,
}

impl ParamStore {
    pub fn new() -> Self {
        let defs = param_layout();
        let values = defs
            .iter()
            .map(|def| Arc::new(AtomicF64::new(def.default)))
            .collect();
        let index = defs
            .iter()
            .enumerate()
            .map(|(i, def)| (def.id, i))
            .collect();
        Self {
            defs,
            values,
            index,
            template: ParamSnapshot::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn defs(&self) -> &[ParamDef] {
        &self.defs
    }

    pub fn index_of(&self, id: ParamId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Shared handle to a parameter's slot, for binding to a UI control.
    pub fn handle(&self, id: ParamId) -> Option<Arc<AtomicF64>> {
        self.index_of(id).map(|i| Arc::clone(&self.values[i]))
    }

    pub fn get(&self, id: ParamId) -> Option<f64> {
        self.index_of(id).map(|i| self.values[i].get())
    }

    /// Store a value, clamped and quantized to the parameter's range.
    pub fn set(&self, id: ParamId, value: f64) {
        if let Some(i) = self.index_of(id) {
            self.values[i].set(self.defs[i].clamp(value));
        }
    }

    pub fn set_by_key(&self, key: &str, value: f64) -> bool {
        match ParamId::from_key(key) {
            Some(id) => {
                self.set(id, value);
                true
            }
            None => false,
        }
    }

    /// Set parameter value by index (normalized 0-1)
    pub fn set_normalized(&self, index: usize, normalized: f64) {
        if let (Some(def), Some(value)) = (self.defs.get(index), self.values.get(index)) {
            let denormalized = def.denormalize(normalized.clamp(0.0, 1.0));
            value.set(def.clamp(denormalized));
        }
    }

    /// Read every slot into a typed snapshot. Does not allocate.
    pub fn snapshot(&self) -> ParamSnapshot {
        let mut snapshot = self.template.clone();
        for (def, value) in self.defs.iter().zip(&self.values) {
            snapshot.set(def.id, value.get());
        }
        snapshot
    }

    pub fn save_state(&self) -> VoiceState {
        self.snapshot().to_state()
    }

    /// Restore every slot from saved state. On error no slot is changed.
    pub fn load_state(&self, state: &VoiceState) -> Result<(), StateError> {
        let snapshot = ParamSnapshot::from_state(state)?;
        for (def, value) in self.defs.iter().zip(&self.values) {
            value.set(snapshot.get(def.id));
        }
        log::info!("loaded state with {} parameters", state.parameters.len());
        Ok(())
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Held MIDI note, updated from a MIDI callback and read by the audio thread.
///
/// Only one note is tracked: a note-on replaces the current note, and a
/// note-off releases it only if it matches the last note played.
#[derive(Debug)]
pub struct MidiNoteState {
    /// Semitones relative to [`REFERENCE_NOTE`]
    pitch: AtomicF64,
    held: AtomicBool,
    last_note: AtomicU8,
}

impl MidiNoteState {
    pub fn new() -> Self {
        Self {
            pitch: AtomicF64::new(0.0),
            held: AtomicBool::new(false),
            last_note: AtomicU8::new(0),
        }
    }

    /// Process a MIDI message (3-byte format)
    ///
    /// With `hold` set, note-offs are ignored and the note stays on.
    pub fn handle_message(&self, msg: &[u8], hold: bool) {
        if msg.len() < 3 {
            return;
        }

        let status = msg[0] & 0xF0;
        let note = msg[1] & 0x7F;
        match status {
            0x90 if msg[2] > 0 => {
                self.pitch.set(f64::from(note) - f64::from(REFERENCE_NOTE));
                self.last_note.store(note, Ordering::Relaxed);
                self.held.store(true, Ordering::Release);
            }
            // Note Off, or Note On with zero velocity
            0x80 | 0x90 => {
                if !hold && self.last_note.load(Ordering::Relaxed) == note {
                    self.held.store(false, Ordering::Release);
                }
            }
            _ => {}
        }
    }

    pub fn pitch_offset(&self) -> f64 {
        self.pitch.get()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Pitch offset and held flag.
    pub fn note(&self) -> (f64, bool) {
        (self.pitch_offset(), self.is_held())
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

impl Default for MidiNoteState {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot "trigger now" and "advance step now" buttons.
///
/// Any thread may press; the audio thread consumes each press once with an
/// exchange-and-clear.
#[derive(Debug, Default)]
pub struct ManualControls {
    trigger: AtomicBool,
    advance: AtomicBool,
}

impl ManualControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.trigger.store(true, Ordering::Release);
    }

    pub fn advance(&self) {
        self.advance.store(true, Ordering::Release);
    }

    /// Consume pending presses as `(trigger, advance)`.
    pub fn take(&self) -> (bool, bool) {
        (
            self.trigger.swap(false, Ordering::AcqRel),
            self.advance.swap(false, Ordering::AcqRel),
        )
    }
}

/// Transport state published by the audio thread after each block.
#[derive(Debug, Default)]
pub struct Telemetry {
    current_step: AtomicUsize,
    running: AtomicBool,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, step: usize, running: bool) {
        self.current_step.store(step, Ordering::Relaxed);
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_atomic_f64() {
        let a = AtomicF64::new(1.5);
        assert_eq!(a.get(), 1.5);
        a.set(-3.25);
        assert_eq!(a.load(Ordering::SeqCst), -3.25);
        let b = a.clone();
        a.set(0.0);
        assert_eq!(b.get(), -3.25);
    }

    #[test]
    fn test_store_clamps_and_snapshots() {
        let store = ParamStore::new();
        store.set(ParamId::Tempo, 500.0);
        store.set(ParamId::StepPitch(1), 12.0);
        assert!(store.set_by_key("delay_mix", 0.5));
        assert!(!store.set_by_key("no_such_key", 0.5));

        assert_eq!(store.get(ParamId::Tempo), Some(300.0));
        let snap = store.snapshot();
        assert_eq!(snap.tempo, 300.0);
        assert_eq!(snap.steps[1].pitch, 12.0);
        assert_eq!(snap.delay_mix, 0.5);
    }

    #[test]
    fn test_index_matches_layout_order() {
        let store = ParamStore::new();
        for (i, def) in store.defs().iter().enumerate() {
            assert_eq!(store.index_of(def.id), Some(i));
        }
        assert_eq!(store.index_of(ParamId::StepPitch(8)), None);
        assert_eq!(store.index_of(ParamId::ModAmount(4)), None);
        assert_eq!(store.get(ParamId::StepPan(8)), None);

        // Snapshots read the live values, not the template
        store.set(ParamId::ModAmount(3), -0.5);
        assert_eq!(store.snapshot().mod_slots[3].amount, -0.5);
        assert_eq!(ParamStore::new().snapshot(), ParamSnapshot::default());
    }

    #[test]
    fn test_normalized_set_quantizes_choices() {
        let store = ParamStore::new();
        let index = store.index_of(ParamId::LfoWave).unwrap();
        store.set_normalized(index, 0.45);
        // 0.45 * 5 = 2.25 -> 2
        assert_eq!(store.get(ParamId::LfoWave), Some(2.0));
    }

    #[test]
    fn test_handle_shares_slot_across_threads() {
        let store = ParamStore::new();
        let handle = store.handle(ParamId::Glide).unwrap();
        thread::spawn(move || handle.set(0.7)).join().unwrap();
        assert_eq!(store.snapshot().glide, 0.7);
    }

    #[test]
    fn test_state_save_load() {
        let a = ParamStore::new();
        a.set(ParamId::FilterCutoff, 3210.0);
        a.set(ParamId::ModSource(2), 3.0);

        let b = ParamStore::new();
        b.load_state(&a.save_state()).unwrap();
        assert_eq!(b.get(ParamId::FilterCutoff), Some(3210.0));
        assert_eq!(b.snapshot(), a.snapshot());
    }

    #[test]
    fn test_failed_load_leaves_store_untouched() {
        let store = ParamStore::new();
        store.set(ParamId::Swing, 0.8);
        let mut state = VoiceState::new();
        state.parameters.insert("swing".into(), 0.1);
        state.parameters.insert("tempo".into(), f64::NAN);
        assert!(store.load_state(&state).is_err());
        assert_eq!(store.get(ParamId::Swing), Some(0.8));
    }

    #[test]
    fn test_midi_note_on_off() {
        let midi = MidiNoteState::new();
        midi.handle_message(&[0x90, 48, 100], false);
        assert_eq!(midi.note(), (12.0, true));

        // Release of a different note is ignored
        midi.handle_message(&[0x80, 50, 0], false);
        assert!(midi.is_held());

        // Velocity-zero note-on releases
        midi.handle_message(&[0x91, 48, 0], false);
        assert!(!midi.is_held());
        assert_eq!(midi.pitch_offset(), 12.0);
    }

    #[test]
    fn test_midi_hold_ignores_note_off() {
        let midi = MidiNoteState::new();
        midi.handle_message(&[0x90, 30, 90], true);
        midi.handle_message(&[0x80, 30, 0], true);
        assert_eq!(midi.note(), (-6.0, true));

        // Other messages are ignored
        midi.handle_message(&[0xB0, 1, 64], false);
        midi.handle_message(&[0x90], false);
        assert!(midi.is_held());
    }

    #[test]
    fn test_manual_controls_fire_once() {
        let controls = ManualControls::new();
        assert_eq!(controls.take(), (false, false));
        controls.trigger();
        controls.trigger();
        assert_eq!(controls.take(), (true, false));
        assert_eq!(controls.take(), (false, false));
        controls.advance();
        assert_eq!(controls.take(), (false, true));
    }

    #[test]
    fn test_telemetry() {
        let telemetry = Telemetry::new();
        telemetry.publish(5, true);
        assert_eq!(telemetry.current_step(), 5);
        assert!(telemetry.is_running());
    }
}
