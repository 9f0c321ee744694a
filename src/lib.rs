//! # Monovoice: Monophonic Percussion Synthesizer Voice
//!
//! `monovoice` is a real-time synth voice in the style of a semi-modular
//! drum-and-bass machine: two morphing oscillators, a sub oscillator and
//! noise into a four-pole ladder filter and VCA, driven by an eight-step
//! sequencer, three decay envelopes, an LFO and a four-slot modulation
//! matrix, followed by a tuned delay, ring modulator, panner and reverb send.
//!
//! ## Architecture
//!
//! - **DSP units** - [`oscillator`], [`envelope`], [`filter`], [`noise`],
//!   [`lfo`], [`slew`], [`fx`] and [`reverb`], each a plain struct with
//!   per-sample `process` methods and a shared [`unit::DspUnit`] lifecycle
//! - **Control** - [`sequencer`], [`quantizer`] and [`modulation`]
//! - **Parameters** - [`params`] defines every parameter, its range and the
//!   saved-state format
//! - **Engine** - [`engine::VoiceEngine`] renders blocks from a parameter
//!   snapshot
//! - **Host glue** - [`io`] holds the lock-free surfaces shared with UI and
//!   MIDI threads, and [`processor::VoiceProcessor`] ties them to an engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use monovoice::prelude::*;
//!
//! let mut voice = VoiceProcessor::new(48000.0);
//! voice.prepare(48000.0, 256);
//!
//! // Start the sequencer from any thread
//! let params = voice.params();
//! params.set(ParamId::SeqRun, 1.0);
//! params.set(ParamId::StepPitch(2), 7.0);
//!
//! // Audio callback
//! let mut left = vec![0.0; 256];
//! let mut right = vec![0.0; 256];
//! voice.process(&[], None, &mut left, Some(&mut right));
//! ```

pub mod engine;
pub mod envelope;
pub mod filter;
pub mod fx;
pub mod io;
pub mod lfo;
pub mod modulation;
pub mod noise;
pub mod oscillator;
pub mod params;
pub mod processor;
pub mod quantizer;
pub mod reverb;
pub mod sequencer;
pub mod slew;
pub mod unit;

/// Prelude module for convenient imports
pub mod prelude {
    // DSP units
    pub use crate::envelope::Envelope;
    pub use crate::filter::{FilterMode, LadderFilter, OnePole};
    pub use crate::fx::{equal_power_pan, DelayLine, RingModulator, TunedDelay};
    pub use crate::lfo::{Lfo, LfoShape};
    pub use crate::noise::NoiseGenerator;
    pub use crate::oscillator::Oscillator;
    pub use crate::reverb::{Freeverb, ReverbSend, ReverbSettings, StereoReverb};
    pub use crate::slew::{Glide, Smoother};
    pub use crate::unit::{prepare_all, DspUnit};

    // Control
    pub use crate::modulation::{ModDestination, ModMatrix, ModSlot, ModSource, RandomSource};
    pub use crate::quantizer::{quantize, Scale};
    pub use crate::sequencer::{Direction, Sequencer, Step};

    // Parameters and state
    pub use crate::params::{
        param_layout, ParamDef, ParamId, ParamSnapshot, PitchRouting, StateError, VoiceState,
    };

    // Engine and host glue
    pub use crate::engine::{BlockContext, HostTransport, VoiceEngine};
    pub use crate::io::{AtomicF64, ManualControls, MidiNoteState, ParamStore, Telemetry};
    pub use crate::processor::VoiceProcessor;
}
