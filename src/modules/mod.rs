//! Modules module
//!
//! Built-in synthesizer components.
//! Includes oscillators, the audio output, a biquad filter, envelopes, the LFO
//! and the MIDI input.

pub mod biquad_filter;
pub mod envelope;
pub mod lfo;
pub mod midi_input;
pub mod oscillator;
pub mod output;
pub mod poly_oscillator;

// Re-export commonly used types
pub use biquad_filter::{BiquadFilter, Coefficients, FilterKind};
pub use envelope::{Envelope, EnvelopeKind};
pub use lfo::Lfo;
pub use midi_input::MidiInput;
pub use oscillator::{Oscillator, Phasor};
pub use output::AudioOutput;
pub use poly_oscillator::{PolyOscillator, Voice};
