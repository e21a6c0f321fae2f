//! MIDI notes, events and per-note state tracking.

use serde::{Deserialize, Serialize};

/// Number of addressable MIDI notes.
pub const NOTE_COUNT: usize = 128;

/// A note number with its velocity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MidiNote {
    pub note: u8,
    pub velocity: u8,
}

impl MidiNote {
    /// Creates a note, clamping both fields to 0..=127.
    pub fn new(note: u8, velocity: u8) -> Self {
        Self {
            note: note.min(127),
            velocity: velocity.min(127),
        }
    }

    /// Equal-tempered frequency with A4 (note 69) at 440 Hz.
    pub fn frequency(&self) -> f64 {
        note_frequency(self.note)
    }

    /// Velocity mapped to 0.0-1.0.
    pub fn amplitude(&self) -> f64 {
        self.velocity as f64 / 127.0
    }
}

/// Equal-tempered frequency of a note number.
pub fn note_frequency(note: u8) -> f64 {
    440.0 * ((note.min(127) as f64 - 69.0) / 12.0).exp2()
}

/// Note events travelling along MIDI connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiEvent {
    /// A key was pressed.
    NoteOn { note: u8, velocity: u8 },
    /// A key was released; sound may continue through a release stage.
    NoteOff { note: u8 },
    /// The note is finished and any voice playing it can be freed.
    NoteEnd { note: u8 },
}

impl MidiEvent {
    /// Note number carried by the event.
    pub fn note(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { note, .. }
            | MidiEvent::NoteOff { note }
            | MidiEvent::NoteEnd { note } => note,
        }
    }
}

/// State of one tracked note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteState {
    /// True while the key is held.
    pub pressed: bool,
    pub velocity: u8,
    /// Seconds since the last press or release.
    pub time: f64,
}

/// Fixed-size table of note states, indexed by note number.
///
/// Never allocates after construction, so it can live on the processing thread.
#[derive(Clone, Debug)]
pub struct NoteTracker {
    notes: [Option<NoteState>; NOTE_COUNT],
}

impl NoteTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            notes: [None; NOTE_COUNT],
        }
    }

    /// Marks a note pressed and restarts its clock.
    ///
    /// Returns true if the note was already tracked (a re-press).
    pub fn press(&mut self, note: u8, velocity: u8) -> bool {
        let slot = &mut self.notes[note.min(127) as usize];
        let repress = slot.is_some();
        *slot = Some(NoteState {
            pressed: true,
            velocity,
            time: 0.0,
        });
        repress
    }

    /// Marks a note released and restarts its clock.
    ///
    /// Returns false if the note is not tracked.
    pub fn release(&mut self, note: u8) -> bool {
        match &mut self.notes[note.min(127) as usize] {
            Some(state) => {
                state.pressed = false;
                state.time = 0.0;
                true
            }
            None => false,
        }
    }

    /// Stops tracking a note.
    pub fn remove(&mut self, note: u8) -> Option<NoteState> {
        self.notes[note.min(127) as usize].take()
    }

    /// Returns the state of a note.
    pub fn get(&self, note: u8) -> Option<&NoteState> {
        self.notes[note.min(127) as usize].as_ref()
    }

    /// Advances the clock of every tracked note.
    pub fn advance(&mut self, dt: f64) {
        for state in self.notes.iter_mut().flatten() {
            state.time += dt;
        }
    }

    /// Iterates over tracked notes.
    pub fn active(&self) -> impl Iterator<Item = (u8, &NoteState)> + '_ {
        self.notes
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i as u8, s)))
    }

    /// Number of tracked notes.
    pub fn len(&self) -> usize {
        self.notes.iter().flatten().count()
    }

    /// Returns true if no note is tracked.
    pub fn is_empty(&self) -> bool {
        self.notes.iter().all(Option::is_none)
    }

    /// Forgets every note.
    pub fn clear(&mut self) {
        self.notes = [None; NOTE_COUNT];
    }
}

impl Default for NoteTracker {
    fn default() -> Self {
        Self::new()
    }
}
