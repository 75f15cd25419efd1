// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Timed note values and sequences of them.
//!
//! Notes are validated once, when they enter the crate. Everything downstream
//! trusts the ranges checked here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The highest value a MIDI pitch or velocity may take.
pub const MAX_MIDI_VALUE: u8 = 127;

/// Errors produced when constructing or loading notes.
#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("pitch {0} is outside the MIDI range 0-127")]
    Pitch(i64),

    #[error("velocity {0} is outside the MIDI range 0-127")]
    Velocity(i64),

    #[error("start time {0} must be a finite, non-negative number of seconds")]
    StartTime(f64),

    #[error("duration {0} must be a finite number of seconds")]
    Duration(f64),

    #[error("unable to parse notes: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single timed musical event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNote")]
pub struct Note {
    /// MIDI semitone number.
    pitch: u8,
    /// Seconds after playback start.
    start_time: f64,
    /// Length in seconds. Not clamped here; the synthesizer applies its own floor.
    duration: f64,
    /// MIDI velocity.
    velocity: u8,
}

/// The unchecked shape of a note as it appears in JSON or YAML.
#[derive(Deserialize)]
struct RawNote {
    pitch: i64,
    start_time: f64,
    duration: f64,
    velocity: i64,
}

impl TryFrom<RawNote> for Note {
    type Error = NoteError;

    fn try_from(raw: RawNote) -> Result<Self, Self::Error> {
        let pitch = u8::try_from(raw.pitch).map_err(|_| NoteError::Pitch(raw.pitch))?;
        let velocity = u8::try_from(raw.velocity).map_err(|_| NoteError::Velocity(raw.velocity))?;
        Note::new(pitch, raw.start_time, raw.duration, velocity)
    }
}

impl Note {
    /// Creates a new note, rejecting values outside of the MIDI ranges and
    /// non-finite times.
    pub fn new(pitch: u8, start_time: f64, duration: f64, velocity: u8) -> Result<Note, NoteError> {
        if pitch > MAX_MIDI_VALUE {
            return Err(NoteError::Pitch(pitch.into()));
        }
        if velocity > MAX_MIDI_VALUE {
            return Err(NoteError::Velocity(velocity.into()));
        }
        if !start_time.is_finite() || start_time < 0.0 {
            return Err(NoteError::StartTime(start_time));
        }
        if !duration.is_finite() {
            return Err(NoteError::Duration(duration));
        }

        Ok(Note {
            pitch,
            start_time,
            duration,
            velocity,
        })
    }

    /// Returns the MIDI pitch.
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    /// Returns the start time in seconds, relative to playback start.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Returns the authored duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Returns the MIDI velocity.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }
}

/// Notes files may be a bare list or an object with a `notes` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum NotesDocument {
    List(Vec<Note>),
    Wrapped { notes: Vec<Note> },
}

impl From<NotesDocument> for NoteSequence {
    fn from(document: NotesDocument) -> Self {
        match document {
            NotesDocument::List(notes) | NotesDocument::Wrapped { notes } => NoteSequence(notes),
        }
    }
}

/// An ordered collection of notes. Notes may overlap and need not be sorted;
/// each is scheduled independently by its own start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteSequence(Vec<Note>);

impl NoteSequence {
    /// Creates a sequence from already validated notes.
    pub fn new(notes: Vec<Note>) -> NoteSequence {
        NoteSequence(notes)
    }

    /// Parses a sequence from JSON.
    pub fn from_json(json: &str) -> Result<NoteSequence, NoteError> {
        serde_json::from_str::<NotesDocument>(json)
            .map(NoteSequence::from)
            .map_err(|e| NoteError::Parse(e.to_string()))
    }

    /// Parses a sequence from YAML.
    pub fn from_yaml(yaml: &str) -> Result<NoteSequence, NoteError> {
        serde_yml::from_str::<NotesDocument>(yaml)
            .map(NoteSequence::from)
            .map_err(|e| NoteError::Parse(e.to_string()))
    }

    /// Loads a sequence from a file, choosing the parser by extension. Anything
    /// that isn't `.yaml` or `.yml` is treated as JSON.
    pub fn load(path: &Path) -> Result<NoteSequence, NoteError> {
        let contents = fs::read_to_string(path)?;
        let extension = path.extension();
        if extension.is_some_and(|ext| ext == "yaml" || ext == "yml") {
            NoteSequence::from_yaml(&contents)
        } else {
            NoteSequence::from_json(&contents)
        }
    }

    /// Returns true if there are no notes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of notes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the notes in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Note> {
        self.0.iter()
    }

    /// Returns the latest authored note end, in seconds after playback start.
    pub fn end_time(&self) -> f64 {
        self.0
            .iter()
            .map(|note| note.start_time + note.duration.max(0.0))
            .fold(0.0, f64::max)
    }
}

impl<'a> IntoIterator for &'a NoteSequence {
    type Item = &'a Note;
    type IntoIter = std::slice::Iter<'a, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Note> for NoteSequence {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        NoteSequence(iter.into_iter().collect())
    }
}
