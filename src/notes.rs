// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Translating note names into frequencies.
//!
//! A [`NoteTable`] loaded from a file takes precedence. Names it does not know
//! fall back to standard notation in equal temperament (see [`Note::named_str`]).

use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};

use crate::lang::error::{PatchError, PatchResult};

/// A "note" is just an index on the keyboard.
/// This definition follows the MIDI standard where C4 corresponds to index 60.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Note(u8);

impl Note {
    /// Parse a name string of the format `<letter><offset><octave>`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use syn_patch::notes::*;
    ///
    /// assert_eq!(Note::named_str("A4"), Some(Note::from_midi(69)));
    /// assert_eq!(Note::named_str("a4"), Some(Note::from_midi(69)));
    /// assert_eq!(Note::named_str("C#6"), Some(Note::from_midi(85)));
    /// assert_eq!(Note::named_str("Gb2"), Some(Note::from_midi(42)));
    /// assert_eq!(Note::named_str("440"), None);
    /// ```
    pub fn named_str(name_str: &str) -> Option<Note> {
        let mut name_chars = name_str.chars();
        let name_index = match name_chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let offset_str = name_chars
            .as_str()
            .trim_end_matches(|ch: char| ch.is_ascii_digit() || ch == '-');
        let offset_index = match offset_str {
            "sharp" | "♯" | "#" => 1,
            "flat" | "♭" | "b" => -1,
            "" => 0,
            _ => return None,
        };

        let octave: i32 = name_chars.as_str()[offset_str.len()..].parse().ok()?;
        // C4 is MIDI note number 60
        let index = (octave + 1) * 12 + name_index + offset_index;
        Note::try_from_midi(index as i64)
    }

    pub fn from_midi(midi_note: u8) -> Note {
        assert!(midi_note < 128, "MIDI only has notes 0 - 127");
        Note(midi_note)
    }

    pub fn try_from_midi(midi_note: i64) -> Option<Note> {
        if (0..128).contains(&midi_note) {
            Some(Note(midi_note as u8))
        } else {
            None
        }
    }

    /// Return the note index in a signed type, convenient for further calculations.
    pub fn index(self) -> i32 {
        self.0 as i32
    }
}

/// Assigns a frequency to a reference note, all other notes follow in 12 tone equal temperament.
///
/// ```
/// # use syn_patch::notes::*;
/// assert_eq!(Tuning::default().frequency(Note::from_midi(57)), 220.0);
/// assert_eq!(Tuning::default().frequency(Note::from_midi(81)), 880.0);
/// ```
pub struct Tuning {
    pub reference_note: Note,
    pub reference_frequency: f64,
}

impl Tuning {
    pub fn frequency(&self, other: Note) -> f64 {
        let semitones = other.index() - self.reference_note.index();
        self.reference_frequency * 2.0f64.powf(semitones as f64 / 12.0)
    }
}

/// Concert pitch, A4 = 440 Hz.
impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            reference_note: Note::from_midi(69),
            reference_frequency: 440.0,
        }
    }
}

/// Frequencies of named notes, read from a note definition file.
///
/// Each line holds a frequency followed by one or more names for it.
/// `octave N` multiplies the frequencies of all following lines by `2^N`.
#[derive(Debug, Default, Clone)]
pub struct NoteTable {
    frequencies: HashMap<String, f64>,
}

impl NoteTable {
    /// Table without entries, only standard note names are understood.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut table = Self::new();
        let mut factor = 1.0;
        for (number, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("");
            let mut words = line.split_whitespace();
            let first = match words.next() {
                Some(first) => first,
                None => continue,
            };
            if first == "octave" {
                match words.next().and_then(|w| w.parse::<i32>().ok()) {
                    Some(octave) => factor = 2.0f64.powi(octave),
                    None => warn!("notes:{}: 'octave' needs a whole number", number + 1),
                }
                continue;
            }
            match first.parse::<f64>() {
                Ok(freq) if freq > 0.0 => {
                    for name in words {
                        table.frequencies.insert(name.to_owned(), freq * factor);
                    }
                }
                _ => warn!("notes:{}: ignoring '{}'", number + 1, line.trim()),
            }
        }
        debug!("loaded {} note names", table.frequencies.len());
        table
    }

    pub fn load(path: &Path) -> PatchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PatchError::ReadFile {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Frequency of a note name, if it is one.
    pub fn frequency(&self, name: &str) -> Option<f64> {
        if let Some(freq) = self.frequencies.get(name) {
            return Some(*freq);
        }
        Note::named_str(name).map(|note| Tuning::default().frequency(note))
    }
}
