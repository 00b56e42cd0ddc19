// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Bits and pieces for working with positions in patch text.

use std::fmt;
use std::rc::Rc;

/// Position inside a text in a form that's useful for human readers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Pos {
    /// Line number, starting at 1
    pub line: usize,
    /// Position within the line, in characters, starting at 1
    pub column: usize,
}

/// Where a token came from: the name of its source and the position within.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Location {
    pub source: Rc<str>,
    pub pos: Pos,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.pos.line, self.pos.column)
    }
}

/// A data structure for mapping byte offsets to line/column based positions.
pub struct LineMap {
    /// Ordered vector of the position of line breaks (`\n`)
    line_offsets: Vec<usize>,
}

impl LineMap {
    pub fn new(s: &str) -> Self {
        Self {
            line_offsets: s
                .char_indices()
                .filter_map(|(pos, ch)| if ch == '\n' { Some(pos) } else { None })
                .collect(),
        }
    }

    /// The `source` must be the same string the map was created from.
    ///
    /// # Examples
    ///
    /// ```
    /// # use syn_patch::lang::span::{LineMap,Pos};
    /// let s = "abc\ndefg\naäb\n";
    /// let m = LineMap::new(s);
    /// assert_eq!(m.offset_to_pos(s, 0), Pos { line: 1, column: 1 });
    /// assert_eq!(m.offset_to_pos(s, 3), Pos { line: 1, column: 4 });
    /// assert_eq!(m.offset_to_pos(s, 4), Pos { line: 2, column: 1 });
    /// assert_eq!(m.offset_to_pos(s, 10), Pos { line: 3, column: 2 });
    /// assert_eq!(m.offset_to_pos(s, 12), Pos { line: 3, column: 3 });
    /// assert_eq!(m.offset_to_pos(s, 13), Pos { line: 3, column: 4 });
    /// ```
    pub fn offset_to_pos(&self, source: &str, offset: usize) -> Pos {
        // Either we hit exactly the `line`th line-break, or the offset lies before it.
        let line = match self.line_offsets.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line,
        };
        let previous_line_start = if line > 0 {
            self.line_offsets[line - 1] + 1
        } else {
            0
        };
        let column = source[previous_line_start..offset].chars().count() + 1;
        Pos {
            line: line + 1,
            column,
        }
    }
}
