// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Named snippets of patch text.
//!
//! ```text
//! define bass { low 300 sq 55 }
//! define tone sin 440:50
//! ```
//!
//! A define is stored as text, every use parses it again, so that each use
//! gets its own independent nodes.

use std::collections::HashMap;

use log::debug;

use super::error::{PatchError, PatchResult};
use super::lexer::{Token, TokenStream};

/// Limit of nested expansions before a define is considered recursive.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Default)]
pub struct Defines {
    bodies: HashMap<String, String>,
}

impl Defines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the name and body of a define, the `define` keyword has already been consumed.
    pub fn parse(&mut self, ts: &mut TokenStream, keyword: &Token) -> PatchResult<()> {
        let name = ts.next().ok_or_else(|| PatchError::MissingDefineName {
            location: keyword.location.clone(),
        })?;
        let body = if ts.eat("{") {
            ts.raw_block()
                .ok_or_else(|| PatchError::UnterminatedDefine {
                    name: name.text.clone(),
                    location: name.location.clone(),
                })?
        } else {
            ts.rest_of_line()
        };
        self.insert(name.text, body);
        Ok(())
    }

    pub fn insert(&mut self, name: String, body: String) {
        debug!("define {} = {}", name, body.trim());
        if self.bodies.insert(name.clone(), body).is_some() {
            debug!("define {} replaces an earlier definition", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.bodies.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> PatchResult<Defines> {
        let mut defines = Defines::new();
        let mut ts = TokenStream::new("test", text);
        while let Some(keyword) = ts.next() {
            assert_eq!(keyword.as_str(), "define");
            defines.parse(&mut ts, &keyword)?;
        }
        Ok(defines)
    }

    #[test]
    fn braced_and_line_bodies() {
        let defines = parse("define a { sin 440 { sq 220 } }\ndefine b tri 110").unwrap();
        assert_eq!(defines.get("a"), Some(" sin 440 { sq 220 } "));
        assert_eq!(defines.get("b"), Some("tri 110"));
        assert_eq!(defines.get("c"), None);
    }

    #[test]
    fn redefinition_overwrites() {
        let defines = parse("define a sin 1\ndefine a sin 2").unwrap();
        assert_eq!(defines.get("a"), Some("sin 2"));
    }

    #[test]
    fn malformed_defines() {
        assert!(matches!(
            parse("define"),
            Err(PatchError::MissingDefineName { .. })
        ));
        assert!(matches!(
            parse("define a { sin 440"),
            Err(PatchError::UnterminatedDefine { .. })
        ));
    }
}
