// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Turns a stream of tokens into a tree of nodes.
//!
//! The factory reads one logical unit at a time. Directives are handled
//! in place, identifiers are dispatched to the registry or expanded from
//! the defines, and everything else is left for the caller to interpret.

use std::path::Path;

use log::{debug, info, warn, LevelFilter};

use super::args::{self, clamp_warn};
use super::defines::{Defines, MAX_DEPTH};
use super::error::{PatchError, PatchResult};
use super::lexer::{Token, TokenStream};
use crate::engine::Settings;
use crate::node::routing::Mixer;
use crate::node::{BoxedNode, Registry};
use crate::notes::NoteTable;

/// Frequencies are limited to this range, in Hz.
pub const FREQUENCY_RANGE: (f64, f64) = (0.001, 30_000.0);

pub struct Factory {
    registry: Registry,
    defines: Defines,
    settings: Settings,
    notes: NoteTable,
    /// Once the audio output runs, sample rate and buffer size are fixed.
    started: bool,
    /// Nodes keep the sample rate they were built with.
    built: bool,
    depth: usize,
}

impl Factory {
    pub fn new(registry: Registry) -> Self {
        Self::with_settings(registry, Settings::default())
    }

    pub fn with_settings(registry: Registry, settings: Settings) -> Self {
        Self {
            registry,
            defines: Defines::new(),
            settings,
            notes: NoteTable::new(),
            started: false,
            built: false,
            depth: 0,
        }
    }

    pub fn set_notes(&mut self, notes: NoteTable) {
        self.notes = notes;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sample_rate(&self) -> f64 {
        self.settings.sample_rate as f64
    }

    /// Freeze the engine settings, later changes from directives are rejected.
    pub fn mark_started(&mut self) {
        self.started = true;
    }

    /// Build every root generator of a patch.
    pub fn build_all(&mut self, ts: &mut TokenStream) -> PatchResult<Vec<BoxedNode>> {
        let mut roots = Vec::new();
        loop {
            match self.build(ts, false)? {
                Some(node) => roots.push(node),
                None => match ts.next() {
                    Some(token) => return Err(unknown(&token)),
                    None => break,
                },
            }
        }
        if roots.is_empty() {
            return Err(PatchError::EmptyPatch);
        }
        info!("built {} root generator(s)", roots.len());
        Ok(roots)
    }

    /// Read one logical unit from the stream.
    ///
    /// Returns `None` at the end of the input or at a word that is not a generator,
    /// unless `required` is set, in which case these are errors.
    pub fn build(
        &mut self,
        ts: &mut TokenStream,
        required: bool,
    ) -> PatchResult<Option<BoxedNode>> {
        loop {
            let token = match ts.next() {
                Some(token) => token,
                None if required => {
                    return Err(PatchError::MissingGenerator {
                        context: "end of patch".to_owned(),
                        location: ts.location(),
                    })
                }
                None => return Ok(None),
            };

            if token.as_str().ends_with(".synth") {
                self.include(ts, &token)?;
                continue;
            }
            if self.directive(ts, &token)? {
                continue;
            }

            let node = if let Some(prototype) = self.registry.lookup(token.as_str()).copied() {
                (prototype.build)(self, ts, &token)?
            } else if let Some(body) = self.defines.get(token.as_str()) {
                let body = body.to_owned();
                self.expand(&token, &body)?
            } else if required {
                return Err(unknown(&token));
            } else {
                ts.putback(token);
                return Ok(None);
            };

            if required && !node.is_valid() {
                return Err(missing(&token));
            }
            self.built = true;
            return Ok(Some(node));
        }
    }

    /// Build the mandatory child generator of `keyword`.
    pub fn child(&mut self, ts: &mut TokenStream, keyword: &Token) -> PatchResult<BoxedNode> {
        if ts.is_exhausted() {
            return Err(missing(keyword));
        }
        self.build(ts, true)?.ok_or_else(|| missing(keyword))
    }

    /// Read `FREQ[:VOLUME]`, where the frequency may be a note name.
    /// The volume defaults to 100%.
    pub fn freq_vol(&mut self, ts: &mut TokenStream, keyword: &Token) -> PatchResult<(f64, f64)> {
        let token = args::next_arg(ts, keyword, "frequency")?;
        let (freq, vol) = match token.as_str().split_once(':') {
            Some((freq, vol)) => (freq, Some(vol)),
            None => (token.as_str(), None),
        };
        let freq = match self.notes.frequency(freq) {
            Some(freq) => freq,
            None => freq.parse::<f64>().ok().filter(|f| f.is_finite()).ok_or_else(|| {
                PatchError::InvalidNumber {
                    token: token.text.clone(),
                    what: "frequency or note".to_owned(),
                    location: token.location.clone(),
                }
            })?,
        };
        let freq = clamp_warn(
            freq,
            FREQUENCY_RANGE.0,
            FREQUENCY_RANGE.1,
            "frequency",
            &token.location,
        );
        let vol = match vol {
            Some(vol) => args::parse_volume(vol, &token)?,
            None => 1.0,
        };
        Ok((freq, vol))
    }

    fn include(&mut self, ts: &mut TokenStream, token: &Token) -> PatchResult<()> {
        let path = Path::new(token.as_str());
        if ts.depth() + self.depth >= MAX_DEPTH {
            return Err(PatchError::RecursiveInclude {
                path: path.to_owned(),
                location: token.location.clone(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| PatchError::ReadFile {
            path: path.to_owned(),
            source,
        })?;
        debug!("including {}", path.display());
        ts.include(token.as_str(), text);
        Ok(())
    }

    /// Handle a directive. Returns false if the token is not one.
    fn directive(&mut self, ts: &mut TokenStream, token: &Token) -> PatchResult<bool> {
        match token.as_str() {
            "print" => {
                let line = ts.rest_of_line();
                if self.settings.echo {
                    println!("{}", line);
                }
            }
            "-q" => self.settings.echo = false,
            "-v" => {
                self.settings.verbosity = self.settings.verbosity.saturating_add(1);
                let level = match self.settings.verbosity {
                    1 => LevelFilter::Debug,
                    _ => LevelFilter::Trace,
                };
                if level > log::max_level() {
                    log::set_max_level(level);
                }
            }
            "-b" => {
                let (min, max) = Settings::BUFFER_SIZE_RANGE;
                let size = args::number_in(ts, token, "buffer size", min as f64, max as f64)?;
                if self.started {
                    warn!("{}: buffer size cannot change while playing", token.location);
                } else {
                    self.settings.buffer_size = size as u16;
                }
            }
            "-s" => {
                let (min, max) = Settings::SAMPLE_RATE_RANGE;
                let rate = args::number_in(ts, token, "sample rate", min as f64, max as f64)?;
                if self.started {
                    warn!("{}: sample rate cannot change while playing", token.location);
                } else if self.built {
                    warn!(
                        "{}: sample rate cannot change after generators were built",
                        token.location
                    );
                } else {
                    self.settings.sample_rate = rate as u32;
                }
            }
            "define" => self.defines.parse(ts, token)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Build the nodes of a define in a stream of their own.
    fn expand(&mut self, token: &Token, body: &str) -> PatchResult<BoxedNode> {
        if self.depth >= MAX_DEPTH {
            return Err(PatchError::RecursiveDefine {
                name: token.text.clone(),
                location: token.location.clone(),
            });
        }
        self.depth += 1;
        let mut stream = TokenStream::new(&format!("define {}", token.text), body);
        let nodes = self.build_units(&mut stream);
        self.depth -= 1;

        let mut nodes = nodes?;
        match nodes.len() {
            0 => Err(missing(token)),
            1 => Ok(nodes.remove(0)),
            _ => Ok(Box::new(Mixer::new(nodes))),
        }
    }

    fn build_units(&mut self, ts: &mut TokenStream) -> PatchResult<Vec<BoxedNode>> {
        let mut nodes = Vec::new();
        while let Some(node) = self.build(ts, false)? {
            nodes.push(node);
        }
        match ts.next() {
            Some(token) => Err(unknown(&token)),
            None => Ok(nodes),
        }
    }
}

fn unknown(token: &Token) -> PatchError {
    PatchError::UnknownGenerator {
        keyword: token.text.clone(),
        location: token.location.clone(),
    }
}

fn missing(token: &Token) -> PatchError {
    PatchError::MissingGenerator {
        context: token.text.clone(),
        location: token.location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::render;
    use expect_test::{expect, Expect};

    fn factory() -> Factory {
        Factory::new(Registry::standard().unwrap())
    }

    fn build_all(text: &str) -> PatchResult<Vec<BoxedNode>> {
        factory().build_all(&mut TokenStream::new("patch", text))
    }

    fn check_error(text: &str, expected: Expect) {
        match build_all(text) {
            Ok(roots) => panic!("expected an error, got {} roots", roots.len()),
            Err(err) => expected.assert_eq(&err.to_string()),
        }
    }

    #[test]
    fn diagnostics() {
        check_error("sin 440 foo", expect![[r#"patch:1:9: unknown generator type 'foo'"#]]);
        check_error("low 100", expect![[r#"patch:1:1: missing generator for 'low'"#]]);
        check_error(
            "low 100 bar",
            expect![[r#"patch:1:9: unknown generator type 'bar'"#]],
        );
        check_error("", expect![[r#"the patch does not contain any generator"#]]);
        check_error("# only a comment\n-q", expect![[r#"the patch does not contain any generator"#]]);
        check_error(
            "{ sin 440\n  sq 220",
            expect![[r#"patch:1:1: missing '}' at the end of the mixer"#]],
        );
        check_error(
            "adsr 100:50 50:10 sin 440",
            expect![[r#"patch:1:13: envelope times must be strictly increasing (previous 100 ms, current 50 ms)"#]],
        );
        check_error(
            "sin x4",
            expect![[r#"patch:1:5: 'x4' is not a valid frequency or note"#]],
        );
        check_error(
            "define loop { loop }\nloop",
            expect![[r#"define loop:1:2: define 'loop' expands into itself"#]],
        );
    }

    #[test]
    fn roots_and_defines() {
        let roots = build_all("sin 440\ndefine two { sq 100 sq 200 }\ntwo two").unwrap();
        assert_eq!(roots.len(), 3);
    }

    #[test]
    fn each_define_use_is_independent() {
        let mut roots = build_all("define ramp { sin 1000 }\nramp ramp").unwrap();
        let mut second = roots.pop().unwrap();
        let mut first = roots.pop().unwrap();
        render(first.as_mut(), 10);
        let ahead = render(first.as_mut(), 1)[0];
        let fresh = render(second.as_mut(), 1)[0];
        assert_eq!(fresh.left, 0.0);
        assert!(ahead.left != 0.0);
    }

    #[test]
    fn directives_change_settings() {
        let mut factory = factory();
        let mut ts = TokenStream::new("patch", "-q -s 44100 -b 4 print hello there\nsin a4");
        let roots = factory.build_all(&mut ts).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(factory.settings().sample_rate, 44100);
        assert_eq!(factory.settings().buffer_size, 16);
        assert!(!factory.settings().echo);

        factory.mark_started();
        let mut ts = TokenStream::new("patch", "-s 8000 sin 1");
        factory.build_all(&mut ts).unwrap();
        assert_eq!(factory.settings().sample_rate, 44100);
    }

    #[test]
    fn sample_rate_is_fixed_once_generators_exist() {
        let mut factory = factory();
        let mut ts = TokenStream::new("patch", "sin 480 -s 24000");
        let mut roots = factory.build_all(&mut ts).unwrap();
        assert_eq!(factory.settings().sample_rate, 48_000);
        // A quarter period at the output rate reaches the peak
        let samples = render(roots[0].as_mut(), 26);
        assert!((samples[25].left - 1.0).abs() < 1e-9);

        let mut factory = self::factory();
        let mut ts = TokenStream::new("patch", "-s 24000 sin 600");
        let mut roots = factory.build_all(&mut ts).unwrap();
        assert_eq!(factory.settings().sample_rate, 24_000);
        let samples = render(roots[0].as_mut(), 11);
        assert!((samples[10].left - 1.0).abs() < 1e-9);
    }

    #[test]
    fn verbosity_directive_raises_log_level() {
        build_all("-v sin 440").unwrap();
        assert!(log::max_level() >= LevelFilter::Debug);
    }

    #[test]
    fn frequency_and_volume() {
        let mut factory = factory();
        factory.set_notes(NoteTable::parse("100 foo"));
        let mut ts = TokenStream::new("patch", "foo:50 a4 250.5:-10 99999");
        let keyword = ts.peek().unwrap().clone();
        assert_eq!(factory.freq_vol(&mut ts, &keyword).unwrap(), (100.0, 0.5));
        assert_eq!(factory.freq_vol(&mut ts, &keyword).unwrap(), (440.0, 1.0));
        assert_eq!(factory.freq_vol(&mut ts, &keyword).unwrap(), (250.5, -0.1));
        assert_eq!(factory.freq_vol(&mut ts, &keyword).unwrap(), (30_000.0, 1.0));
    }

    #[test]
    fn included_files() {
        let path = std::env::temp_dir().join(format!("syn-patch-{}.synth", std::process::id()));
        std::fs::write(&path, "define inc sin 220\n").unwrap();
        let text = format!("{} inc", path.display());
        let roots = build_all(&text).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(roots.len(), 1);

        assert!(matches!(
            build_all("missing-file.synth sin 1"),
            Err(PatchError::ReadFile { .. })
        ));
    }

    #[test]
    fn self_including_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("syn-patch-self-{}.synth", std::process::id()));
        std::fs::write(&path, format!("{} sin 1\n", path.display())).unwrap();
        let result = build_all(&path.display().to_string());
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(PatchError::RecursiveInclude { .. })));
    }
}
