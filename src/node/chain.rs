// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A sequencer playing its children one after another.
//!
//! ```text
//! chain adsr 10:100 150:50 200:0 ms 200 mix 20 gaps 50
//!     sin c4  sin e4  x2 sin g4  loop
//! end
//! ```
//!
//! Every segment lasts for the default duration (`ms`, 200 ms unless given),
//! `Nms` before a segment sets its duration explicitly and `xK` makes it last `K`
//! times the default. `gaps` inserts silence after every segment, `mix` crossfades
//! into the following segment. The optional envelope restarts at every segment.

use super::envelope::Curve;
use super::{sample, BoxedNode, Node, Prototype, Registry, RegistryError};
use crate::lang::args;
use crate::lang::error::{PatchError, PatchResult};
use crate::lang::factory::Factory;
use crate::lang::lexer::{Token, TokenStream};
use crate::wave::Stereo;

pub const DEFAULT_SEGMENT_MS: f64 = 200.0;
/// Longest segment, gap or crossfade: one hour.
pub const MAX_SEGMENT_MS: f64 = 3_600_000.0;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(Prototype {
        kind: "chain",
        aliases: &["chain"],
        build: |factory, ts, keyword| Ok(Box::new(parse_chain(factory, ts, keyword)?)),
    })
}

fn to_samples(ms: f64, sample_rate: f64) -> usize {
    (ms * sample_rate / 1000.0).round() as usize
}

/// Duration prefix of a segment, `Nms` or `xK`.
fn segment_duration(token: &Token, default_ms: f64) -> Option<PatchResult<f64>> {
    let text = token.as_str();
    let (number, factor) = if let Some(ms) = text.strip_suffix("ms") {
        (ms, 1.0)
    } else if let Some(multiple) = text.strip_prefix('x') {
        (multiple, default_ms)
    } else {
        return None;
    };
    // Only treat the token as a duration if it looks like a number at all
    if !number.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    Some(
        args::parse_str(number, token, "segment duration")
            .and_then(|value| segment_ms(value * factor, token)),
    )
}

/// A positive duration, clamped to [`MAX_SEGMENT_MS`].
fn segment_ms(value: f64, token: &Token) -> PatchResult<f64> {
    if value > 0.0 {
        Ok(args::clamp_warn(
            value,
            0.0,
            MAX_SEGMENT_MS,
            "segment duration",
            &token.location,
        ))
    } else {
        Err(PatchError::InvalidNumber {
            token: token.text.clone(),
            what: "segment duration".to_owned(),
            location: token.location.clone(),
        })
    }
}

fn parse_chain(factory: &mut Factory, ts: &mut TokenStream, keyword: &Token) -> PatchResult<Chain> {
    let sample_rate = factory.sample_rate();
    let mut envelope = None;
    let mut default_ms = DEFAULT_SEGMENT_MS;
    let mut mix_ms = 0.0;
    let mut gap_ms = 0.0;

    while let Some(option) = args::choice(ts, &["adsr", "ms", "mix", "gaps"]) {
        match option {
            "adsr" => envelope = Some(Curve::parse(ts, keyword, sample_rate)?),
            "ms" => {
                let token = args::next_arg(ts, keyword, "segment duration")?;
                default_ms = segment_ms(args::parse_number(&token, "segment duration")?, &token)?;
            }
            "mix" => mix_ms = args::number_in(ts, keyword, "crossfade duration", 0.0, MAX_SEGMENT_MS)?,
            _ => gap_ms = args::number_in(ts, keyword, "gap duration", 0.0, MAX_SEGMENT_MS)?,
        }
    }

    let mut segments = Vec::new();
    let mut looping = false;
    let mut start: usize = 0;
    loop {
        let token = args::next_arg(ts, keyword, "'end'")?;
        match token.as_str() {
            "end" => break,
            "loop" => {
                looping = true;
                continue;
            }
            _ => {}
        }
        let ms = match segment_duration(&token, default_ms) {
            Some(ms) => ms?,
            None => {
                ts.putback(token);
                default_ms
            }
        };
        let node = factory.child(ts, keyword)?;
        let end = start.saturating_add(to_samples(ms, sample_rate).max(1));
        segments.push(Segment {
            start,
            end,
            node: Some(node),
        });
        start = end;
        if gap_ms > 0.0 {
            let end = start.saturating_add(to_samples(gap_ms, sample_rate).max(1));
            segments.push(Segment {
                start,
                end,
                node: None,
            });
            start = end;
        }
    }

    Ok(Chain {
        segments,
        envelope,
        mix: to_samples(mix_ms, sample_rate),
        looping,
        position: 0,
        index: 0,
        prerolled: false,
        holding: false,
    })
}

/// One part of the sequence, a silent gap if there is no node.
pub struct Segment {
    /// First sample of the segment
    start: usize,
    /// First sample after the segment
    end: usize,
    node: Option<BoxedNode>,
}

impl Segment {
    fn sample(&mut self, speed: f64) -> Stereo<f64> {
        match &mut self.node {
            Some(node) => sample(node.as_mut(), speed),
            None => Stereo::ZERO,
        }
    }

    fn reset(&mut self) {
        if let Some(node) = &mut self.node {
            node.reset();
        }
    }
}

pub struct Chain {
    segments: Vec<Segment>,
    envelope: Option<Curve>,
    /// Crossfade length in samples
    mix: usize,
    looping: bool,
    /// Samples since the start of the sequence
    position: usize,
    index: usize,
    /// The segment after the current one is already playing because of a crossfade.
    prerolled: bool,
    /// The last segment has been reached and plays on forever.
    holding: bool,
}

impl Chain {
    pub fn segment_index(&self) -> usize {
        self.index
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn enter_next_segment(&mut self) {
        if self.index + 1 < self.segments.len() {
            self.index += 1;
            if !self.prerolled {
                self.segments[self.index].reset();
            }
        } else if self.looping {
            self.position = 0;
            self.index = 0;
            self.segments.iter_mut().for_each(Segment::reset);
        } else {
            self.holding = true;
            return;
        }
        self.prerolled = false;
        if let Some(envelope) = &mut self.envelope {
            envelope.restart();
        }
    }

    /// Blend factor of the following segment, if a crossfade is in progress.
    fn crossfade(&self) -> Option<f64> {
        if self.mix == 0 || self.holding || self.index + 1 >= self.segments.len() {
            return None;
        }
        let segment = &self.segments[self.index];
        let window_start = segment.end.saturating_sub(self.mix).max(segment.start);
        if self.position < window_start {
            return None;
        }
        let length = (segment.end - window_start) as f64;
        Some((self.position - window_start + 1) as f64 / (length + 1.0))
    }
}

impl Node for Chain {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        if self.segments.is_empty() {
            return;
        }
        if !self.holding && self.position >= self.segments[self.index].end {
            self.enter_next_segment();
        }

        let mut x = self.segments[self.index].sample(speed);
        if let Some(alpha) = self.crossfade() {
            let next = &mut self.segments[self.index + 1];
            if !self.prerolled {
                next.reset();
                self.prerolled = true;
            }
            x = x * (1.0 - alpha) + next.sample(speed) * alpha;
        }
        if let Some(envelope) = &mut self.envelope {
            x = x * envelope.next_level();
        }
        *out += x;
        self.position += 1;
    }

    fn reset(&mut self) {
        self.position = 0;
        self.index = 0;
        self.prerolled = false;
        self.holding = false;
        self.segments.iter_mut().for_each(Segment::reset);
        if let Some(envelope) = &mut self.envelope {
            envelope.restart();
        }
    }

    /// Valid if it has something to play, and everything it plays is valid.
    fn is_valid(&self) -> bool {
        let mut nodes = self.segments.iter().filter_map(|s| s.node.as_ref()).peekable();
        nodes.peek().is_some() && nodes.all(|node| node.is_valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{render, try_build};
    use crate::node::Registry;

    fn chain(text: &str) -> Chain {
        let mut factory = Factory::new(Registry::standard().unwrap());
        let mut ts = TokenStream::new("test", text);
        let keyword = ts.next().unwrap();
        parse_chain(&mut factory, &mut ts, &keyword).unwrap()
    }

    fn levels(chain: &mut Chain, count: usize) -> Vec<f64> {
        render(chain, count).iter().map(|s| s.left).collect()
    }

    #[test]
    fn third_segment_starts_at_400ms() {
        let mut chain = chain("chain sin 100 sin 200 sin 300 end");
        assert_eq!(chain.segment_count(), 3);
        render(&mut chain, 19_200);
        assert_eq!(chain.segment_index(), 1);
        render(&mut chain, 1);
        assert_eq!(chain.segment_index(), 2);
    }

    #[test]
    fn explicit_durations_and_gaps() {
        let mut chain = chain("chain ms 1 gaps 0.5 2ms level 1 x3 level 0.5 end");
        // 96 samples, 24 gap, 144 samples, 24 gap
        assert_eq!(chain.segment_count(), 4);
        let out = levels(&mut chain, 400);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[95], 1.0);
        assert_eq!(out[96], 0.0);
        assert_eq!(out[120], 0.5);
        assert_eq!(out[263], 0.5);
        assert_eq!(out[264], 0.0);
        // Without loop, the last segment, here a gap, keeps playing
        assert_eq!(out[399], 0.0);
        assert_eq!(chain.segment_index(), 3);
    }

    #[test]
    fn loop_restarts_sequence() {
        let mut chain = chain("chain ms 1 level 1 level 0.5 loop end");
        let out = levels(&mut chain, 200);
        assert_eq!(out[47], 1.0);
        assert_eq!(out[48], 0.5);
        assert_eq!(out[96], 1.0);
        assert_eq!(out[144], 0.5);
    }

    #[test]
    fn crossfade_blends_into_next_segment() {
        let mut chain = chain("chain ms 1 mix 0.5 level 0 level 1 end");
        let out = levels(&mut chain, 60);
        assert_eq!(out[23], 0.0);
        assert!((out[24] - 1.0 / 25.0).abs() < 1e-12);
        assert!((out[47] - 24.0 / 25.0).abs() < 1e-12);
        assert_eq!(out[48], 1.0);
    }

    #[test]
    fn envelope_restarts_per_segment() {
        let mut chain = chain("chain adsr 1:100 ms 2 level 1 level 1 end");
        let out = levels(&mut chain, 120);
        assert!((out[23] - 0.5).abs() < 1e-9);
        assert!((out[95] - 1.0).abs() < 1e-9);
        assert!((out[96] - 1.0 / 48.0).abs() < 1e-9);
    }

    #[test]
    fn huge_durations_are_clamped() {
        let chain = chain("chain ms 1e300 sin 1 1e300ms sin 2 x1e300 sin 3 end");
        let hour = to_samples(MAX_SEGMENT_MS, 48_000.0);
        let ends: Vec<usize> = chain.segments.iter().map(|s| s.end).collect();
        assert_eq!(ends, vec![hour, 2 * hour, 3 * hour]);
    }

    #[test]
    fn chain_needs_a_sounding_segment() {
        assert!(matches!(
            try_build("chain gaps 10 end"),
            Err(PatchError::MissingGenerator { .. })
        ));
        assert!(matches!(
            try_build("chain sin 440"),
            Err(PatchError::MissingArgument { .. })
        ));
        assert!(matches!(
            try_build("chain 0ms sin 440 end"),
            Err(PatchError::InvalidNumber { .. })
        ));
    }
}
