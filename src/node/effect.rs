// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Effects that transform the output of one child.

use log::warn;

use super::{sample, BoxedNode, Node, Prototype, Registry, RegistryError};
use crate::lang::args;
use crate::lang::error::{PatchError, PatchResult};
use crate::lang::factory::Factory;
use crate::lang::lexer::{Token, TokenStream};
use crate::wave::Stereo;

/// Upper bound on the length of a delay line, in samples.
const MAX_DELAY: usize = 1_000_000;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(Prototype {
        kind: "distortion",
        aliases: &["distortion", "distorsion"],
        build: |factory, ts, keyword| {
            let level = args::number(ts, keyword, "distortion level")?;
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Distortion {
                gain: 1.0 + level / 100.0,
                input,
            }))
        },
    })?;
    registry.register(Prototype {
        kind: "clamp",
        aliases: &["clamp"],
        build: |factory, ts, keyword| {
            let token = args::next_arg(ts, keyword, "clamp level")?;
            let mut limit = (args::parse_number(&token, "clamp level")? / 100.0).abs();
            if limit > 1.0 {
                warn!("{}: clamp level out of range (0..100), using 100", token.location);
                limit = 1.0;
            }
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Clamp { limit, input }))
        },
    })?;
    registry.register(Prototype {
        kind: "delay",
        aliases: &["reverb", "echo"],
        build: |factory, ts, keyword| Ok(Box::new(parse_delay(factory, ts, keyword)?)),
    })?;
    registry.register(Prototype {
        kind: "avc",
        aliases: &["avc"],
        build: |factory, ts, keyword| {
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Avc::new(input)))
        },
    })
}

/// Amplify, then hard clip to `[-1, 1]`.
pub struct Distortion {
    gain: f64,
    input: BoxedNode,
}

impl Node for Distortion {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed) * self.gain;
        *out += x.clip(1.0).0;
    }

    fn reset(&mut self) {
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }
}

/// Symmetric hard clip to `[-limit, limit]`.
pub struct Clamp {
    limit: f64,
    input: BoxedNode,
}

impl Node for Clamp {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        *out += x.clip(self.limit).0;
    }

    fn reset(&mut self) {
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        if name != "level" {
            return false;
        }
        self.limit = value.abs().min(1.0);
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        if name == "level" {
            Some(self.limit)
        } else {
            None
        }
    }
}

fn parse_delay(factory: &mut Factory, ts: &mut TokenStream, keyword: &Token) -> PatchResult<Delay> {
    let token = args::next_arg(ts, keyword, "ms:volume")?;
    let (ms, vol) = args::parse_ms_vol(&token)?;
    let length = (factory.sample_rate() * ms / 1000.0).round() as usize;
    if length == 0 || length > MAX_DELAY {
        return Err(PatchError::InvalidNumber {
            token: token.text,
            what: format!("delay (1 to {} samples)", MAX_DELAY),
            location: token.location,
        });
    }
    let mode = if keyword.as_str() == "echo" {
        DelayMode::Echo
    } else {
        DelayMode::Reverb
    };
    let input = factory.child(ts, keyword)?;
    Ok(Delay::new(mode, length, vol, input))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMode {
    /// The delay line holds the dry input.
    Echo,
    /// The delay line holds the mixed output, so repetitions feed back.
    Reverb,
}

/// Circular delay line per channel.
pub struct Delay {
    mode: DelayMode,
    vol: f64,
    buffer: Vec<Stereo<f64>>,
    index: usize,
    input: BoxedNode,
}

impl Delay {
    pub fn new(mode: DelayMode, length: usize, vol: f64, input: BoxedNode) -> Self {
        Self {
            mode,
            vol,
            buffer: vec![Stereo::ZERO; length],
            index: 0,
            input,
        }
    }

    pub fn delay_len(&self) -> usize {
        self.buffer.len()
    }

    /// Position in the delay line that is read and written next.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Node for Delay {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        let delayed = self.buffer[self.index];
        let mixed = x + delayed * self.vol;
        self.buffer[self.index] = match self.mode {
            DelayMode::Echo => x,
            DelayMode::Reverb => mixed,
        };
        self.index += 1;
        if self.index == self.buffer.len() {
            self.index = 0;
        }
        *out += mixed;
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = Stereo::ZERO);
        self.index = 0;
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        if name != "vol" {
            return false;
        }
        self.vol = value;
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        if name == "vol" {
            Some(self.vol)
        } else {
            None
        }
    }
}

/// Automatic volume control: lowers the gain while the output is close to clipping.
pub struct Avc {
    gain: f64,
    input: BoxedNode,
}

impl Avc {
    const THRESHOLD: f64 = 0.95;
    const DECAY: f64 = 0.999;
    const RECOVERY: f64 = 1.0001;
    const MIN_GAIN: f64 = 0.05;

    pub fn new(input: BoxedNode) -> Self {
        Self { gain: 1.0, input }
    }
}

impl Node for Avc {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed) * self.gain;
        if x.peak() > Self::THRESHOLD {
            self.gain = (self.gain * Self::DECAY).max(Self::MIN_GAIN);
        } else {
            self.gain = (self.gain * Self::RECOVERY).min(1.0);
        }
        *out += x;
    }

    fn reset(&mut self) {
        self.gain = 1.0;
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        if name == "gain" {
            Some(self.gain)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{build, constant, render, try_build};

    #[test]
    fn clamp_limits_to_level() {
        let mut clamp = build("clamp 50 level 0.9");
        assert!(render(clamp.as_mut(), 100).iter().all(|s| *s == Stereo::mono(0.5)));
        let mut clamp = build("clamp -250 level -3");
        assert_eq!(render(clamp.as_mut(), 1)[0], Stereo::mono(-1.0));
    }

    #[test]
    fn distortion_amplifies_and_clips_both_channels() {
        let mut distortion = Distortion {
            gain: 3.0,
            input: constant(0.2, -0.5),
        };
        let out = render(&mut distortion, 1)[0];
        assert!((out.left - 0.6).abs() < 1e-12);
        assert_eq!(out.right, -1.0);
        assert!(try_build("distorsion 100 sin 440").is_ok());
    }

    #[test]
    fn echo_delay_line_wraps() {
        let mut echo = Delay::new(DelayMode::Echo, 4800, 0.5, constant(1.0, 1.0));
        assert_eq!(echo.delay_len(), 4800);
        let samples = render(&mut echo, 4801);
        assert_eq!(echo.index(), 1);
        assert_eq!(samples[4799], Stereo::mono(1.0));
        // Sample 4800 reads what was written at index 0
        assert_eq!(samples[4800], Stereo::mono(1.5));
    }

    #[test]
    fn echo_length_from_patch() {
        let text = "echo 100:50 level 1";
        let mut factory = Factory::new(Registry::standard().unwrap());
        let mut ts = TokenStream::new("test", text);
        let keyword = ts.next().unwrap();
        let echo = parse_delay(&mut factory, &mut ts, &keyword).unwrap();
        assert_eq!(echo.delay_len(), 4800);
        assert_eq!(echo.mode, DelayMode::Echo);
        assert_eq!(echo.vol, 0.5);
        assert!(matches!(
            try_build("echo 100 level 1"),
            Err(PatchError::MalformedPair { .. })
        ));
        assert!(matches!(
            try_build("reverb 0:50 level 1"),
            Err(PatchError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn reverb_feeds_back() {
        let mut reverb = Delay::new(DelayMode::Reverb, 2, 0.5, constant(1.0, 1.0));
        let samples: Vec<f64> = render(&mut reverb, 6).iter().map(|s| s.left).collect();
        assert_eq!(samples, vec![1.0, 1.0, 1.5, 1.5, 1.75, 1.75]);

        let mut echo = Delay::new(DelayMode::Echo, 2, 0.5, constant(1.0, 1.0));
        let samples: Vec<f64> = render(&mut echo, 6).iter().map(|s| s.left).collect();
        assert_eq!(samples, vec![1.0, 1.0, 1.5, 1.5, 1.5, 1.5]);
    }

    #[test]
    fn avc_reduces_and_recovers_gain() {
        let mut avc = Avc::new(constant(2.0, 0.0));
        render(&mut avc, 10_000);
        let reduced = avc.get_value("gain").unwrap();
        assert!(reduced < 0.5 && reduced >= Avc::MIN_GAIN);

        let mut quiet = Avc {
            gain: 0.5,
            input: constant(0.1, 0.1),
        };
        render(&mut quiet, 100_000);
        assert_eq!(quiet.get_value("gain"), Some(1.0));
    }
}
