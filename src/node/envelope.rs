// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Envelopes shaping the volume of a child over time.
//!
//! Envelope time always runs at the real sample rate. The speed passed in
//! from the parent only affects the child.

use std::path::Path;

use super::{sample, BoxedNode, Node, Prototype, Registry, RegistryError};
use crate::lang::args;
use crate::lang::error::{PatchError, PatchResult};
use crate::lang::factory::Factory;
use crate::lang::lexer::{Token, TokenStream};
use crate::wave::Stereo;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(Prototype {
        kind: "adsr",
        aliases: &["adsr"],
        build: |factory, ts, keyword| {
            let curve = Curve::parse(ts, keyword, factory.sample_rate())?;
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Adsr { curve, input }))
        },
    })?;
    registry.register(Prototype {
        kind: "envelope",
        aliases: &["envelope", "env"],
        build: build_data_envelope,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    /// Seconds since the start of the envelope
    pub time: f64,
    pub level: f64,
}

const ORIGIN: Breakpoint = Breakpoint {
    time: 0.0,
    level: 0.0,
};

/// Piecewise linear curve through a list of breakpoints, starting at level 0.
///
/// This is the state machine behind `adsr`, also used by `chain` to shape its segments.
#[derive(Debug, Clone)]
pub struct Curve {
    points: Vec<Breakpoint>,
    looping: bool,
    dt: f64,
    t: f64,
    /// Index of the breakpoint currently approached
    index: usize,
    previous: Breakpoint,
}

impl Curve {
    /// Points must be non-empty, strictly increasing in time and start after 0.
    pub fn new(points: Vec<Breakpoint>, looping: bool, sample_rate: f64) -> Self {
        debug_assert!(!points.is_empty());
        Self {
            points,
            looping,
            dt: 1.0 / sample_rate,
            t: 0.0,
            index: 0,
            previous: ORIGIN,
        }
    }

    /// Read `ms:vol...` followed by an optional `once` or `loop`.
    ///
    /// The list ends at the first token without a `:`.
    pub fn parse(ts: &mut TokenStream, keyword: &Token, sample_rate: f64) -> PatchResult<Self> {
        let mut points = Vec::new();
        let mut previous = ORIGIN;
        while let Some(token) = ts.next() {
            if !token.as_str().contains(':') {
                ts.putback(token);
                break;
            }
            let (ms, level) = args::parse_ms_vol(&token)?;
            let point = Breakpoint {
                time: ms / 1000.0,
                level,
            };
            if point.time <= previous.time {
                return Err(PatchError::UnorderedBreakpoints {
                    previous_ms: previous.time * 1000.0,
                    current_ms: ms,
                    location: token.location,
                });
            }
            points.push(point);
            previous = point;
        }
        if points.is_empty() {
            return Err(PatchError::EmptyEnvelope {
                keyword: keyword.text.clone(),
                location: keyword.location.clone(),
            });
        }
        let looping = args::choice(ts, &["once", "loop"]) == Some("loop");
        Ok(Self::new(points, looping, sample_rate))
    }

    pub fn restart(&mut self) {
        self.t = 0.0;
        self.index = 0;
        self.previous = ORIGIN;
    }

    /// Advance by one sample and return the level.
    pub fn next_level(&mut self) -> f64 {
        if self.index >= self.points.len() {
            return self.previous.level;
        }
        self.t += self.dt;
        while self.t >= self.points[self.index].time {
            self.previous = self.points[self.index];
            self.index += 1;
            if self.index >= self.points.len() {
                if !self.looping {
                    return self.previous.level;
                }
                self.restart();
                break;
            }
        }
        let target = self.points[self.index];
        let factor = (self.t - self.previous.time) / (target.time - self.previous.time);
        self.previous.level + (target.level - self.previous.level) * factor
    }
}

pub struct Adsr {
    curve: Curve,
    input: BoxedNode,
}

impl Node for Adsr {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        *out += x * self.curve.next_level();
    }

    fn reset(&mut self) {
        self.curve.restart();
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }
}

fn build_data_envelope(
    factory: &mut Factory,
    ts: &mut TokenStream,
    keyword: &Token,
) -> PatchResult<BoxedNode> {
    let duration = args::next_arg(ts, keyword, "duration in ms")?;
    let ms = args::parse_number(&duration, "duration in ms")?;
    if ms <= 0.0 {
        return Err(PatchError::InvalidNumber {
            token: duration.text,
            what: "duration in ms".to_owned(),
            location: duration.location,
        });
    }
    let ms = args::clamp_warn(ms, 1.0, 3_600_000.0, "duration in ms", &duration.location);
    let looping = args::choice(ts, &["once", "loop"]) != Some("once");

    let source = args::next_arg(ts, keyword, "'data' or 'file'")?;
    let values = match source.as_str() {
        "data" => {
            let mut values = Vec::new();
            loop {
                let token = args::next_arg(ts, keyword, "'end'")?;
                if token.as_str() == "end" {
                    break;
                }
                values.push(data_value(&token)?);
            }
            values
        }
        "file" => {
            let path = args::next_arg(ts, keyword, "file name")?;
            let text = std::fs::read_to_string(Path::new(path.as_str())).map_err(|source| {
                PatchError::ReadFile {
                    path: path.as_str().into(),
                    source,
                }
            })?;
            let mut file = TokenStream::new(path.as_str(), text);
            let mut values = Vec::new();
            while let Some(token) = file.next() {
                if token.as_str() == "end" {
                    break;
                }
                values.push(data_value(&token)?);
            }
            values
        }
        _ => {
            return Err(PatchError::UnknownOption {
                keyword: keyword.text.clone(),
                option: source.text.clone(),
                location: source.location.clone(),
            })
        }
    };
    if values.is_empty() {
        return Err(PatchError::EmptyEnvelope {
            keyword: keyword.text.clone(),
            location: keyword.location.clone(),
        });
    }

    let input = factory.child(ts, keyword)?;
    Ok(Box::new(DataEnvelope::new(
        values,
        ms,
        looping,
        factory.sample_rate(),
        input,
    )))
}

fn data_value(token: &Token) -> PatchResult<f64> {
    let value = args::parse_number(token, "envelope value")?;
    let (min, max) = args::VOLUME_RANGE;
    Ok(args::clamp_warn(value, min, max, "envelope value", &token.location) / 100.0)
}

/// Levels sampled at equal distances, stretched over a duration.
pub struct DataEnvelope {
    values: Vec<f64>,
    looping: bool,
    /// Fractional position in `values`
    position: f64,
    step: f64,
    input: BoxedNode,
}

impl DataEnvelope {
    pub fn new(values: Vec<f64>, ms: f64, looping: bool, sample_rate: f64, input: BoxedNode) -> Self {
        let last = (values.len() - 1) as f64;
        Self {
            step: last * 1000.0 / ms / sample_rate,
            values,
            looping,
            position: 0.0,
            input,
        }
    }

    fn level(&self) -> f64 {
        let index = self.position as usize;
        let current = self.values[index];
        match self.values.get(index + 1) {
            Some(next) => current + (next - current) * self.position.fract(),
            None => current,
        }
    }
}

impl Node for DataEnvelope {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        *out += x * self.level();

        let last = (self.values.len() - 1) as f64;
        self.position += self.step;
        if self.position >= last {
            if self.looping && last > 0.0 {
                self.position %= last;
            } else {
                self.position = last;
            }
        }
    }

    fn reset(&mut self) {
        self.position = 0.0;
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{build, constant, render, try_build};

    fn curve(points: &[(f64, f64)], looping: bool) -> Curve {
        let points = points
            .iter()
            .map(|&(time, level)| Breakpoint { time, level })
            .collect();
        Curve::new(points, looping, 1000.0)
    }

    #[test]
    fn breakpoints_must_increase() {
        assert!(matches!(
            try_build("adsr 1000:0 500:50 sin 440"),
            Err(PatchError::UnorderedBreakpoints { .. })
        ));
        assert!(matches!(
            try_build("adsr 0:100 sin 440"),
            Err(PatchError::UnorderedBreakpoints { .. })
        ));
        assert!(matches!(
            try_build("adsr loop sin 440"),
            Err(PatchError::EmptyEnvelope { .. })
        ));
        assert!(matches!(
            try_build("adsr 10:x sin 440"),
            Err(PatchError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn once_holds_the_last_level() {
        let mut curve = curve(&[(0.1, 1.0), (0.2, 0.5)], false);
        let levels: Vec<f64> = (0..400).map(|_| curve.next_level()).collect();
        assert!((levels[49] - 0.5).abs() < 1e-6);
        assert!((levels[99] - 1.0).abs() < 1e-6);
        assert!((levels[149] - 0.75).abs() < 1e-6);
        assert!(levels[250..].iter().all(|&l| l == 0.5));
    }

    #[test]
    fn loop_restarts_from_time_zero() {
        let mut curve = curve(&[(1.0, 1.0), (2.0, 0.0)], true);
        let levels: Vec<f64> = (0..3000).map(|_| curve.next_level()).collect();
        assert!((levels[499] - 0.5).abs() < 1e-6);
        assert!((levels[1499] - 0.5).abs() < 1e-6);
        // after the last breakpoint the curve rises from zero again
        assert!(levels[1999].abs() < 1e-6);
        assert!((levels[2499] - 0.5).abs() < 2e-3);
    }

    #[test]
    fn adsr_scales_child_in_real_time() {
        let mut adsr = build("adsr 1:100 loop level 1");
        let mut out = Stereo::ZERO;
        // 48 samples per ms at 48 kHz, regardless of speed
        for _ in 0..24 {
            out = Stereo::ZERO;
            adsr.next(&mut out, 10.0);
        }
        assert!((out.left - 0.5).abs() < 1e-9);
    }

    #[test]
    fn data_envelope_interpolates_and_holds() {
        // 3 values over 2 samples at 1 kHz: one value per sample
        let mut env = DataEnvelope::new(vec![0.0, 1.0, 0.5], 2.0, false, 1000.0, constant(1.0, 1.0));
        let levels: Vec<f64> = render(&mut env, 5).iter().map(|s| s.left).collect();
        assert_eq!(levels, vec![0.0, 1.0, 0.5, 0.5, 0.5]);

        let mut env = DataEnvelope::new(vec![0.0, 1.0], 4.0, true, 1000.0, constant(1.0, 1.0));
        let levels: Vec<f64> = render(&mut env, 6).iter().map(|s| s.left).collect();
        assert_eq!(levels, vec![0.0, 0.25, 0.5, 0.75, 0.0, 0.25]);
    }

    #[test]
    fn data_envelope_syntax() {
        let mut env = build("env 1000 once data 0 50 300 end level 1");
        let last = render(env.as_mut(), 48_100)[48_099];
        assert_eq!(last.left, 2.0);
        assert!(matches!(
            try_build("envelope 100 data end sin 1"),
            Err(PatchError::EmptyEnvelope { .. })
        ));
        assert!(matches!(
            try_build("envelope 100 samples 1 2 end sin 1"),
            Err(PatchError::UnknownOption { .. })
        ));
        assert!(matches!(
            try_build("envelope 0 data 1 end sin 1"),
            Err(PatchError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn tiny_durations_are_clamped() {
        let mut env = build("envelope 1e-300 data 0 100 end level 1");
        let samples = render(env.as_mut(), 200);
        assert!(samples.iter().all(|s| s.left.is_finite()));
        // Clamped to 1 ms, 48 samples per ramp at 48 kHz
        assert!((samples[24].left - 0.5).abs() < 1e-9);
    }
}
