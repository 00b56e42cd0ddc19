// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Filters, each processing the output of exactly one child.

use std::f64::consts::TAU;

use super::{sample, BoxedNode, Node, Prototype, Registry, RegistryError};
use crate::lang::args;
use crate::lang::error::PatchResult;
use crate::lang::factory::Factory;
use crate::lang::lexer::{Token, TokenStream};
use crate::wave::Stereo;

/// Added to feedback accumulators so that decaying signals never become denormal.
const DENORMAL: f64 = 1e-18;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(Prototype {
        kind: "low pass",
        aliases: &["low"],
        build: |factory, ts, keyword| {
            let (cutoff, _) = factory.freq_vol(ts, keyword)?;
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(OnePole::low(cutoff, factory.sample_rate(), input)))
        },
    })?;
    registry.register(Prototype {
        kind: "high pass",
        aliases: &["high"],
        build: |factory, ts, keyword| {
            let (cutoff, _) = factory.freq_vol(ts, keyword)?;
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(OnePole::high(cutoff, factory.sample_rate(), input)))
        },
    })?;
    registry.register(Prototype {
        kind: "resonant",
        aliases: &["reso"],
        build: |factory, ts, keyword| {
            let f = args::number_in(ts, keyword, "f", 0.0, 1.0)?;
            let q = args::number_in(ts, keyword, "q", 0.0, 1.0)?;
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Resonant::new(f, q, input)))
        },
    })?;
    registry.register(Prototype {
        kind: "iir",
        aliases: &["iir"],
        build: build_iir,
    })?;
    registry.register(Prototype {
        kind: "slew limiter",
        aliases: &["lowf"],
        build: |factory, ts, keyword| {
            let (freq, _) = factory.freq_vol(ts, keyword)?;
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(SlewLimiter::new(freq, factory.sample_rate(), input)))
        },
    })
}

fn build_iir(
    factory: &mut Factory,
    ts: &mut TokenStream,
    keyword: &Token,
) -> PatchResult<BoxedNode> {
    let (low, _) = factory.freq_vol(ts, keyword)?;
    let (high, _) = factory.freq_vol(ts, keyword)?;
    let vibrato = if ts.eat("vibrato") {
        let rate = args::number_in(ts, keyword, "vibrato rate", 0.0, 100.0)?;
        let depth = args::number_in(ts, keyword, "vibrato depth", 0.0, 100.0)? / 100.0;
        Some(Vibrato {
            rate,
            depth,
            angle: 0.0,
        })
    } else {
        None
    };
    let input = factory.child(ts, keyword)?;
    Ok(Box::new(Iir {
        low,
        high,
        vibrato,
        sample_rate: factory.sample_rate(),
        low_state: Stereo::ZERO,
        high_state: Stereo::ZERO,
        input,
    }))
}

/// Feedback coefficient of a one pole low pass at `cutoff` Hz.
pub fn coefficient(cutoff: f64, sample_rate: f64) -> f64 {
    (-TAU * cutoff / sample_rate).exp().max(0.0).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Low,
    High,
}

/// One pole low or high pass filter.
pub struct OnePole {
    pass: Pass,
    cutoff: f64,
    sample_rate: f64,
    coeff: f64,
    /// Previous output of the low pass
    state: Stereo<f64>,
    input: BoxedNode,
}

impl OnePole {
    pub fn low(cutoff: f64, sample_rate: f64, input: BoxedNode) -> Self {
        Self::new(Pass::Low, cutoff, sample_rate, input)
    }

    pub fn high(cutoff: f64, sample_rate: f64, input: BoxedNode) -> Self {
        Self::new(Pass::High, cutoff, sample_rate, input)
    }

    fn new(pass: Pass, cutoff: f64, sample_rate: f64, input: BoxedNode) -> Self {
        Self {
            pass,
            cutoff,
            sample_rate,
            coeff: coefficient(cutoff, sample_rate),
            state: Stereo::ZERO,
            input,
        }
    }
}

impl Node for OnePole {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        self.state = self.state * self.coeff + x * (1.0 - self.coeff);
        *out += match self.pass {
            Pass::Low => self.state,
            Pass::High => x - self.state,
        };
    }

    fn reset(&mut self) {
        self.state = Stereo::ZERO;
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        if name != "freq" {
            return false;
        }
        self.cutoff = value;
        self.coeff = coefficient(value, self.sample_rate);
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        if name == "freq" {
            Some(self.cutoff)
        } else {
            None
        }
    }
}

/// Two leaky integrators in series with resonance feedback.
pub struct Resonant {
    f: f64,
    q: f64,
    feedback: f64,
    stage0: Stereo<f64>,
    stage1: Stereo<f64>,
    input: BoxedNode,
}

impl Resonant {
    /// `f` and `q` in `[0, 1]`.
    pub fn new(f: f64, q: f64, input: BoxedNode) -> Self {
        let mut reso = Self {
            f: 0.0,
            q: 0.0,
            feedback: 0.0,
            stage0: Stereo::ZERO,
            stage1: Stereo::ZERO,
            input,
        };
        reso.set_params(f, q);
        reso
    }

    fn set_params(&mut self, f: f64, q: f64) {
        self.f = f.max(0.0).min(0.999);
        self.q = q.max(0.0).min(1.0);
        self.feedback = self.q + self.q / (1.0 - self.f);
    }
}

impl Node for Resonant {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        let (s0, s1) = (self.stage0, self.stage1);
        self.stage0 = s0 + (x - s0 + (s0 - s1) * self.feedback) * self.f;
        self.stage1 = s1 + (self.stage0 - s1) * self.f;
        *out += self.stage1;
    }

    fn reset(&mut self) {
        self.stage0 = Stereo::ZERO;
        self.stage1 = Stereo::ZERO;
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        match name {
            "f" => self.set_params(value, self.q),
            "q" => self.set_params(self.f, value),
            _ => return false,
        }
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "f" => Some(self.f),
            "q" => Some(self.q),
            _ => None,
        }
    }
}

/// Slow sine modulation of the cut-off frequencies of an [`Iir`].
struct Vibrato {
    rate: f64,
    /// Relative deviation of the cut-off, `0..=1`
    depth: f64,
    angle: f64,
}

/// Band pass built from a low pass feedback stage followed by a high pass one.
pub struct Iir {
    low: f64,
    high: f64,
    vibrato: Option<Vibrato>,
    sample_rate: f64,
    low_state: Stereo<f64>,
    /// Low pass state of the high pass stage
    high_state: Stereo<f64>,
    input: BoxedNode,
}

impl Node for Iir {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        let factor = match &mut self.vibrato {
            Some(vibrato) => {
                let factor = 1.0 + vibrato.depth * vibrato.angle.sin();
                vibrato.angle = (vibrato.angle + TAU * vibrato.rate / self.sample_rate) % TAU;
                factor
            }
            None => 1.0,
        };
        let low = coefficient(self.low * factor, self.sample_rate);
        let high = coefficient(self.high * factor, self.sample_rate);
        let denormal = Stereo::mono(DENORMAL);
        self.low_state = self.low_state * low + x * (1.0 - low) + denormal;
        self.high_state = self.high_state * high + self.low_state * (1.0 - high) + denormal;
        *out += self.low_state - self.high_state;
    }

    fn reset(&mut self) {
        self.low_state = Stereo::ZERO;
        self.high_state = Stereo::ZERO;
        if let Some(vibrato) = &mut self.vibrato {
            vibrato.angle = 0.0;
        }
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        match name {
            "low" => self.low = value,
            "high" => self.high = value,
            _ => return false,
        }
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "low" => Some(self.low),
            "high" => Some(self.high),
            _ => None,
        }
    }
}

/// Limits how fast the signal may change from one sample to the next.
pub struct SlewLimiter {
    freq: f64,
    sample_rate: f64,
    max_delta: f64,
    last: Stereo<f64>,
    input: BoxedNode,
}

impl SlewLimiter {
    pub fn new(freq: f64, sample_rate: f64, input: BoxedNode) -> Self {
        Self {
            freq,
            sample_rate,
            max_delta: 2.0 * freq / sample_rate,
            last: Stereo::ZERO,
            input,
        }
    }

    fn limit(&self, last: f64, value: f64) -> f64 {
        last + (value - last).max(-self.max_delta).min(self.max_delta)
    }
}

impl Node for SlewLimiter {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        self.last = Stereo::new(
            self.limit(self.last.left, x.left),
            self.limit(self.last.right, x.right),
        );
        *out += self.last;
    }

    fn reset(&mut self) {
        self.last = Stereo::ZERO;
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        if name != "freq" {
            return false;
        }
        self.freq = value;
        self.max_delta = 2.0 * value / self.sample_rate;
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        if name == "freq" {
            Some(self.freq)
        } else {
            None
        }
    }
}
