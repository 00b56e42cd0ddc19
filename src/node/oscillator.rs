// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Leaf generators producing periodic waveforms or noise.

use std::f64::consts::TAU;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{BoxedNode, Node, Prototype, Registry, RegistryError};
use crate::lang::args;
use crate::lang::error::PatchResult;
use crate::lang::factory::{Factory, FREQUENCY_RANGE};
use crate::lang::lexer::{Token, TokenStream};
use crate::wave::Stereo;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(Prototype {
        kind: "sine",
        aliases: &["sin", "sinus"],
        build: |factory, ts, keyword| {
            let (freq, vol) = factory.freq_vol(ts, keyword)?;
            Ok(Box::new(Sine::new(freq, vol, factory.sample_rate())))
        },
    })?;
    registry.register(Prototype {
        kind: "square",
        aliases: &["sq", "square"],
        build: |factory, ts, keyword| {
            let (freq, vol) = factory.freq_vol(ts, keyword)?;
            Ok(Box::new(Square::new(freq, vol, factory.sample_rate())))
        },
    })?;
    registry.register(Prototype {
        kind: "triangle",
        aliases: &["tri", "triangle"],
        build: build_triangle,
    })?;
    registry.register(Prototype {
        kind: "white noise",
        aliases: &["wnoise"],
        build: |_, _, _| Ok(Box::new(WhiteNoise::new())),
    })?;
    registry.register(Prototype {
        kind: "blep",
        aliases: &["blep"],
        build: |factory, ts, keyword| {
            let (freq, vol) = factory.freq_vol(ts, keyword)?;
            let ratio = args::number_in(ts, keyword, "ratio", 0.0, 1.0)?;
            Ok(Box::new(Blep::new(freq, vol, ratio, factory.sample_rate())))
        },
    })?;
    registry.register(Prototype {
        kind: "level",
        aliases: &["level"],
        build: |_, ts, keyword| {
            let level = args::number(ts, keyword, "level")?;
            Ok(Box::new(Level(level)))
        },
    })
}

fn build_triangle(
    factory: &mut Factory,
    ts: &mut TokenStream,
    keyword: &Token,
) -> PatchResult<BoxedNode> {
    let (freq, vol) = factory.freq_vol(ts, keyword)?;
    let shape = match args::choice(ts, &["asc", "desc"]) {
        Some("asc") => Shape::Ascending,
        Some(_) => Shape::Descending,
        None => Shape::Triangle,
    };
    let ton = if ts.eat("ton") {
        args::number_in(ts, keyword, "ton", 1.0, 99.0)? / 100.0
    } else {
        0.5
    };
    Ok(Box::new(Triangle::new(
        freq,
        vol,
        shape,
        ton,
        factory.sample_rate(),
    )))
}

/// Common `freq`/`vol` parameter handling.
fn set_freq_vol(freq: &mut f64, vol: &mut f64, name: &str, value: f64) -> bool {
    match name {
        "freq" => *freq = value.max(FREQUENCY_RANGE.0).min(FREQUENCY_RANGE.1),
        "vol" => *vol = value,
        _ => return false,
    }
    true
}

pub struct Sine {
    freq: f64,
    vol: f64,
    sample_rate: f64,
    /// Current phase in radians, always in `[0, 2π)`
    angle: f64,
}

impl Sine {
    pub fn new(freq: f64, vol: f64, sample_rate: f64) -> Self {
        Self {
            freq,
            vol,
            sample_rate,
            angle: 0.0,
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }
}

impl Node for Sine {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        *out += Stereo::mono(self.angle.sin() * self.vol);
        self.angle = (self.angle + TAU * self.freq / self.sample_rate * speed).rem_euclid(TAU);
    }

    fn reset(&mut self) {
        self.angle = 0.0;
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        set_freq_vol(&mut self.freq, &mut self.vol, name, value)
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "freq" => Some(self.freq),
            "vol" => Some(self.vol),
            _ => None,
        }
    }
}

pub struct Square {
    freq: f64,
    vol: f64,
    sample_rate: f64,
    /// Samples since the last polarity change
    elapsed: f64,
    polarity: f64,
}

impl Square {
    pub fn new(freq: f64, vol: f64, sample_rate: f64) -> Self {
        Self {
            freq,
            vol,
            sample_rate,
            elapsed: 0.0,
            polarity: 1.0,
        }
    }

    fn half_period(&self) -> f64 {
        self.sample_rate / (2.0 * self.freq)
    }
}

impl Node for Square {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        self.elapsed += speed;
        *out += Stereo::mono(self.polarity * self.vol);
        let half_period = self.half_period();
        if self.elapsed > half_period {
            self.elapsed -= half_period;
            self.polarity = -self.polarity;
        }
    }

    fn reset(&mut self) {
        self.elapsed = 0.0;
        self.polarity = 1.0;
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        set_freq_vol(&mut self.freq, &mut self.vol, name, value)
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "freq" => Some(self.freq),
            "vol" => Some(self.vol),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Rising and falling, the rising part takes `ton` of the period.
    Triangle,
    /// Rising saw tooth
    Ascending,
    /// Falling saw tooth
    Descending,
}

pub struct Triangle {
    freq: f64,
    vol: f64,
    shape: Shape,
    ton: f64,
    sample_rate: f64,
    value: f64,
    step: f64,
    rising_step: f64,
    falling_step: f64,
}

impl Triangle {
    pub fn new(freq: f64, vol: f64, shape: Shape, ton: f64, sample_rate: f64) -> Self {
        let mut triangle = Self {
            freq,
            vol,
            shape,
            ton,
            sample_rate,
            value: 0.0,
            step: 0.0,
            rising_step: 0.0,
            falling_step: 0.0,
        };
        triangle.update_steps();
        triangle.reset();
        triangle
    }

    fn update_steps(&mut self) {
        let period = self.sample_rate / self.freq;
        if self.shape == Shape::Triangle {
            self.rising_step = 2.0 / (period * self.ton);
            self.falling_step = -2.0 / (period * (1.0 - self.ton));
        } else {
            self.rising_step = 2.0 / period;
            self.falling_step = -self.rising_step;
        }
        // Keep the current direction
        self.step = match self.shape {
            Shape::Ascending => self.rising_step,
            Shape::Descending => self.falling_step,
            Shape::Triangle if self.step < 0.0 => self.falling_step,
            Shape::Triangle => self.rising_step,
        };
    }
}

impl Node for Triangle {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        self.value += self.step * speed;
        if self.value > 1.0 {
            if self.shape == Shape::Ascending {
                self.value -= 2.0;
            } else {
                // The overshoot continues at the falling rate
                self.value = 1.0 + (self.value - 1.0) * self.falling_step / self.rising_step;
                self.step = self.falling_step;
            }
        } else if self.value < -1.0 {
            if self.shape == Shape::Descending {
                self.value += 2.0;
            } else {
                self.value = -1.0 + (self.value + 1.0) * self.rising_step / self.falling_step;
                self.step = self.rising_step;
            }
        }
        *out += Stereo::mono(self.value * self.vol);
    }

    fn reset(&mut self) {
        let (value, step) = match self.shape {
            Shape::Ascending => (-1.0, self.rising_step),
            Shape::Descending => (1.0, self.falling_step),
            Shape::Triangle => (0.0, self.rising_step),
        };
        self.value = value;
        self.step = step;
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        match name {
            "ton" => self.ton = value.max(0.01).min(0.99),
            _ => {
                if !set_freq_vol(&mut self.freq, &mut self.vol, name, value) {
                    return false;
                }
            }
        }
        self.update_steps();
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "freq" => Some(self.freq),
            "vol" => Some(self.vol),
            "ton" => Some(self.ton),
            _ => None,
        }
    }
}

pub struct WhiteNoise {
    rng: SmallRng,
}

impl WhiteNoise {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl Default for WhiteNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for WhiteNoise {
    fn next(&mut self, out: &mut Stereo<f64>, _speed: f64) {
        *out += Stereo::new(
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-1.0..=1.0),
        );
    }
}

/// Correction around a discontinuity of a naive pulse wave.
///
/// `t` is the phase in `[0, 1)`, `dt` the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt - 1.0;
        -t * t
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt + 1.0;
        t * t
    } else {
        0.0
    }
}

/// Band limited pulse wave.
pub struct Blep {
    freq: f64,
    vol: f64,
    sample_rate: f64,
    /// Fraction of the period spent high
    ratio: f64,
    phase: f64,
}

impl Blep {
    pub fn new(freq: f64, vol: f64, ratio: f64, sample_rate: f64) -> Self {
        Self {
            freq,
            vol,
            sample_rate,
            ratio,
            phase: 0.0,
        }
    }
}

impl Node for Blep {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let dt = self.freq / self.sample_rate;
        let mut sample = if self.phase < self.ratio { 1.0 } else { -1.0 };
        sample += poly_blep(self.phase, dt);
        sample -= poly_blep((self.phase + 1.0 - self.ratio).fract(), dt);
        self.phase = (self.phase + dt * speed).rem_euclid(1.0);
        *out += Stereo::mono(sample * self.vol);
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        match name {
            "ratio" => {
                self.ratio = value.max(0.0).min(1.0);
                true
            }
            _ => set_freq_vol(&mut self.freq, &mut self.vol, name, value),
        }
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "freq" => Some(self.freq),
            "vol" => Some(self.vol),
            "ratio" => Some(self.ratio),
            _ => None,
        }
    }
}

/// A constant offset.
pub struct Level(pub f64);

impl Node for Level {
    fn next(&mut self, out: &mut Stereo<f64>, _speed: f64) {
        *out += Stereo::mono(self.0);
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        if name == "level" {
            self.0 = value;
            true
        } else {
            false
        }
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        if name == "level" {
            Some(self.0)
        } else {
            None
        }
    }
}
