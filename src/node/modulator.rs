// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Amplitude and frequency modulation of one node by another.

use log::warn;

use super::{sample, BoxedNode, Node, Prototype, Registry, RegistryError};
use crate::lang::args;
use crate::lang::error::PatchResult;
use crate::lang::factory::Factory;
use crate::lang::lexer::{Token, TokenStream};
use crate::wave::Stereo;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(Prototype {
        kind: "amplitude modulation",
        aliases: &["am"],
        build: |factory, ts, keyword| {
            let (min, max) = args::VOLUME_RANGE;
            let low = args::number_in(ts, keyword, "minimum level", min, max)? / 100.0;
            let high = args::number_in(ts, keyword, "maximum level", min, max)? / 100.0;
            let sound = factory.child(ts, keyword)?;
            let modulator = factory.child(ts, keyword)?;
            Ok(Box::new(AmplitudeModulation {
                min: low,
                max: high,
                sound,
                modulator,
            }))
        },
    })?;
    registry.register(Prototype {
        kind: "frequency modulation",
        aliases: &["fm"],
        build: build_fm,
    })
}

fn build_fm(
    factory: &mut Factory,
    ts: &mut TokenStream,
    keyword: &Token,
) -> PatchResult<BoxedNode> {
    let mut min = args::number_in(ts, keyword, "minimum speed", 0.0, 2000.0)? / 100.0;
    let mut max = args::number_in(ts, keyword, "maximum speed", 0.0, 2000.0)? / 100.0;
    if max < min {
        warn!("{}: fm maximum is below the minimum, swapping them", keyword.location);
        std::mem::swap(&mut min, &mut max);
    }
    let target = match args::choice(ts, &["generator", "modulator", "both"]) {
        Some("modulator") => SpeedTarget::Modulator,
        Some("both") => SpeedTarget::Both,
        _ => SpeedTarget::Generator,
    };
    let sound = factory.child(ts, keyword)?;
    let modulator = factory.child(ts, keyword)?;
    Ok(Box::new(FrequencyModulation {
        min,
        max,
        target,
        sound,
        modulator,
    }))
}

/// Output is the sound times a gain following the modulator from `min` to `max`.
pub struct AmplitudeModulation {
    min: f64,
    max: f64,
    sound: BoxedNode,
    modulator: BoxedNode,
}

impl AmplitudeModulation {
    fn gain(&self, m: f64) -> f64 {
        self.min + (self.max - self.min) * (m + 1.0) / 2.0
    }
}

impl Node for AmplitudeModulation {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let sound = sample(self.sound.as_mut(), speed);
        let m = sample(self.modulator.as_mut(), speed);
        *out += Stereo::new(
            sound.left * self.gain(m.left),
            sound.right * self.gain(m.right),
        );
    }

    fn reset(&mut self) {
        self.sound.reset();
        self.modulator.reset();
    }

    fn is_valid(&self) -> bool {
        self.sound.is_valid() && self.modulator.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        match name {
            "min" => self.min = value,
            "max" => self.max = value,
            _ => return false,
        }
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "min" => Some(self.min),
            "max" => Some(self.max),
            _ => None,
        }
    }
}

/// Where the speed passed in from the parent is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedTarget {
    Generator,
    Modulator,
    Both,
}

impl SpeedTarget {
    fn generator(self) -> bool {
        self != SpeedTarget::Modulator
    }

    fn modulator(self) -> bool {
        self != SpeedTarget::Generator
    }
}

/// Plays the sound at a speed following the modulator from `min` to `max`.
pub struct FrequencyModulation {
    min: f64,
    max: f64,
    target: SpeedTarget,
    sound: BoxedNode,
    modulator: BoxedNode,
}

impl Node for FrequencyModulation {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let mut carrier_speed = if self.min == self.max {
            self.min
        } else {
            let modulator_speed = if self.target.modulator() { speed } else { 1.0 };
            let m = sample(self.modulator.as_mut(), modulator_speed).average();
            self.min + (self.max - self.min) * (m + 1.0) / 2.0
        };
        if self.target.generator() {
            carrier_speed *= speed;
        }
        self.sound.next(out, carrier_speed);
    }

    fn reset(&mut self) {
        self.sound.reset();
        self.modulator.reset();
    }

    fn is_valid(&self) -> bool {
        self.sound.is_valid() && self.modulator.is_valid()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        match name {
            "min" => self.min = value.max(0.0),
            "max" => self.max = value.max(0.0),
            _ => return false,
        }
        true
    }

    fn get_value(&self, name: &str) -> Option<f64> {
        match name {
            "min" => Some(self.min),
            "max" => Some(self.max),
            _ => None,
        }
    }
}
