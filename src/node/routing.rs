// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Mixing several nodes and moving signals between channels.

use super::{sample, BoxedNode, Node, Prototype, Registry, RegistryError};
use crate::lang::error::{PatchError, PatchResult};
use crate::lang::factory::Factory;
use crate::lang::lexer::{Token, TokenStream};
use crate::wave::Stereo;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(Prototype {
        kind: "mixer",
        aliases: &["{"],
        build: build_mixer,
    })?;
    registry.register(Prototype {
        kind: "left",
        aliases: &["left"],
        build: |factory, ts, keyword| {
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Channel {
                route: Route::Left,
                input,
            }))
        },
    })?;
    registry.register(Prototype {
        kind: "right",
        aliases: &["right"],
        build: |factory, ts, keyword| {
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Channel {
                route: Route::Right,
                input,
            }))
        },
    })?;
    registry.register(Prototype {
        kind: "mono",
        aliases: &["mono"],
        build: |factory, ts, keyword| {
            let input = factory.child(ts, keyword)?;
            Ok(Box::new(Channel {
                route: Route::Mono,
                input,
            }))
        },
    })
}

/// `{ node node ... }`
fn build_mixer(
    factory: &mut Factory,
    ts: &mut TokenStream,
    keyword: &Token,
) -> PatchResult<BoxedNode> {
    let mut children = Vec::new();
    while let Some(child) = factory.build(ts, false)? {
        children.push(child);
    }
    if ts.eat("}") {
        return Ok(Box::new(Mixer::new(children)));
    }
    match ts.next() {
        Some(token) => Err(PatchError::UnknownGenerator {
            keyword: token.text,
            location: token.location,
        }),
        None => Err(PatchError::UnclosedMixer {
            location: keyword.location.clone(),
        }),
    }
}

/// Unweighted average of all children.
pub struct Mixer {
    children: Vec<BoxedNode>,
}

impl Mixer {
    pub fn new(children: Vec<BoxedNode>) -> Self {
        Self { children }
    }
}

impl Node for Mixer {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        match self.children.as_mut_slice() {
            [] => {}
            [single] => single.next(out, speed),
            children => {
                let count = children.len() as f64;
                let sum: Stereo<f64> = children
                    .iter_mut()
                    .map(|child| sample(child.as_mut(), speed))
                    .sum();
                *out += sum / count;
            }
        }
    }

    fn reset(&mut self) {
        self.children.iter_mut().for_each(|child| child.reset());
    }

    fn is_valid(&self) -> bool {
        !self.children.is_empty() && self.children.iter().all(|child| child.is_valid())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Keep only the left channel.
    Left,
    /// Keep only the right channel.
    Right,
    /// Average of both channels on both sides.
    Mono,
}

pub struct Channel {
    route: Route,
    input: BoxedNode,
}

impl Node for Channel {
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
        let x = sample(self.input.as_mut(), speed);
        *out += match self.route {
            Route::Left => Stereo::new(x.left, 0.0),
            Route::Right => Stereo::new(0.0, x.right),
            Route::Mono => Stereo::mono(x.average()),
        };
    }

    fn reset(&mut self) {
        self.input.reset();
    }

    fn is_valid(&self) -> bool {
        self.input.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{build, constant, render, try_build, Ramp};

    #[test]
    fn mixer_averages_children() {
        let mut mixer = Mixer::new(vec![
            Box::new(Ramp {
                step: 1.0,
                value: 0.0,
            }),
            Box::new(Ramp {
                step: 3.0,
                value: 1.0,
            }),
            constant(0.5, -0.5),
        ]);
        let samples = render(&mut mixer, 4);
        for (i, s) in samples.iter().enumerate() {
            let i = i as f64;
            let expected_left = (i + (1.0 + 3.0 * i) + 0.5) / 3.0;
            let expected_right = (i + (1.0 + 3.0 * i) - 0.5) / 3.0;
            assert!((s.left - expected_left).abs() < 1e-12);
            assert!((s.right - expected_right).abs() < 1e-12);
        }
    }

    #[test]
    fn single_child_is_bypassed() {
        let mut mixer = build("{ level 0.3 }");
        assert_eq!(render(mixer.as_mut(), 1)[0], Stereo::mono(0.3));
    }

    #[test]
    fn nested_mixers_and_errors() {
        let mut mixer = build("{ level 1 { level 0 level 1 } }");
        assert_eq!(render(mixer.as_mut(), 1)[0], Stereo::mono(0.75));
        assert!(matches!(
            try_build("{ level 1"),
            Err(PatchError::UnclosedMixer { .. })
        ));
        assert!(matches!(
            try_build("{ level 1 oops }"),
            Err(PatchError::UnknownGenerator { .. })
        ));
        // An empty mixer is not a generator
        assert!(matches!(
            try_build("{ }"),
            Err(PatchError::MissingGenerator { .. })
        ));
    }

    #[test]
    fn channel_routing() {
        let mut left = Channel {
            route: Route::Left,
            input: constant(0.2, 0.6),
        };
        let mut right = build("right { level 0.6 }");
        let mut mono = Channel {
            route: Route::Mono,
            input: constant(0.2, 0.6),
        };
        assert_eq!(render(&mut left, 1)[0], Stereo::new(0.2, 0.0));
        assert_eq!(render(right.as_mut(), 1)[0], Stereo::new(0.0, 0.6));
        assert!((render(&mut mono, 1)[0].left - 0.4).abs() < 1e-12);
    }

    #[test]
    fn routing_passes_speed_on() {
        let mut left = Channel {
            route: Route::Left,
            input: Box::new(Ramp {
                step: 1.0,
                value: 0.0,
            }),
        };
        let mut out = Stereo::ZERO;
        left.next(&mut out, 4.0);
        out = Stereo::ZERO;
        left.next(&mut out, 4.0);
        assert_eq!(out.left, 4.0);
    }
}
