// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A node is one signal processing unit of a patch.
//!
//! Nodes form a tree: every node exclusively owns its children, and a root node
//! is owned by the playback set. Evaluation happens one stereo sample at a time.

use crate::wave::Stereo;

pub mod chain;
pub mod effect;
pub mod envelope;
pub mod filter;
pub mod modulator;
pub mod oscillator;
mod registry;
pub mod routing;

pub use registry::{BuildFn, Prototype, Registry, RegistryError};

pub type BoxedNode = Box<dyn Node>;

pub trait Node: Send {
    /// Advance by one sample period and *add* the contribution of this node to `out`.
    ///
    /// `speed` scales the advance of time/phase, it is `1.0` unless a parent modulates it.
    /// Must not block, allocate or log, as it runs on the audio thread.
    fn next(&mut self, out: &mut Stereo<f64>, speed: f64);

    /// Return time-varying state to its initial condition.
    fn reset(&mut self) {}

    /// A node is invalid when a generator it depends on could not be built.
    fn is_valid(&self) -> bool {
        true
    }

    /// Change a named parameter. Returns false if the node has no such parameter.
    fn set_value(&mut self, _name: &str, _value: f64) -> bool {
        false
    }

    fn get_value(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Evaluate a node into a fresh sample instead of accumulating into an existing one.
pub(crate) fn sample(node: &mut dyn Node, speed: f64) -> Stereo<f64> {
    let mut out = Stereo::ZERO;
    node.next(&mut out, speed);
    out
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic nodes and helpers shared by the unit tests of all node kinds.

    use super::*;
    use crate::lang::factory::Factory;
    use crate::lang::lexer::TokenStream;

    /// Emits the same sample forever.
    pub struct Constant(pub Stereo<f64>);

    impl Node for Constant {
        fn next(&mut self, out: &mut Stereo<f64>, _speed: f64) {
            *out += self.0;
        }
    }

    /// Emits `0, 1, 2, ...` times a step on both channels, scaled by speed.
    pub struct Ramp {
        pub step: f64,
        pub value: f64,
    }

    impl Node for Ramp {
        fn next(&mut self, out: &mut Stereo<f64>, speed: f64) {
            *out += Stereo::mono(self.value);
            self.value += self.step * speed;
        }

        fn reset(&mut self) {
            self.value = 0.0;
        }
    }

    pub fn constant(left: f64, right: f64) -> BoxedNode {
        Box::new(Constant(Stereo::new(left, right)))
    }

    /// Build exactly one node from a patch text with the standard registry at 48 kHz.
    pub fn build(text: &str) -> BoxedNode {
        try_build(text).expect("patch should build")
    }

    pub fn try_build(text: &str) -> crate::lang::error::PatchResult<BoxedNode> {
        let mut factory = Factory::new(Registry::standard().unwrap());
        let mut stream = TokenStream::new("test", text);
        factory.build(&mut stream, true).map(|node| node.unwrap())
    }

    /// Collect `count` samples of a node.
    pub fn render(node: &mut dyn Node, count: usize) -> Vec<Stereo<f64>> {
        (0..count).map(|_| sample(node, 1.0)).collect()
    }
}
