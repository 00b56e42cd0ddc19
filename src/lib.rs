// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A synthesizer driven by textual patches.
//!
//! A patch like `adsr 10:100 500:0 fm 90 110 sin a4 sin 3` is read by the
//! [`lang::Factory`] into a tree of [`node::Node`]s, which are handed to the
//! [`engine::PlaybackSet`] and rendered by an [`output::SoxOutput`].

pub mod engine;
pub mod lang;
pub mod node;
pub mod notes;
pub mod output;
pub mod wave;
