// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

use super::span::Location;
use crate::node::RegistryError;

/// Everything that can go wrong while turning a patch into nodes.
///
/// All of these are fatal: a patch producing one of them never reaches the audio thread.
#[derive(Debug, Snafu)]
pub enum PatchError {
    #[snafu(display("{}: unknown generator type '{}'", location, keyword))]
    UnknownGenerator { keyword: String, location: Location },

    #[snafu(display("{}: missing generator for '{}'", location, context))]
    MissingGenerator { context: String, location: Location },

    #[snafu(display(
        "{}: envelope times must be strictly increasing (previous {} ms, current {} ms)",
        location,
        previous_ms,
        current_ms
    ))]
    UnorderedBreakpoints {
        previous_ms: f64,
        current_ms: f64,
        location: Location,
    },

    #[snafu(display("{}: '{}' needs at least one value", location, keyword))]
    EmptyEnvelope { keyword: String, location: Location },

    #[snafu(display("{}: malformed '{}', expected {}", location, token, expected))]
    MalformedPair {
        token: String,
        expected: &'static str,
        location: Location,
    },

    #[snafu(display("{}: '{}' is not a valid {}", location, token, what))]
    InvalidNumber {
        token: String,
        what: String,
        location: Location,
    },

    #[snafu(display("{}: '{}' expects {}, but the patch ended", location, keyword, what))]
    MissingArgument {
        keyword: String,
        what: String,
        location: Location,
    },

    #[snafu(display("{}: unknown option '{}' for '{}'", location, option, keyword))]
    UnknownOption {
        keyword: String,
        option: String,
        location: Location,
    },

    #[snafu(display("the patch does not contain any generator"))]
    EmptyPatch,

    #[snafu(display("{}: missing '}}' at the end of the mixer", location))]
    UnclosedMixer { location: Location },

    #[snafu(display("{}: missing name after 'define'", location))]
    MissingDefineName { location: Location },

    #[snafu(display("{}: unbalanced braces in define '{}'", location, name))]
    UnterminatedDefine { name: String, location: Location },

    #[snafu(display("{}: define '{}' expands into itself", location, name))]
    RecursiveDefine { name: String, location: Location },

    #[snafu(display("{}: '{}' is included too deeply", location, path.display()))]
    RecursiveInclude { path: PathBuf, location: Location },

    #[snafu(display("could not read {}: {}", path.display(), source))]
    ReadFile { path: PathBuf, source: io::Error },

    #[snafu(display("invalid generator registry: {}", source))]
    Registry { source: RegistryError },
}

pub type PatchResult<T> = Result<T, PatchError>;
