// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Getting the rendered audio out of the process.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

pub mod sox;

pub use sox::{SoxOutput, SoxTarget};

#[derive(Debug, Snafu)]
pub enum OutputError {
    #[snafu(display("could not start {}: {}", program.display(), source))]
    Spawn { program: PathBuf, source: io::Error },

    #[snafu(display("the render thread panicked"))]
    RenderThread,

    #[snafu(display("failed waiting for sox to finish: {}", source))]
    Wait { source: io::Error },

    #[snafu(display("sox exited with {}", status))]
    SoxFailed { status: std::process::ExitStatus },
}
