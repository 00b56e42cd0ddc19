// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! `synth` - plays a patch given on the command line, or records it to a file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use snafu::{ResultExt, Snafu};
use structopt::StructOpt;

use syn_patch::engine::PlaybackSet;
use syn_patch::lang::{Factory, PatchError, TokenStream};
use syn_patch::node::Registry;
use syn_patch::notes::NoteTable;
use syn_patch::output::{OutputError, SoxOutput, SoxTarget};

/// Recorded length when writing to a file without an explicit duration.
const DEFAULT_FILE_MS: u64 = 10_000;

#[derive(Debug, StructOpt)]
#[structopt(name = "synth", about = "Playing patches of generators")]
struct Opt {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,

    /// Note table with additional note names.
    #[structopt(long, parse(from_os_str))]
    notes: Option<PathBuf>,

    /// Duration in milliseconds. Plays until interrupted if not given.
    #[structopt(short, long)]
    duration: Option<u64>,

    /// Output file (any sox-supported format). The patch is played directly if not given.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// The patch, or `.synth` files to read it from.
    #[structopt(required = true)]
    patch: Vec<String>,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("{}", source))]
    Patch { source: PatchError },

    #[snafu(display("{}", source))]
    Output { source: OutputError },

    #[snafu(display("nothing could be played"))]
    NothingPlaying,
}

fn main() {
    let opt = Opt::from_args();

    init_logger(opt.verbose);

    if let Err(err) = run(opt) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

/// The logger itself lets everything through, `log::max_level` is the only filter.
/// That way `-v` directives in a patch can raise it later.
fn init_logger(verbose: usize) {
    SimpleLogger::new()
        .with_level(LevelFilter::Trace)
        .init()
        .unwrap();
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    log::set_max_level(level);
}

fn run(opt: Opt) -> Result<(), Error> {
    let registry = Registry::standard()
        .map_err(|source| PatchError::Registry { source })
        .context(Patch)?;
    let mut factory = Factory::new(registry);
    if let Some(path) = &opt.notes {
        factory.set_notes(NoteTable::load(path).context(Patch)?);
    }

    let text = opt.patch.join(" ");
    let mut ts = TokenStream::new("command line", text);
    let roots = factory.build_all(&mut ts).context(Patch)?;

    let set = Arc::new(PlaybackSet::new());
    let handles: Vec<_> = roots.into_iter().filter_map(|root| set.play(root)).collect();
    if handles.is_empty() {
        return Err(Error::NothingPlaying);
    }
    factory.mark_started();
    let settings = factory.settings().clone();

    match opt.output {
        Some(path) => {
            let ms = opt.duration.unwrap_or(DEFAULT_FILE_MS);
            let frames = settings.sample_rate as u64 * ms / 1000;
            info!("recording {} ms to {}", ms, path.display());
            let output = SoxOutput::start(set, &settings, SoxTarget::File { path, frames })
                .context(Output)?;
            output.wait().context(Output)
        }
        None => {
            let output =
                SoxOutput::start(Arc::clone(&set), &settings, SoxTarget::Play).context(Output)?;
            let start = Instant::now();
            let end = opt.duration.map(|ms| start + Duration::from_millis(ms));
            while end.map_or(true, |end| Instant::now() < end) {
                std::thread::sleep(Duration::from_millis(100));
                if set.take_saturated() {
                    warn!("output saturated, consider lowering the volume or adding 'avc'");
                }
            }
            output.stop().context(Output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{log_enabled, Level};

    #[test]
    fn verbosity_directive_enables_debug_output() {
        init_logger(0);
        assert!(!log_enabled!(Level::Debug));
        let mut factory = Factory::new(Registry::standard().unwrap());
        let mut ts = TokenStream::new("test", "-v sin 440");
        factory.build_all(&mut ts).unwrap();
        assert!(log_enabled!(Level::Debug));
        assert!(!log_enabled!(Level::Trace));
    }
}
