// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Streaming the playback set into a sox subprocess.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error};

use super::OutputError;
use crate::engine::{PlaybackSet, Renderer, Settings};
use crate::wave::copy_i16_bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum SoxTarget {
    /// Play on the default audio device.
    Play,
    /// Write `frames` stereo frames to a file in any sox-supported format.
    File { path: PathBuf, frames: u64 },
}

pub struct SoxOutput {
    set: Arc<PlaybackSet>,
    player: Child,
    thread: Option<JoinHandle<()>>,
}

/// Locations of the `play` and `sox` binaries.
fn sox_binaries() -> (PathBuf, PathBuf) {
    // For properly recording the sox dependency on nix:
    if let Some(sox_bin) = option_env!("NIX_SOX_BIN") {
        debug!("using sox from nix store {}", sox_bin);
        (Path::new(sox_bin).join("play"), Path::new(sox_bin).join("sox"))
    } else {
        ("play".into(), "sox".into())
    }
}

impl SoxOutput {
    /// Spawn sox and a render thread feeding it from `set`.
    pub fn start(
        set: Arc<PlaybackSet>,
        settings: &Settings,
        target: SoxTarget,
    ) -> Result<Self, OutputError> {
        let sample_rate_str = format!("{}", settings.sample_rate);
        let input_args = &[
            "--channels",
            "2",
            "--rate",
            &sample_rate_str,
            "--type",
            "s16",
            "/dev/stdin",
        ];

        let (play, sox) = sox_binaries();
        let (program, limit) = match &target {
            SoxTarget::Play => (play, None),
            SoxTarget::File { frames, .. } => (sox, Some(*frames)),
        };
        let mut command = Command::new(&program);
        command.args(input_args).stdin(Stdio::piped());
        match &target {
            SoxTarget::Play => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            SoxTarget::File { path, .. } => {
                command.arg(path);
            }
        }
        let mut player = command
            .spawn()
            .map_err(|source| OutputError::Spawn { program, source })?;

        let audio_stream = player.stdin.take().expect("Used stdin(Stdio::piped())");
        let mut render = RenderLoop {
            renderer: Renderer::new(Arc::clone(&set), settings.sample_rate),
            audio_stream,
            samples: vec![0; settings.buffer_size as usize * 2],
            bytes: vec![0; settings.buffer_size as usize * 4],
            limit,
        };
        let thread = std::thread::Builder::new()
            .name("render".into())
            .spawn(move || render.run())
            .map_err(|source| OutputError::Spawn {
                program: "render thread".into(),
                source,
            })?;

        Ok(Self {
            set,
            player,
            thread: Some(thread),
        })
    }

    /// Fade out, then wait for everything written so far to reach sox.
    pub fn stop(mut self) -> Result<(), OutputError> {
        self.set.stop();
        self.finish()
    }

    /// Wait for the render thread to end by itself, which only happens for file targets.
    pub fn wait(mut self) -> Result<(), OutputError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| OutputError::RenderThread)?;
        }
        // The render thread dropped its end of the pipe, so sox sees the end of the input.
        let status = self
            .player
            .wait()
            .map_err(|source| OutputError::Wait { source })?;
        if status.success() {
            Ok(())
        } else {
            Err(OutputError::SoxFailed { status })
        }
    }
}

/// State of the render thread. All buffers are allocated up front.
struct RenderLoop {
    renderer: Renderer,
    audio_stream: ChildStdin,
    samples: Vec<i16>,
    bytes: Vec<u8>,
    /// Number of frames after which the output fades out by itself.
    limit: Option<u64>,
}

impl RenderLoop {
    fn run(&mut self) {
        let frames_per_buffer = (self.samples.len() / 2) as u64;
        let mut rendered = 0;
        loop {
            if self.limit.map_or(false, |limit| rendered >= limit) {
                self.renderer.stop();
            }
            self.renderer.render(&mut self.samples);
            rendered += frames_per_buffer;
            let length = copy_i16_bytes(&self.samples, &mut self.bytes) * 2;

            let status = self
                .audio_stream
                .write_all(&self.bytes[..length])
                .and_then(|_| self.audio_stream.flush());
            if let Err(err) = status {
                error!("Failed to write audio to sox stream: {}", err);
                return;
            }
            if self.renderer.is_finished() {
                return;
            }
        }
    }
}
