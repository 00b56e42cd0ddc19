// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The boundary between the control thread and the audio thread.
//!
//! The control thread builds nodes and hands them to the [`PlaybackSet`].
//! The audio thread owns a [`Renderer`] that mixes everything in the set into
//! interleaved 16 bit samples. The mutex guarding the set is the only point of
//! synchronization: the audio thread holds it for exactly one buffer, the control
//! thread only while mutating the list.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::node::BoxedNode;
use crate::wave::{to_i16, Stereo};

/// Duration of the volume ramp when starting and stopping the output.
pub const FADE_MS: f64 = 10.0;

/// Process wide knobs, only settable from patch directives.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sample_rate: u32,
    /// Number of stereo frames per output buffer.
    pub buffer_size: u16,
    /// Whether `print` directives are echoed.
    pub echo: bool,
    pub verbosity: u8,
}

impl Settings {
    pub const SAMPLE_RATE_RANGE: (u32, u32) = (8_000, 192_000);
    pub const BUFFER_SIZE_RANGE: (u16, u16) = (16, 16_384);
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 1024,
            echo: true,
            verbosity: 0,
        }
    }
}

/// Identifies a root node in the playback set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayHandle(u64);

/// The collection of currently playing root nodes.
pub struct PlaybackSet {
    roots: Mutex<Vec<(PlayHandle, BoxedNode)>>,
    /// Always equal to `roots.len()` after a mutation, readable without the lock.
    count: AtomicUsize,
    next_handle: AtomicU64,
    saturated: AtomicBool,
    stopping: AtomicBool,
}

impl Default for PlaybackSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSet {
    pub fn new() -> Self {
        Self {
            roots: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            next_handle: AtomicU64::new(0),
            saturated: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(PlayHandle, BoxedNode)>> {
        // A panic while holding the lock leaves the list itself intact.
        self.roots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start playing a node. Invalid nodes are dropped and `None` is returned.
    pub fn play(&self, node: BoxedNode) -> Option<PlayHandle> {
        if !node.is_valid() {
            warn!("refusing to play an invalid generator");
            return None;
        }
        let handle = PlayHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut roots = self.lock();
        roots.push((handle, node));
        self.count.store(roots.len(), Ordering::Release);
        debug!("playing {:?}, {} active", handle, roots.len());
        Some(handle)
    }

    /// Stop playing a node. Its whole tree is dropped, outside of the lock.
    pub fn remove(&self, handle: PlayHandle) -> bool {
        let removed = {
            let mut roots = self.lock();
            let removed = roots
                .iter()
                .position(|(h, _)| *h == handle)
                .map(|index| roots.swap_remove(index));
            self.count.store(roots.len(), Ordering::Release);
            removed
        };
        removed.is_some()
    }

    pub fn has(&self, handle: PlayHandle) -> bool {
        self.lock().iter().any(|(h, _)| *h == handle)
    }

    /// Number of playing roots, without taking the lock.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Change a parameter of a playing root node.
    pub fn set_value(&self, handle: PlayHandle, name: &str, value: f64) -> bool {
        let mut roots = self.lock();
        match roots.iter_mut().find(|(h, _)| *h == handle) {
            Some((_, node)) => node.set_value(name, value),
            None => false,
        }
    }

    pub fn get_value(&self, handle: PlayHandle, name: &str) -> Option<f64> {
        let roots = self.lock();
        roots
            .iter()
            .find(|(h, _)| *h == handle)
            .and_then(|(_, node)| node.get_value(name))
    }

    /// Drop every playing node.
    pub fn clear(&self) {
        let roots = {
            let mut roots = self.lock();
            self.count.store(0, Ordering::Release);
            std::mem::replace(&mut *roots, Vec::new())
        };
        drop(roots);
    }

    /// Whether the output clipped since the last call. Reading clears the flag.
    pub fn take_saturated(&self) -> bool {
        self.saturated.swap(false, Ordering::AcqRel)
    }

    /// Ask the renderer to fade out.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

/// A linear gain ramp that avoids clicks when the output starts or stops.
#[derive(Debug, Clone)]
pub struct Fade {
    gain: f64,
    step: f64,
    rising: bool,
}

impl Fade {
    pub fn new(sample_rate: u32) -> Self {
        let frames = (sample_rate as f64 * FADE_MS / 1000.0).max(1.0);
        Self {
            gain: 0.0,
            step: 1.0 / frames,
            rising: true,
        }
    }

    pub fn fade_out(&mut self) {
        self.rising = false;
    }

    /// Gain for the current frame, then advance the ramp.
    pub fn next_gain(&mut self) -> f64 {
        let gain = self.gain;
        self.gain = if self.rising {
            (self.gain + self.step).min(1.0)
        } else {
            (self.gain - self.step).max(0.0)
        };
        gain
    }

    /// True once a fade out has reached silence.
    pub fn is_silent(&self) -> bool {
        !self.rising && self.gain <= 0.0
    }
}

/// The audio callback. Lives on the audio thread.
pub struct Renderer {
    set: Arc<PlaybackSet>,
    fade: Fade,
}

impl Renderer {
    pub fn new(set: Arc<PlaybackSet>, sample_rate: u32) -> Self {
        Self {
            set,
            fade: Fade::new(sample_rate),
        }
    }

    /// Fill `out` with interleaved stereo frames.
    pub fn render(&mut self, out: &mut [i16]) {
        if self.set.is_stopping() {
            self.fade.fade_out();
        }
        if self.set.count() == 0 {
            // The fade still runs, so that a stop request finishes on an empty set
            for _ in out.chunks_exact(2) {
                self.fade.next_gain();
            }
            out.iter_mut().for_each(|s| *s = 0);
            return;
        }

        let mut saturated = false;
        {
            let mut roots = self.set.lock();
            let active = roots.len().max(1) as f64;
            for frame in out.chunks_exact_mut(2) {
                let mut mix = Stereo::ZERO;
                for (_, node) in roots.iter_mut() {
                    node.next(&mut mix, 1.0);
                }
                let (clipped, clipped_now) = mix.clip(1.0);
                saturated |= clipped_now;
                let scaled = clipped * (self.fade.next_gain() / active);
                frame[0] = to_i16(scaled.left);
                frame[1] = to_i16(scaled.right);
            }
        }
        if saturated {
            self.set.saturated.store(true, Ordering::Release);
        }
    }

    /// Fade out this output only, leaving the playback set untouched.
    pub fn stop(&mut self) {
        self.fade.fade_out();
    }

    /// The output has faded out completely after a stop request.
    pub fn is_finished(&self) -> bool {
        self.fade.is_silent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::constant;
    use crate::node::Node;

    struct Invalid;

    impl Node for Invalid {
        fn next(&mut self, _out: &mut Stereo<f64>, _speed: f64) {}
        fn is_valid(&self) -> bool {
            false
        }
    }

    /// Renderer with the fade-in already completed.
    fn faded_in(set: &Arc<PlaybackSet>) -> Renderer {
        let mut renderer = Renderer::new(Arc::clone(set), 8_000);
        while renderer.fade.gain < 1.0 {
            renderer.fade.next_gain();
        }
        renderer
    }

    #[test]
    fn count_follows_mutations() {
        let set = PlaybackSet::new();
        let a = set.play(constant(0.1, 0.1)).unwrap();
        let b = set.play(constant(0.2, 0.2)).unwrap();
        assert_eq!(set.count(), 2);
        assert!(set.has(a));
        assert!(set.remove(a));
        assert!(!set.has(a));
        assert!(!set.remove(a));
        assert_eq!(set.count(), 1);
        assert!(set.has(b));
        set.clear();
        assert_eq!(set.count(), 0);
    }

    #[test]
    fn invalid_nodes_are_not_played() {
        let set = PlaybackSet::new();
        assert_eq!(set.play(Box::new(Invalid)), None);
        assert_eq!(set.count(), 0);
    }

    #[test]
    fn silence_without_roots() {
        let set = Arc::new(PlaybackSet::new());
        let mut renderer = faded_in(&set);
        let mut out = [7i16; 8];
        renderer.render(&mut out);
        assert_eq!(out, [0; 8]);
    }

    #[test]
    fn mixdown_scales_by_active_count() {
        let set = Arc::new(PlaybackSet::new());
        set.play(constant(0.5, -0.5));
        set.play(constant(0.5, 0.0));
        let mut renderer = faded_in(&set);
        let mut out = [0i16; 4];
        renderer.render(&mut out);
        assert_eq!(out, [to_i16(0.5), to_i16(-0.25), to_i16(0.5), to_i16(-0.25)]);
        assert!(!set.take_saturated());
    }

    #[test]
    fn clipping_sets_saturation_once() {
        let set = Arc::new(PlaybackSet::new());
        set.play(constant(1.5, 0.0));
        let mut renderer = faded_in(&set);
        let mut out = [0i16; 2];
        renderer.render(&mut out);
        assert_eq!(out[0], i16::MAX);
        assert!(set.take_saturated());
        assert!(!set.take_saturated());
    }

    #[test]
    fn fade_ramps_linearly_and_finishes() {
        let mut fade = Fade::new(1000);
        let gains: Vec<_> = (0..12).map(|_| fade.next_gain()).collect();
        assert_eq!(gains[0], 0.0);
        assert!((gains[5] - 0.5).abs() < 1e-9);
        assert_eq!(gains[11], 1.0);
        fade.fade_out();
        assert!(!fade.is_silent());
        for _ in 0..10 {
            fade.next_gain();
        }
        assert!(fade.is_silent());
    }

    #[test]
    fn stop_fades_renderer_out() {
        let set = Arc::new(PlaybackSet::new());
        set.play(constant(0.5, 0.5));
        let mut renderer = faded_in(&set);
        set.stop();
        let mut out = vec![0i16; 2 * 200];
        renderer.render(&mut out);
        assert!(renderer.is_finished());
        assert_eq!(out[out.len() - 1], 0);
    }

    #[test]
    fn stop_finishes_after_last_root_was_removed() {
        let set = Arc::new(PlaybackSet::new());
        let handle = set.play(crate::node::testing::build("sin 440")).unwrap();
        let mut renderer = Renderer::new(Arc::clone(&set), 48_000);
        let mut out = vec![0i16; 2 * 64];
        for _ in 0..10 {
            renderer.render(&mut out);
        }
        assert!(set.remove(handle));
        set.stop();
        // 10 ms at 48 kHz are 480 frames
        for _ in 0..8 {
            renderer.render(&mut out);
        }
        assert!(renderer.is_finished());
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn stop_on_a_set_that_never_played() {
        let set = Arc::new(PlaybackSet::new());
        let mut renderer = faded_in(&set);
        set.stop();
        // 10 ms at 8 kHz are 80 frames
        let mut out = vec![0i16; 2 * 100];
        renderer.render(&mut out);
        assert!(renderer.is_finished());
    }

    #[test]
    fn live_parameter_changes() {
        let set = PlaybackSet::new();
        let handle = set.play(crate::node::testing::build("sin 440")).unwrap();
        assert_eq!(set.get_value(handle, "freq"), Some(440.0));
        assert!(set.set_value(handle, "freq", 220.0));
        assert_eq!(set.get_value(handle, "freq"), Some(220.0));
        assert!(!set.set_value(handle, "nonsense", 1.0));
    }

    #[test]
    fn render_thread_and_control_thread_share_the_set() {
        let set = Arc::new(PlaybackSet::new());
        let render_set = Arc::clone(&set);
        let renderer = std::thread::spawn(move || {
            let mut renderer = Renderer::new(render_set, 48_000);
            let mut out = vec![0i16; 2 * 64];
            for _ in 0..200 {
                renderer.render(&mut out);
            }
        });
        for _ in 0..200 {
            if let Some(handle) = set.play(constant(0.1, 0.1)) {
                assert!(set.remove(handle));
            }
        }
        renderer.join().unwrap();
        assert_eq!(set.count(), 0);
    }
}
