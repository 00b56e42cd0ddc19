// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! This is the namespace for all parts dealing with individual samples.

use std::ops;

/// Convenience type for making things stereo, e.g. individual samples or whole buffers.
///
/// ```
/// use syn_patch::wave::*;
///
/// let stereo = Stereo::new(0.25, 0.5);
/// let stereo2 = stereo + Stereo::new(0.5, -0.25);
/// assert_eq!(stereo2 * 2.0, Stereo::new(1.5, 0.5));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Stereo<T> {
    pub left: T,
    pub right: T,
}

impl<T> Stereo<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn mono(mono: T) -> Self
    where
        T: Copy,
    {
        Self::new(mono, mono)
    }
}

impl Stereo<f64> {
    pub const ZERO: Stereo<f64> = Stereo {
        left: 0.0,
        right: 0.0,
    };

    /// Average of both channels.
    pub fn average(self) -> f64 {
        (self.left + self.right) / 2.0
    }

    /// Symmetric hard clip of both channels to `[-limit, limit]`.
    ///
    /// Returns the clipped sample and whether any channel exceeded the limit.
    ///
    /// ```
    /// # use syn_patch::wave::*;
    /// assert_eq!(Stereo::new(1.5, -0.5).clip(1.0), (Stereo::new(1.0, -0.5), true));
    /// assert_eq!(Stereo::new(0.5, -0.5).clip(1.0), (Stereo::new(0.5, -0.5), false));
    /// ```
    pub fn clip(self, limit: f64) -> (Self, bool) {
        let (left, l_clipped) = clip_channel(self.left, limit);
        let (right, r_clipped) = clip_channel(self.right, limit);
        (Stereo::new(left, right), l_clipped || r_clipped)
    }

    /// Largest absolute value of both channels.
    pub fn peak(self) -> f64 {
        self.left.abs().max(self.right.abs())
    }
}

fn clip_channel(value: f64, limit: f64) -> (f64, bool) {
    if value > limit {
        (limit, true)
    } else if value < -limit {
        (-limit, true)
    } else {
        (value, false)
    }
}

/// Scale a sample in `[-1, 1]` to the full range of signed 16 bit PCM.
///
/// ```
/// # use syn_patch::wave::*;
/// assert_eq!(to_i16(1.0), 32767);
/// assert_eq!(to_i16(-1.0), -32767);
/// assert_eq!(to_i16(0.0), 0);
/// ```
pub fn to_i16(sample: f64) -> i16 {
    (sample.max(-1.0).min(1.0) * i16::MAX as f64) as i16
}

/// Copy interleaved `i16` samples to little endian bytes.
///
/// Returns the number of samples that were actually copied.
/// Might be less than the number of input samples if the output buffer was not large enough.
pub fn copy_i16_bytes(samples: &[i16], bytes: &mut [u8]) -> usize {
    let mut processed = 0;
    for (sample, target) in samples.iter().zip(bytes.chunks_exact_mut(2)) {
        target.copy_from_slice(&sample.to_le_bytes());
        processed += 1;
    }
    processed
}

impl std::iter::Sum for Stereo<f64> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let mut out = Stereo::new(0.0, 0.0);
        for x in iter {
            out += x;
        }
        out
    }
}

impl<T: ops::Add> ops::Add for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn add(self, rhs: Self) -> Self::Output {
        Stereo {
            left: self.left + rhs.left,
            right: self.right + rhs.right,
        }
    }
}

impl<T: ops::AddAssign> ops::AddAssign for Stereo<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl<T: ops::Sub> ops::Sub for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn sub(self, rhs: Self) -> Self::Output {
        Stereo {
            left: self.left - rhs.left,
            right: self.right - rhs.right,
        }
    }
}

impl<T: ops::Mul + Copy> ops::Mul<T> for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn mul(self, rhs: T) -> Self::Output {
        Stereo {
            left: self.left * rhs,
            right: self.right * rhs,
        }
    }
}

impl<T: ops::MulAssign + Copy> ops::MulAssign<T> for Stereo<T> {
    fn mul_assign(&mut self, rhs: T) {
        self.left *= rhs;
        self.right *= rhs;
    }
}

impl<T: ops::Div + Copy> ops::Div<T> for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn div(self, rhs: T) -> Self::Output {
        Stereo {
            left: self.left / rhs,
            right: self.right / rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_reports_saturation_per_channel() {
        assert_eq!(Stereo::new(0.2, -3.0).clip(1.0), (Stereo::new(0.2, -1.0), true));
        assert_eq!(Stereo::new(0.9, 0.9).clip(0.5), (Stereo::new(0.5, 0.5), true));
    }

    #[test]
    fn pcm_bytes_are_little_endian() {
        let mut bytes = [0u8; 4];
        assert_eq!(copy_i16_bytes(&[1, -2], &mut bytes), 2);
        assert_eq!(bytes, [1, 0, 0xfe, 0xff]);
    }
}
