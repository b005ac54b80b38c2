// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Arithmetic helpers that reproduce the audio DSP's integer rounding and
//! bit-level state storage exactly.

use std::ops::Mul;

/// A signed fixed-point number with `FRAC` fractional bits stored in 64 bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FixedPoint<const FRAC: u32> {
    raw: i64,
}

/// Coefficient format of the biquad filter parameters.
pub type Q14 = FixedPoint<14>;
/// Sample format used by the compressor detector.
pub type Q15 = FixedPoint<15>;

impl<const FRAC: u32> FixedPoint<FRAC> {
    pub const ONE: Self = Self { raw: 1 << FRAC };

    /// Wraps an already scaled raw value.
    pub const fn from_base(raw: i64) -> Self {
        Self { raw }
    }

    pub const fn from_int(value: i64) -> Self {
        Self {
            raw: value.wrapping_shl(FRAC),
        }
    }

    pub fn from_f64(value: f64) -> Self {
        Self {
            raw: (value * Self::scale()).round() as i64,
        }
    }

    pub const fn base(self) -> i64 {
        self.raw
    }

    pub fn to_f64(self) -> f64 {
        self.raw as f64 / Self::scale()
    }

    pub fn to_f32(self) -> f32 {
        self.to_f64() as f32
    }

    /// Integer part, rounding half up.
    pub fn to_int_rounded(self) -> i64 {
        round_shift_right(self.raw, FRAC)
    }

    fn scale() -> f64 {
        (1u64 << FRAC) as f64
    }
}

impl<const FRAC: u32> Mul for FixedPoint<FRAC> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let product = (self.raw as i128 * rhs.raw as i128) >> FRAC;
        Self {
            raw: product.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
        }
    }
}

/// `value >> bits`, rounding half up.
pub fn round_shift_right(value: i64, bits: u32) -> i64 {
    if bits == 0 {
        return value;
    }
    value.wrapping_add(1 << (bits - 1)) >> bits
}

/// Stores a double in a 64-bit integer state slot without changing its bits.
pub fn f64_to_bits_i64(value: f64) -> i64 {
    value.to_bits() as i64
}

/// Reads back a double stored by [`f64_to_bits_i64`].
pub fn i64_bits_to_f64(bits: i64) -> f64 {
    f64::from_bits(bits as u64)
}

pub fn clamp_to_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Clamps in double precision before truncating toward zero.
pub fn clamp_f64_to_i32(value: f64) -> i32 {
    value.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

pub fn db_to_linear(db: f32) -> f32 {
    10_f32.powf(db / 20.)
}

pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0. {
        return -1000.;
    }
    20. * linear.log10()
}
