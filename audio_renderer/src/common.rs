// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub const MAX_CHANNELS: usize = 6;
pub const MAX_MIX_BUFFERS: usize = 24;
pub const MAX_BIQUAD_FILTERS: usize = 2;
pub const UNUSED_MIX_ID: i32 = i32::MAX;
pub const TARGET_SAMPLE_RATE: u32 = 48000;

/// Address in the guest's address space.
pub type CpuAddr = u64;
/// Address as seen by the audio DSP.
pub type DspAddr = u64;

/// Four character code, first character in the lowest byte.
pub const fn make_magic(a: u8, b: u8, c: u8, d: u8) -> u32 {
    u32::from_le_bytes([a, b, c, d])
}

pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}
