// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Splitters fan a voice out to several mixes. Each splitter owns a
//! singly linked chain of destinations, each carrying the volumes for one
//! target mix.

mod context;
mod destination;
mod info;

pub use context::*;
pub use destination::*;
pub use info::*;

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::command::BiquadFilterParameter2;
use crate::common::make_magic;
use crate::common::MAX_BIQUAD_FILTERS;
use crate::common::MAX_MIX_BUFFERS;

pub const HEADER_MAGIC: u32 = make_magic(b'S', b'N', b'D', b'H');
pub const INFO_MAGIC: u32 = make_magic(b'S', b'N', b'D', b'I');
pub const DESTINATION_MAGIC: u32 = make_magic(b'S', b'N', b'D', b'D');

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct InParameterHeader {
    pub magic: u32,
    pub info_count: i32,
    pub destination_count: i32,
    pub reserved: [u8; 0x14],
}

/// Followed on the wire by `destination_count` destination ids (`u32`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct SplitterInfoInParameter {
    pub magic: u32,
    pub id: i32,
    pub sample_rate: u32,
    pub destination_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct DestinationInParameter {
    pub magic: u32,
    pub id: i32,
    pub mix_volumes: [f32; MAX_MIX_BUFFERS],
    pub mix_id: u32,
    pub in_use: u8,
    pub reset_prev_volume: u8,
    pub reserved: [u8; 2],
}

/// Destination record with per-destination float biquad filters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct DestinationInParameterVersion2b {
    pub magic: u32,
    pub id: i32,
    pub mix_volumes: [f32; MAX_MIX_BUFFERS],
    pub mix_id: u32,
    pub biquad_filters: [BiquadFilterParameter2; MAX_BIQUAD_FILTERS],
    pub in_use: u8,
    pub reset_prev_volume: u8,
    pub reserved: [u8; 10],
}

static_assertions::const_assert_eq!(std::mem::size_of::<InParameterHeader>(), 0x20);
static_assertions::const_assert_eq!(std::mem::size_of::<SplitterInfoInParameter>(), 0x10);
static_assertions::const_assert_eq!(std::mem::size_of::<DestinationInParameter>(), 0x70);
static_assertions::const_assert_eq!(std::mem::size_of::<DestinationInParameterVersion2b>(), 0xA8);

impl DestinationInParameterVersion2b {
    /// The fields shared with [`DestinationInParameter`].
    pub fn to_legacy(&self) -> DestinationInParameter {
        DestinationInParameter {
            magic: self.magic,
            id: self.id,
            mix_volumes: self.mix_volumes,
            mix_id: self.mix_id,
            in_use: self.in_use,
            reset_prev_volume: self.reset_prev_volume,
            reserved: [0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn layout() {
        assert_eq!(HEADER_MAGIC.to_le_bytes(), *b"SNDH");
        assert_eq!(INFO_MAGIC.to_le_bytes(), *b"SNDI");
        assert_eq!(DESTINATION_MAGIC.to_le_bytes(), *b"SNDD");

        assert_eq!(offset_of!(DestinationInParameter, mix_id), 0x68);
        assert_eq!(offset_of!(DestinationInParameter, in_use), 0x6C);
        assert_eq!(offset_of!(DestinationInParameter, reset_prev_volume), 0x6D);
        assert_eq!(offset_of!(DestinationInParameterVersion2b, biquad_filters), 0x6C);
        assert_eq!(offset_of!(DestinationInParameterVersion2b, in_use), 0x9C);
        assert_eq!(offset_of!(DestinationInParameterVersion2b, reset_prev_volume), 0x9D);
    }

    #[test]
    fn to_legacy() {
        let v2b = DestinationInParameterVersion2b {
            magic: DESTINATION_MAGIC,
            id: 3,
            mix_volumes: [0.5; MAX_MIX_BUFFERS],
            mix_id: 8,
            in_use: 1,
            reset_prev_volume: 1,
            ..Default::default()
        };
        let legacy = v2b.to_legacy();
        assert_eq!(legacy.id, 3);
        assert_eq!(legacy.mix_id, 8);
        assert_eq!(legacy.mix_volumes, [0.5; MAX_MIX_BUFFERS]);
        assert_eq!((legacy.in_use, legacy.reset_prev_volume), (1, 1));
    }
}
