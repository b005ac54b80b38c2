// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Revision negotiation between the guest's audio SDK and the renderer.

use crate::common::make_magic;
use crate::common::CpuAddr;
use crate::Error;
use crate::Result;

/// Newest revision this renderer implements.
pub const CURRENT_REVISION: u32 = 15;

const BASE_MAGIC: u32 = make_magic(b'R', b'E', b'V', b'0');

/// Magic the guest sends for `revision`: `'R' 'E' 'V' '0' + revision`.
pub const fn revision_magic(revision: u32) -> u32 {
    BASE_MAGIC.wrapping_add(revision << 24)
}

/// Revision number carried by `magic`.
pub fn parse_revision_magic(magic: u32) -> Result<u32> {
    if magic & 0x00ff_ffff != BASE_MAGIC & 0x00ff_ffff || magic < BASE_MAGIC {
        return Err(Error::UnsupportedRevision(magic));
    }
    Ok((magic - BASE_MAGIC) >> 24)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: Self = Self(0);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    pub error_code: ResultCode,
    pub address: CpuAddr,
}

impl ErrorInfo {
    pub const SUCCESS: Self = Self {
        error_code: ResultCode::SUCCESS,
        address: 0,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BehaviorInfo {
    user_revision: u32,
}

impl Default for BehaviorInfo {
    fn default() -> Self {
        Self {
            user_revision: CURRENT_REVISION,
        }
    }
}

impl BehaviorInfo {
    /// Behavior for a guest built against `revision`.
    pub fn with_revision(revision: u32) -> Result<Self> {
        if revision > CURRENT_REVISION {
            return Err(Error::UnsupportedRevision(revision_magic(revision)));
        }
        Ok(Self {
            user_revision: revision,
        })
    }

    pub fn from_magic(magic: u32) -> Result<Self> {
        Self::with_revision(parse_revision_magic(magic)?)
    }

    pub fn user_revision(&self) -> u32 {
        self.user_revision
    }

    fn supports(&self, revision: u32) -> bool {
        self.user_revision >= revision
    }

    pub fn is_splitter_supported(&self) -> bool {
        self.supports(2)
    }

    /// Without the fix each splitter may only link `destinations / infos`
    /// destinations.
    pub fn is_splitter_bug_fixed(&self) -> bool {
        self.supports(5)
    }

    pub fn is_effect_info_version2_supported(&self) -> bool {
        self.supports(9)
    }

    pub fn is_splitter_prev_volume_reset_supported(&self) -> bool {
        self.supports(13)
    }

    /// Splitter destinations carry float biquad coefficients.
    pub fn is_splitter_destination_v2b_supported(&self) -> bool {
        self.supports(15)
    }

    pub fn is_biquad_filter_float_coefficients_supported(&self) -> bool {
        self.supports(15)
    }
}
