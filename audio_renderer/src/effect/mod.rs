// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Effect parameter objects. Each frame the guest uploads one fixed-size
//! record per effect; the objects validate it and turn it into commands.

mod biquad_filter;
mod compressor;
mod context;
mod limiter;
mod pool_mapper;

pub use biquad_filter::*;
pub use compressor::*;
pub use context::*;
pub use limiter::*;
pub use pool_mapper::*;

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::behavior::ErrorInfo;
use crate::command::CommandEntry;
use crate::common::CpuAddr;
use crate::common::DspAddr;
use crate::state::DspStates;
use crate::Error;
use crate::Result;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectType {
    Invalid = 0,
    Mix = 1,
    Aux = 2,
    Delay = 3,
    Reverb = 4,
    I3dl2Reverb = 5,
    BiquadFilter = 6,
    LightLimiter = 7,
    Capture = 8,
    Compressor = 9,
    Limiter = 10,
}

impl EffectType {
    /// Unknown values map to `Invalid`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EffectType::Mix,
            2 => EffectType::Aux,
            3 => EffectType::Delay,
            4 => EffectType::Reverb,
            5 => EffectType::I3dl2Reverb,
            6 => EffectType::BiquadFilter,
            7 => EffectType::LightLimiter,
            8 => EffectType::Capture,
            9 => EffectType::Compressor,
            10 => EffectType::Limiter,
            _ => EffectType::Invalid,
        }
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterState {
    Initialized = 0,
    Updating = 1,
    Updated = 2,
}

impl ParameterState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ParameterState::Initialized),
            1 => Some(ParameterState::Updating),
            2 => Some(ParameterState::Updated),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UsageState {
    #[default]
    Invalid = 0,
    New = 1,
    Enabled = 2,
    Disabled = 3,
}

/// Bytes of effect specific parameters in a guest record.
pub const SPECIFIC_SIZE: usize = 0xA0;

/// Bytes of an effect's result state.
pub const RESULT_STATE_SIZE: usize = 0x80;

/// Layout revision of the guest's effect records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterVersion {
    Version1,
    Version2,
}

/// Guest record describing one effect.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct InParameterVersion1 {
    pub effect_type: u8,
    pub is_new: u8,
    pub enabled: u8,
    pub reserved: u8,
    pub mix_id: i32,
    pub workbuffer: CpuAddr,
    pub workbuffer_size: u64,
    pub process_order: u32,
    pub reserved2: [u8; 4],
    /// Effect specific parameter block.
    pub specific: [u8; SPECIFIC_SIZE],
}

/// Version 2 records share the version 1 layout.
pub type InParameterVersion2 = InParameterVersion1;

impl InParameterVersion1 {
    pub fn effect_type(&self) -> EffectType {
        EffectType::from_u8(self.effect_type)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }

    /// Builds a record carrying `specific` as its parameter block.
    pub fn with_specific<T: AsBytes>(effect_type: EffectType, enabled: bool, specific: &T) -> Self {
        let mut params = Self::new_zeroed();
        params.effect_type = effect_type as u8;
        params.enabled = enabled as u8;
        specific
            .write_to_prefix(&mut params.specific[..])
            .expect("effect parameter block larger than the specific slot");
        params
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct OutStatus {
    pub usage_state: u8,
    pub reserved: [u8; 15],
}

/// Opaque per-effect state shared between the DSP and the guest.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct EffectResultState {
    pub state: [u8; RESULT_STATE_SIZE],
}

static_assertions::const_assert_eq!(std::mem::size_of::<InParameterVersion1>(), 0xC0);
static_assertions::const_assert_eq!(std::mem::size_of::<OutStatus>(), 0x10);
static_assertions::const_assert_eq!(std::mem::size_of::<EffectResultState>(), 0x80);

impl Default for EffectResultState {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl EffectResultState {
    /// Reads a typed view of the leading bytes.
    pub fn view<T: FromBytes>(&self) -> Option<T> {
        T::read_from_prefix(&self.state[..])
    }

    /// Overwrites the leading bytes with `value`.
    pub fn store<T: AsBytes>(&mut self, value: &T) -> Option<()> {
        value.write_to_prefix(&mut self.state[..])
    }
}

/// Fields common to every effect kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectBase {
    pub mix_id: i32,
    pub process_order: u32,
    pub enabled: bool,
    pub usage_state: UsageState,
    /// DSP address of the work buffer, 0 when unmapped.
    pub workbuffer: DspAddr,
}

impl EffectBase {
    fn new() -> Self {
        Self {
            usage_state: UsageState::New,
            ..Default::default()
        }
    }

    fn apply(&mut self, params: &InParameterVersion1) {
        self.mix_id = params.mix_id;
        self.process_order = params.process_order;
        self.enabled = params.is_enabled();
    }

    fn map_workbuffer(&mut self, params: &InParameterVersion1, pool_mapper: &dyn PoolMapper) {
        self.workbuffer = match pool_mapper.translate(params.workbuffer, params.workbuffer_size) {
            Some(address) => address,
            None => {
                if params.workbuffer != 0 {
                    log::warn!(
                        "effect work buffer {:#x} ({} bytes) is not in a mapped pool",
                        params.workbuffer,
                        params.workbuffer_size
                    );
                }
                0
            }
        };
    }

    fn update_usage_state(&mut self) {
        self.usage_state = if self.enabled {
            UsageState::Enabled
        } else {
            UsageState::Disabled
        };
    }
}

/// An effect slot.
#[derive(Clone, Debug, Default)]
pub enum EffectInfo {
    #[default]
    Invalid,
    BiquadFilter(BiquadFilterInfo),
    Limiter(LimiterInfo),
    Compressor(CompressorInfo),
}

impl EffectInfo {
    /// Effects this renderer does not process map to `Invalid`.
    pub fn new(effect_type: EffectType) -> Self {
        match effect_type {
            EffectType::BiquadFilter => EffectInfo::BiquadFilter(BiquadFilterInfo::new()),
            EffectType::Limiter => EffectInfo::Limiter(LimiterInfo::new()),
            EffectType::Compressor => EffectInfo::Compressor(CompressorInfo::new()),
            _ => EffectInfo::Invalid,
        }
    }

    pub fn effect_type(&self) -> EffectType {
        match self {
            EffectInfo::Invalid => EffectType::Invalid,
            EffectInfo::BiquadFilter(_) => EffectType::BiquadFilter,
            EffectInfo::Limiter(_) => EffectType::Limiter,
            EffectInfo::Compressor(_) => EffectType::Compressor,
        }
    }

    pub fn base(&self) -> Option<&EffectBase> {
        match self {
            EffectInfo::Invalid => None,
            EffectInfo::BiquadFilter(info) => Some(info.base()),
            EffectInfo::Limiter(info) => Some(info.base()),
            EffectInfo::Compressor(info) => Some(info.base()),
        }
    }

    pub fn usage_state(&self) -> UsageState {
        self.base()
            .map(|base| base.usage_state)
            .unwrap_or(UsageState::Invalid)
    }

    pub fn is_enabled(&self) -> bool {
        self.base().is_some_and(|base| base.enabled)
    }

    pub fn update(
        &mut self,
        params: &InParameterVersion1,
        version: ParameterVersion,
        pool_mapper: &dyn PoolMapper,
    ) -> ErrorInfo {
        match self {
            EffectInfo::Invalid => ErrorInfo::SUCCESS,
            EffectInfo::BiquadFilter(info) => info.update(params, version),
            EffectInfo::Limiter(info) => info.update(params, pool_mapper),
            EffectInfo::Compressor(info) => info.update(params, version, pool_mapper),
        }
    }

    pub fn update_for_command_generation(&mut self) {
        match self {
            EffectInfo::Invalid => {}
            EffectInfo::BiquadFilter(info) => info.update_for_command_generation(),
            EffectInfo::Limiter(info) => info.update_for_command_generation(),
            EffectInfo::Compressor(info) => info.update_for_command_generation(),
        }
    }

    /// Commands running the effect on the mix buffers starting at
    /// `buffer_offset`. DSP states are allocated on first use.
    pub fn generate_commands(
        &mut self,
        buffer_offset: i16,
        use_float_processing: bool,
        states: &mut DspStates,
    ) -> Vec<CommandEntry> {
        match self {
            EffectInfo::Invalid => Vec::new(),
            EffectInfo::BiquadFilter(info) => info
                .commands(buffer_offset, use_float_processing, &mut states.biquad)
                .into_iter()
                .map(CommandEntry::from)
                .collect(),
            EffectInfo::Limiter(info) => {
                vec![info.command(buffer_offset, &mut states.limiter).into()]
            }
            EffectInfo::Compressor(info) => {
                vec![info.command(buffer_offset, &mut states.compressor).into()]
            }
        }
    }

    pub fn initialize_result_state(&self, result_state: &mut EffectResultState) {
        match self {
            EffectInfo::Invalid | EffectInfo::BiquadFilter(_) => {}
            EffectInfo::Limiter(info) => info.initialize_result_state(result_state),
            EffectInfo::Compressor(info) => info.initialize_result_state(result_state),
        }
    }

    /// Publishes the DSP side result state to the guest side copy.
    pub fn update_result_state(
        &self,
        index: usize,
        cpu_state: &mut EffectResultState,
        dsp_state: &EffectResultState,
    ) -> Result<()> {
        match self {
            EffectInfo::Invalid => Err(Error::InvalidEffect(index)),
            EffectInfo::BiquadFilter(_) => Ok(()),
            EffectInfo::Limiter(_) | EffectInfo::Compressor(_) => {
                *cpu_state = *dsp_state;
                Ok(())
            }
        }
    }

    pub fn store_status(&self, out: &mut OutStatus) {
        out.usage_state = self.usage_state() as u8;
    }
}
