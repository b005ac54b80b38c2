// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::behavior::ErrorInfo;
use crate::command::CompressorCommand;
use crate::command::CompressorState;
use crate::common::MAX_CHANNELS;
use crate::effect::EffectBase;
use crate::effect::EffectResultState;
use crate::effect::InParameterVersion1;
use crate::effect::ParameterState;
use crate::effect::ParameterVersion;
use crate::effect::PoolMapper;
use crate::effect::RESULT_STATE_SIZE;
use crate::effect::SPECIFIC_SIZE;
use crate::state::StateHandle;
use crate::state::StateTable;

/// Compressor settings. Levels in dB; the coefficients are one pole
/// smoothing factors precomputed by the guest.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct CompressorParameter {
    pub inputs: [i8; MAX_CHANNELS],
    pub outputs: [i8; MAX_CHANNELS],
    pub channel_count_max: i16,
    pub channel_count: i16,
    pub sample_rate: i32,
    pub threshold: f32,
    pub compressor_ratio: f32,
    pub attack_time: i32,
    pub release_time: i32,
    pub detector_coeff: f32,
    pub release_coeff: f32,
    pub attack_coeff: f32,
    pub out_gain: f32,
    pub state: u8,
    pub makeup_gain_enabled: u8,
    pub statistics_enabled: u8,
    pub statistics_reset_required: u8,
    pub reserved: [u8; 8],
}

/// Compressor metering published to the guest.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct CompressorStatistics {
    pub maximum_mean: f32,
    pub minimum_gain: f32,
    pub last_samples: [f32; MAX_CHANNELS],
}

static_assertions::const_assert_eq!(std::mem::size_of::<CompressorParameter>(), 0x40);
static_assertions::const_assert_eq!(std::mem::size_of::<CompressorStatistics>(), 0x20);
static_assertions::const_assert!(std::mem::size_of::<CompressorParameter>() <= SPECIFIC_SIZE);
static_assertions::const_assert!(std::mem::size_of::<CompressorStatistics>() <= RESULT_STATE_SIZE);

impl CompressorStatistics {
    pub fn initial() -> Self {
        Self {
            maximum_mean: 0.,
            minimum_gain: 1.,
            last_samples: [0.; MAX_CHANNELS],
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompressorInfo {
    base: EffectBase,
    parameter: CompressorParameter,
    state: Option<StateHandle>,
}

impl CompressorInfo {
    pub(crate) fn new() -> Self {
        Self {
            base: EffectBase::new(),
            parameter: CompressorParameter::default(),
            state: None,
        }
    }

    pub fn base(&self) -> &EffectBase {
        &self.base
    }

    pub fn parameter(&self) -> &CompressorParameter {
        &self.parameter
    }

    pub fn state_handle(&self) -> Option<StateHandle> {
        self.state
    }

    /// Version 1 records carry no compressor; they are accepted and ignored.
    pub fn update(
        &mut self,
        params: &InParameterVersion1,
        version: ParameterVersion,
        pool_mapper: &dyn PoolMapper,
    ) -> ErrorInfo {
        if version == ParameterVersion::Version1 {
            return ErrorInfo::SUCCESS;
        }
        if let Some(parameter) = CompressorParameter::read_from_prefix(&params.specific[..]) {
            self.parameter = parameter;
        }
        self.base.apply(params);
        self.base.map_workbuffer(params, pool_mapper);
        ErrorInfo::SUCCESS
    }

    pub fn update_for_command_generation(&mut self) {
        self.base.update_usage_state();
        self.parameter.state = ParameterState::Updated as u8;
        self.parameter.statistics_reset_required = 0;
    }

    pub fn initialize_result_state(&self, result_state: &mut EffectResultState) {
        result_state
            .store(&CompressorStatistics::initial())
            .expect("compressor statistics fit the result state");
    }

    /// Builds the frame's compressor command, allocating the DSP state on
    /// first use.
    pub fn command(
        &mut self,
        buffer_offset: i16,
        states: &mut StateTable<CompressorState>,
    ) -> CompressorCommand {
        let state = *self
            .state
            .get_or_insert_with(|| states.insert(CompressorState::default()));
        CompressorCommand {
            parameter: self.parameter,
            inputs: self.parameter.inputs.map(|i| i as i16 + buffer_offset),
            outputs: self.parameter.outputs.map(|i| i as i16 + buffer_offset),
            state: Some(state),
            effect_enabled: self.base.enabled,
        }
    }
}
