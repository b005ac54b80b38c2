// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::behavior::ErrorInfo;
use crate::command::LimiterCommand;
use crate::common::MAX_CHANNELS;
use crate::effect::EffectBase;
use crate::effect::EffectResultState;
use crate::effect::InParameterVersion1;
use crate::effect::ParameterState;
use crate::effect::PoolMapper;
use crate::effect::RESULT_STATE_SIZE;
use crate::effect::SPECIFIC_SIZE;
use crate::state::StateHandle;
use crate::state::StateTable;

/// Limiter settings. Times are in milliseconds, levels in dB.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct LimiterParameter {
    pub inputs: [i8; MAX_CHANNELS],
    pub outputs: [i8; MAX_CHANNELS],
    pub channel_count: u16,
    pub padding: u16,
    pub sample_rate: i32,
    pub attack_time: f32,
    pub release_time: f32,
    pub threshold: f32,
    pub makeup_gain: f32,
    pub ratio: f32,
    pub state: u8,
    pub is_enabled: u8,
    pub reserved: [u8; 2],
}

/// Envelope follower state, also published to the guest.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct LimiterState {
    pub envelope: f32,
    pub gain_reduction: f32,
    pub peak_hold: f32,
    pub peak_hold_count: u32,
    pub channel_peaks: [f32; MAX_CHANNELS],
}

static_assertions::const_assert_eq!(std::mem::size_of::<LimiterParameter>(), 0x2C);
static_assertions::const_assert_eq!(std::mem::size_of::<LimiterState>(), 0x28);
static_assertions::const_assert!(std::mem::size_of::<LimiterParameter>() <= SPECIFIC_SIZE);
static_assertions::const_assert!(std::mem::size_of::<LimiterState>() <= RESULT_STATE_SIZE);

impl LimiterState {
    pub fn initial() -> Self {
        Self {
            envelope: 1.,
            gain_reduction: 1.,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct LimiterInfo {
    base: EffectBase,
    parameter: LimiterParameter,
    state: Option<StateHandle>,
}

impl LimiterInfo {
    pub(crate) fn new() -> Self {
        Self {
            base: EffectBase::new(),
            parameter: LimiterParameter::default(),
            state: None,
        }
    }

    pub fn base(&self) -> &EffectBase {
        &self.base
    }

    pub fn parameter(&self) -> &LimiterParameter {
        &self.parameter
    }

    pub fn state_handle(&self) -> Option<StateHandle> {
        self.state
    }

    /// The limiter parameters are taken as-is.
    pub fn update(
        &mut self,
        params: &InParameterVersion1,
        pool_mapper: &dyn PoolMapper,
    ) -> ErrorInfo {
        self.base.apply(params);
        if let Some(parameter) = LimiterParameter::read_from_prefix(&params.specific[..]) {
            self.parameter = parameter;
        }
        self.base.map_workbuffer(params, pool_mapper);
        ErrorInfo::SUCCESS
    }

    pub fn update_for_command_generation(&mut self) {
        self.base.update_usage_state();
        self.parameter.state = ParameterState::Updated as u8;
    }

    pub fn initialize_result_state(&self, result_state: &mut EffectResultState) {
        result_state
            .store(&LimiterState::initial())
            .expect("limiter state fits the result state");
    }

    /// Builds the frame's limiter command, allocating the envelope state on
    /// first use.
    pub fn command(
        &mut self,
        buffer_offset: i16,
        states: &mut StateTable<LimiterState>,
    ) -> LimiterCommand {
        let state = *self
            .state
            .get_or_insert_with(|| states.insert(LimiterState::initial()));
        LimiterCommand {
            parameter: self.parameter,
            inputs: self.parameter.inputs.map(|i| i as i16 + buffer_offset),
            outputs: self.parameter.outputs.map(|i| i as i16 + buffer_offset),
            state: Some(state),
            effect_enabled: self.base.enabled,
        }
    }
}
