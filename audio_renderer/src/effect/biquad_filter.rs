// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::behavior::ErrorInfo;
use crate::command::BiquadFilterCommand;
use crate::command::BiquadFilterParameter;
use crate::command::BiquadFilterState;
use crate::common::MAX_CHANNELS;
use crate::effect::EffectBase;
use crate::effect::InParameterVersion1;
use crate::effect::ParameterState;
use crate::effect::ParameterVersion;
use crate::effect::SPECIFIC_SIZE;
use crate::state::StateHandle;
use crate::state::StateTable;

/// Channel buffer indices must lie in `[-1, MAX_BUFFER_INDEX)`.
const MAX_BUFFER_INDEX: i8 = (MAX_CHANNELS * 2) as i8;

/// Q14 unity gain, used in place of the filter while the effect is disabled.
const PASS_THROUGH: BiquadFilterParameter = BiquadFilterParameter {
    b: [1 << 14, 0, 0],
    a: [0, 0],
};

/// Biquad effect parameters. Both record versions use this layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct BiquadFilterEffectParameter {
    pub inputs: [i8; MAX_CHANNELS],
    pub outputs: [i8; MAX_CHANNELS],
    pub biquad: BiquadFilterParameter,
    pub channel_count: i8,
    pub state: u8,
}

static_assertions::const_assert_eq!(std::mem::size_of::<BiquadFilterEffectParameter>(), 0x18);
static_assertions::const_assert!(std::mem::size_of::<BiquadFilterEffectParameter>() <= SPECIFIC_SIZE);

impl BiquadFilterEffectParameter {
    fn channel_count_is_valid(&self) -> bool {
        if (0..=MAX_CHANNELS as i8).contains(&self.channel_count) {
            return true;
        }
        log::warn!(
            "biquad filter effect: invalid channel count {}, disabling",
            self.channel_count
        );
        false
    }

    fn state_is_valid(&self) -> bool {
        if self.state <= ParameterState::Updated as u8 {
            return true;
        }
        log::warn!(
            "biquad filter effect: invalid parameter state {}, disabling",
            self.state
        );
        false
    }

    fn indices_are_valid(&self, channels: usize) -> bool {
        let valid = |index: i8| (-1..MAX_BUFFER_INDEX).contains(&index);
        for ch in 0..channels {
            if !valid(self.inputs[ch]) {
                log::warn!(
                    "biquad filter effect: invalid input buffer {} for channel {ch}, disabling",
                    self.inputs[ch]
                );
                return false;
            }
            if !valid(self.outputs[ch]) {
                log::warn!(
                    "biquad filter effect: invalid output buffer {} for channel {ch}, disabling",
                    self.outputs[ch]
                );
                return false;
            }
        }
        true
    }

    /// Version 1 checks every index slot.
    fn validate_version1(&self) -> bool {
        self.channel_count_is_valid() && self.state_is_valid() && self.indices_are_valid(MAX_CHANNELS)
    }

    /// Version 2 only checks the indices of the active channels.
    fn validate_version2(&self) -> bool {
        self.channel_count_is_valid()
            && self.indices_are_valid(self.channel_count as usize)
            && self.state_is_valid()
    }
}

#[derive(Clone, Debug)]
pub struct BiquadFilterInfo {
    base: EffectBase,
    parameter: BiquadFilterEffectParameter,
    states: [Option<StateHandle>; MAX_CHANNELS],
}

impl BiquadFilterInfo {
    pub(crate) fn new() -> Self {
        Self {
            base: EffectBase::new(),
            parameter: BiquadFilterEffectParameter::default(),
            states: [None; MAX_CHANNELS],
        }
    }

    pub fn base(&self) -> &EffectBase {
        &self.base
    }

    pub fn parameter(&self) -> &BiquadFilterEffectParameter {
        &self.parameter
    }

    /// Copies the guest parameters. Corrupt parameters disable the effect
    /// rather than failing the update.
    pub fn update(&mut self, params: &InParameterVersion1, version: ParameterVersion) -> ErrorInfo {
        let valid = match BiquadFilterEffectParameter::read_from_prefix(&params.specific[..]) {
            Some(parameter) => {
                self.parameter = parameter;
                match version {
                    ParameterVersion::Version1 => parameter.validate_version1(),
                    ParameterVersion::Version2 => parameter.validate_version2(),
                }
            }
            None => false,
        };
        self.base.apply(params);
        self.base.enabled &= valid;
        ErrorInfo::SUCCESS
    }

    pub fn update_for_command_generation(&mut self) {
        self.base.update_usage_state();
        if matches!(
            ParameterState::from_u8(self.parameter.state),
            Some(ParameterState::Initialized | ParameterState::Updating)
        ) {
            self.parameter.state = ParameterState::Updated as u8;
        }
    }

    /// One filter command per active channel. A disabled effect passes its
    /// inputs through unchanged.
    pub fn commands(
        &mut self,
        buffer_offset: i16,
        use_float_processing: bool,
        states: &mut StateTable<BiquadFilterState>,
    ) -> Vec<BiquadFilterCommand> {
        let channel_count = self.parameter.channel_count.clamp(0, MAX_CHANNELS as i8) as usize;
        let enabled = self.base.enabled;
        let needs_init = self.parameter.state == ParameterState::Initialized as u8;

        (0..channel_count)
            .map(|ch| {
                let state = *self.states[ch]
                    .get_or_insert_with(|| states.insert(BiquadFilterState::default()));
                BiquadFilterCommand {
                    // A wrapped index fails verification.
                    input: (self.parameter.inputs[ch] as i16).wrapping_add(buffer_offset),
                    output: (self.parameter.outputs[ch] as i16).wrapping_add(buffer_offset),
                    biquad: if enabled {
                        self.parameter.biquad
                    } else {
                        PASS_THROUGH
                    },
                    state: Some(state),
                    needs_init: enabled && needs_init,
                    use_float_processing,
                    ..Default::default()
                }
            })
            .collect()
    }
}
