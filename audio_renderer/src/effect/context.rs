// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::mem::size_of;

use zerocopy::FromBytes;

use crate::effect::EffectInfo;
use crate::effect::EffectResultState;
use crate::effect::EffectType;
use crate::effect::InParameterVersion1;
use crate::effect::OutStatus;
use crate::effect::ParameterVersion;
use crate::effect::PoolMapper;
use crate::state::DspStates;
use crate::Error;
use crate::Result;

/// The renderer's effect slots and their double buffered result states.
#[derive(Debug)]
pub struct EffectContext {
    infos: Vec<EffectInfo>,
    result_states_cpu: Vec<EffectResultState>,
    result_states_dsp: Vec<EffectResultState>,
    dsp_state_count: usize,
}

impl EffectContext {
    pub fn new(effect_count: usize, dsp_state_count: usize) -> Self {
        Self {
            infos: vec![EffectInfo::Invalid; effect_count],
            result_states_cpu: vec![EffectResultState::default(); effect_count],
            result_states_dsp: vec![EffectResultState::default(); dsp_state_count],
            dsp_state_count,
        }
    }

    pub fn count(&self) -> usize {
        self.infos.len()
    }

    pub fn info(&self, index: usize) -> Option<&EffectInfo> {
        self.infos.get(index)
    }

    pub fn info_mut(&mut self, index: usize) -> Option<&mut EffectInfo> {
        self.infos.get_mut(index)
    }

    pub fn infos_mut(&mut self) -> impl Iterator<Item = &mut EffectInfo> {
        self.infos.iter_mut()
    }

    /// Guest visible result state of effect `index`.
    pub fn result_state(&self, index: usize) -> Option<&EffectResultState> {
        self.result_states_cpu.get(index)
    }

    pub fn dsp_shared_result_state(&self, index: usize) -> Option<&EffectResultState> {
        self.result_states_dsp.get(index)
    }

    pub fn dsp_shared_result_state_mut(&mut self, index: usize) -> Option<&mut EffectResultState> {
        self.result_states_dsp.get_mut(index)
    }

    /// Applies one guest record per effect slot and returns the number of
    /// bytes consumed. A record naming a different effect type than its slot
    /// holds replaces the slot.
    pub fn update(
        &mut self,
        input: &[u8],
        version: ParameterVersion,
        pool_mapper: &dyn PoolMapper,
    ) -> Result<usize> {
        let record_size = size_of::<InParameterVersion1>();
        let want = record_size * self.infos.len();
        if input.len() < want {
            return Err(Error::ShortParameter {
                want,
                got: input.len(),
            });
        }

        for (index, chunk) in input[..want].chunks_exact(record_size).enumerate() {
            let record = InParameterVersion1::read_from(chunk).ok_or(Error::ShortParameter {
                want: record_size,
                got: chunk.len(),
            })?;

            let effect_type = EffectInfo::new(record.effect_type()).effect_type();
            if self.infos[index].effect_type() != effect_type {
                if effect_type == EffectType::Invalid && record.effect_type() != EffectType::Invalid {
                    log::warn!(
                        "effect {index}: unsupported type {:?}",
                        record.effect_type()
                    );
                }
                self.replace(index, EffectInfo::new(effect_type));
            }

            let error = self.infos[index].update(&record, version, pool_mapper);
            if !error.error_code.is_success() {
                log::error!("effect {index}: update failed with {:?}", error.error_code);
            }
        }
        Ok(want)
    }

    fn replace(&mut self, index: usize, info: EffectInfo) {
        if let Some(state) = self.result_states_cpu.get_mut(index) {
            info.initialize_result_state(state);
        }
        if let Some(state) = self.result_states_dsp.get_mut(index) {
            info.initialize_result_state(state);
        }
        self.infos[index] = info;
    }

    /// Status records to return to the guest, one per effect slot.
    pub fn out_statuses(&self) -> Vec<OutStatus> {
        self.infos
            .iter()
            .map(|info| {
                let mut status = OutStatus::default();
                info.store_status(&mut status);
                status
            })
            .collect()
    }

    /// Copies the DSP state of every stateful effect into its DSP shared
    /// result state.
    pub fn publish_dsp_states(&mut self, states: &DspStates) {
        for (info, result) in self.infos.iter().zip(self.result_states_dsp.iter_mut()) {
            let stored = match info {
                EffectInfo::Limiter(limiter) => limiter
                    .state_handle()
                    .and_then(|handle| states.limiter.get(handle))
                    .and_then(|state| result.store(state)),
                EffectInfo::Compressor(compressor) => compressor
                    .state_handle()
                    .and_then(|handle| states.compressor.get(handle))
                    .and_then(|state| result.store(&state.statistics)),
                EffectInfo::Invalid | EffectInfo::BiquadFilter(_) => Some(()),
            };
            if stored.is_none() {
                log::debug!("{:?} has no DSP state yet", info.effect_type());
            }
        }
    }

    /// Publishes DSP result states to the guest side copies. A failing
    /// effect, such as an unused slot, is logged and does not stop the
    /// others.
    pub fn update_state_by_dsp_shared(&mut self) {
        let count = self
            .dsp_state_count
            .min(self.infos.len())
            .min(self.result_states_cpu.len())
            .min(self.result_states_dsp.len());
        for index in 0..count {
            if let Err(e) = self.infos[index].update_result_state(
                index,
                &mut self.result_states_cpu[index],
                &self.result_states_dsp[index],
            ) {
                log::debug!("effect {index}: result state not updated: {e}");
            }
        }
    }
}
