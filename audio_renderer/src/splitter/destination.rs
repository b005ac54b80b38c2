// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::behavior::BehaviorInfo;
use crate::command::BiquadFilterCommand;
use crate::command::BiquadFilterParameter2;
use crate::command::BiquadFilterState;
use crate::common::MAX_BIQUAD_FILTERS;
use crate::common::MAX_MIX_BUFFERS;
use crate::common::UNUSED_MIX_ID;
use crate::splitter::DestinationInParameter;
use crate::splitter::DESTINATION_MAGIC;
use crate::state::StateHandle;
use crate::state::StateTable;

/// One node of a splitter's destination chain.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitterDestinationData {
    id: i32,
    mix_id: i32,
    mix_volumes: [f32; MAX_MIX_BUFFERS],
    prev_mix_volumes: [f32; MAX_MIX_BUFFERS],
    biquad_filters: [BiquadFilterParameter2; MAX_BIQUAD_FILTERS],
    biquad_states: [Option<StateHandle>; MAX_BIQUAD_FILTERS],
    /// Filters whose state has been cleared since they were last enabled.
    biquad_initialized: [bool; MAX_BIQUAD_FILTERS],
    pub(crate) next: Option<usize>,
    /// Splitter whose chain holds this node.
    pub(crate) owner: Option<usize>,
    in_use: bool,
    need_update: bool,
}

impl SplitterDestinationData {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            mix_id: UNUSED_MIX_ID,
            mix_volumes: [0.; MAX_MIX_BUFFERS],
            prev_mix_volumes: [0.; MAX_MIX_BUFFERS],
            biquad_filters: Default::default(),
            biquad_states: [None; MAX_BIQUAD_FILTERS],
            biquad_initialized: [false; MAX_BIQUAD_FILTERS],
            next: None,
            owner: None,
            in_use: false,
            need_update: false,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn mix_id(&self) -> i32 {
        self.mix_id
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// In use and routed to a mix.
    pub fn is_configured(&self) -> bool {
        self.in_use && self.mix_id != UNUSED_MIX_ID
    }

    pub fn mix_volumes(&self) -> &[f32; MAX_MIX_BUFFERS] {
        &self.mix_volumes
    }

    pub fn mix_volumes_mut(&mut self) -> &mut [f32; MAX_MIX_BUFFERS] {
        &mut self.mix_volumes
    }

    pub fn prev_mix_volumes(&self) -> &[f32; MAX_MIX_BUFFERS] {
        &self.prev_mix_volumes
    }

    pub fn mix_volume(&self, index: usize) -> f32 {
        self.mix_volumes[index]
    }

    pub fn prev_mix_volume(&self, index: usize) -> f32 {
        self.prev_mix_volumes[index]
    }

    pub fn biquad_filters(&self) -> &[BiquadFilterParameter2; MAX_BIQUAD_FILTERS] {
        &self.biquad_filters
    }

    pub fn biquad_filters_mut(&mut self) -> &mut [BiquadFilterParameter2; MAX_BIQUAD_FILTERS] {
        &mut self.biquad_filters
    }

    /// Commands running the enabled filters over mix buffer `buffer` in
    /// place. Empty when the revision has no float coefficient filters. A
    /// filter's state is cleared on the first frame after it is enabled.
    pub fn biquad_commands(
        &mut self,
        behavior: &BehaviorInfo,
        buffer: i16,
        states: &mut StateTable<BiquadFilterState>,
    ) -> Vec<BiquadFilterCommand> {
        if !behavior.is_biquad_filter_float_coefficients_supported() {
            return Vec::new();
        }
        let mut commands = Vec::new();
        for (i, filter) in self.biquad_filters.iter().enumerate() {
            if !filter.is_enabled() {
                self.biquad_initialized[i] = false;
                continue;
            }
            let state = *self.biquad_states[i]
                .get_or_insert_with(|| states.insert(BiquadFilterState::default()));
            commands.push(BiquadFilterCommand {
                input: buffer,
                output: buffer,
                biquad_float: *filter,
                state: Some(state),
                needs_init: !self.biquad_initialized[i],
                use_float_processing: true,
                use_float_coefficients: true,
                ..Default::default()
            });
            self.biquad_initialized[i] = true;
        }
        commands
    }

    /// Index of the next destination in the chain.
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    pub fn needs_update(&self) -> bool {
        self.need_update
    }

    /// Applies a guest record addressed to this destination. Records with
    /// another id or a bad magic are ignored.
    pub fn update(&mut self, params: &DestinationInParameter) {
        if params.id != self.id || params.magic != DESTINATION_MAGIC {
            return;
        }
        self.mix_id = params.mix_id as i32;
        self.mix_volumes = params.mix_volumes;

        let in_use = params.in_use != 0;
        if (!self.in_use && in_use) || params.reset_prev_volume != 0 {
            self.prev_mix_volumes = self.mix_volumes;
            self.need_update = false;
        }
        self.in_use = in_use;
    }

    pub fn mark_as_need_to_update_internal_state(&mut self) {
        self.need_update = true;
    }

    /// Latches the current volumes as the previous ones once they have been
    /// used for a frame.
    pub fn update_internal_state(&mut self) {
        if self.in_use && self.need_update {
            self.prev_mix_volumes = self.mix_volumes;
        }
        self.need_update = false;
    }

    pub fn clear_mix_volume(&mut self) {
        self.mix_volumes = [0.; MAX_MIX_BUFFERS];
        self.prev_mix_volumes = [0.; MAX_MIX_BUFFERS];
    }
}
