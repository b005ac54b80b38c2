// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt::Write;
use std::ops::Range;

use audio_dsp::fixed_point::db_to_linear;

use crate::command::copy_segments;
use crate::command::Command;
use crate::command::CommandListProcessor;
use crate::common::MAX_CHANNELS;
use crate::effect::LimiterParameter;
use crate::effect::LimiterState;
use crate::state::StateHandle;

/// Time constant in milliseconds to a one pole smoothing coefficient.
fn smoothing_coefficient(time_ms: f32, sample_rate: u32) -> f32 {
    (-1. / (time_ms * sample_rate as f32 / 1000.)).exp()
}

/// Peak limiter over up to [`MAX_CHANNELS`] linked channels.
pub fn apply_limiter(
    arena: &mut [i32],
    segments: &[(Range<usize>, Range<usize>)],
    parameter: &LimiterParameter,
    state: &mut LimiterState,
    sample_rate: u32,
    sample_count: usize,
) {
    let attack = smoothing_coefficient(parameter.attack_time, sample_rate);
    let release = smoothing_coefficient(parameter.release_time, sample_rate);
    let threshold = db_to_linear(parameter.threshold);
    let makeup_gain = db_to_linear(parameter.makeup_gain);
    let exponent = (parameter.ratio - 1.) / parameter.ratio;

    for i in 0..sample_count {
        let mut peak = 0f32;
        for (ch, (input, _)) in segments.iter().enumerate() {
            let level = (arena[input.start + i] as f32).abs();
            state.channel_peaks[ch] = level;
            peak = peak.max(level);
        }

        let coefficient = if peak > state.envelope {
            attack
        } else {
            release
        };
        state.envelope = coefficient * state.envelope + (1. - coefficient) * peak;

        let gain = if state.envelope > threshold {
            1. / (state.envelope / threshold).powf(exponent)
        } else {
            1.
        };
        state.gain_reduction = gain;

        for (input, output) in segments {
            let sample = arena[input.start + i] as f32;
            arena[output.start + i] = (sample * gain * makeup_gain) as i32;
        }
    }
}

#[derive(Clone, Debug)]
pub struct LimiterCommand {
    pub parameter: LimiterParameter,
    /// Absolute mix buffer indices per channel.
    pub inputs: [i16; MAX_CHANNELS],
    pub outputs: [i16; MAX_CHANNELS],
    pub state: Option<StateHandle>,
    pub effect_enabled: bool,
}

impl Command for LimiterCommand {
    fn dump(&self, _processor: &CommandListProcessor, string: &mut String) {
        let _ = writeln!(
            string,
            "LimiterCommand\n\tenabled {} channels {}",
            self.effect_enabled, self.parameter.channel_count
        );
    }

    fn verify(&self, _processor: &CommandListProcessor) -> bool {
        true
    }

    fn process(&self, processor: &mut CommandListProcessor) {
        let channel_count = usize::from(self.parameter.channel_count).min(MAX_CHANNELS);
        let Some(segments) = processor.channel_segments(channel_count, &self.inputs, &self.outputs)
        else {
            log::error!(
                "limiter: channel buffers out of bounds, inputs {:?} outputs {:?}",
                &self.inputs[..channel_count],
                &self.outputs[..channel_count]
            );
            return;
        };

        let sample_rate = processor.target_sample_rate;
        let sample_count = processor.sample_count as usize;
        let CommandListProcessor {
            mix_buffers,
            states,
            ..
        } = processor;
        let arena = mix_buffers.as_mut_slice();

        if !self.effect_enabled {
            copy_segments(arena, &segments);
            return;
        }

        let Some(state) = self.state.and_then(|handle| states.limiter.get_mut(handle)) else {
            log::error!("limiter: no envelope state");
            return;
        };
        apply_limiter(
            arena,
            &segments,
            &self.parameter,
            state,
            sample_rate,
            sample_count,
        );
    }
}
