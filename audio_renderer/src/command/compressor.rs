// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt::Write;
use std::ops::Range;

use audio_dsp::fixed_point::Q15;

use crate::command::copy_segments;
use crate::command::Command;
use crate::command::CommandListProcessor;
use crate::common::MAX_CHANNELS;
use crate::effect::CompressorParameter;
use crate::effect::CompressorStatistics;
use crate::effect::ParameterState;
use crate::state::StateHandle;

const DETECTOR_FLOOR: f32 = 1e-10;
const SILENCE_DB: f32 = -74.;
const KNEE_HALF_WIDTH_DB: f32 = 1.5;

/// Gain for `db`, keeping only the fractional octave of the exponent as the
/// DSP firmware does.
fn firmware_db_to_gain(db: f32) -> f32 {
    let octaves = db / 20. * 3.3219;
    2f32.powf((octaves - octaves.trunc()) * 0.69315)
}

/// Detector and gain smoother memory, plus the derived constants.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompressorState {
    pub detector_average: f32,
    pub gain_prev: f32,
    pub gain_smoothed: f32,
    pub knee_factor: f32,
    pub knee_lower: f32,
    pub knee_upper: f32,
    pub gain_smoothing: f32,
    pub makeup_gain: f32,
    pub output_gain: f32,
    pub statistics: CompressorStatistics,
}

impl CompressorState {
    /// Resets the detector and smoother, then derives the constants.
    pub fn init(&mut self, parameter: &CompressorParameter) {
        *self = Self {
            detector_average: 0.,
            gain_prev: 1.,
            gain_smoothed: 1.,
            statistics: CompressorStatistics::initial(),
            ..Default::default()
        };
        self.set_params(parameter);
    }

    pub fn set_params(&mut self, parameter: &CompressorParameter) {
        let ratio_inv = 1. / parameter.compressor_ratio;
        self.makeup_gain = if parameter.makeup_gain_enabled != 0 {
            parameter.threshold * 0.5 * (ratio_inv - 1.) - 3.
        } else {
            0.
        };
        self.gain_smoothing = parameter.release_coeff;
        self.output_gain = firmware_db_to_gain(parameter.out_gain + self.makeup_gain);
        self.knee_factor = (1. - ratio_inv) / 6.;
        self.knee_upper = parameter.threshold + KNEE_HALF_WIDTH_DB;
        self.knee_lower = parameter.threshold - KNEE_HALF_WIDTH_DB;
    }

    /// Target gain for a detector level of `level_db`, starting from
    /// `gain`.
    fn static_gain(&self, parameter: &CompressorParameter, level_db: f32, gain: f32) -> f32 {
        if level_db < self.knee_lower {
            return gain;
        }
        let reduction_db = if level_db >= self.knee_upper {
            (1. / parameter.compressor_ratio - 1.) * (level_db - parameter.threshold)
        } else {
            let over = level_db - self.knee_lower;
            over * over * -self.knee_factor
        };
        firmware_db_to_gain(reduction_db)
    }

    fn smooth(&mut self, parameter: &CompressorParameter, target: f32) {
        let mut smoothing = parameter.release_coeff;
        let mut held = target;
        let delta = self.gain_prev - target;
        if delta <= 0.08 {
            smoothing = parameter.attack_coeff;
            if delta >= -0.08 && (self.gain_smoothed - target).abs() >= 0.001 {
                held = self.gain_prev;
            }
        }
        self.gain_prev = held;
        self.gain_smoothed += (target - self.gain_smoothed) * smoothing;
    }
}

/// Feed-forward RMS compressor over up to [`MAX_CHANNELS`] linked channels.
pub fn apply_compressor(
    arena: &mut [i32],
    segments: &[(Range<usize>, Range<usize>)],
    parameter: &CompressorParameter,
    state: &mut CompressorState,
    sample_count: usize,
) {
    if segments.is_empty() {
        return;
    }
    let statistics_enabled = parameter.statistics_enabled != 0;
    if statistics_enabled && parameter.statistics_reset_required != 0 {
        state.statistics = CompressorStatistics::initial();
    }

    for i in 0..sample_count {
        let sum: f32 = segments
            .iter()
            .map(|(input, _)| {
                let sample = Q15::from_base(arena[input.start + i] as i64);
                (sample * sample).to_f32()
            })
            .sum();
        let mean = sum / segments.len() as f32;
        state.detector_average += parameter.detector_coeff * (mean - state.detector_average);

        let (level_db, gain) = if state.detector_average >= DETECTOR_FLOOR {
            (10. * state.detector_average.log10(), 1.)
        } else {
            (SILENCE_DB, 0.)
        };
        let target = state.static_gain(parameter, level_db, gain);
        state.smooth(parameter, target);

        let gain = state.gain_smoothed * state.output_gain;
        for (ch, (input, output)) in segments.iter().enumerate() {
            let sample = arena[input.start + i];
            if statistics_enabled {
                state.statistics.last_samples[ch] =
                    Q15::from_base((sample as i64).abs()).to_f32();
            }
            arena[output.start + i] = (sample as f32 * gain) as i32;
        }
        if statistics_enabled {
            let stats = &mut state.statistics;
            stats.maximum_mean = stats.maximum_mean.max(mean);
            stats.minimum_gain = stats.minimum_gain.min(gain);
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompressorCommand {
    pub parameter: CompressorParameter,
    /// Absolute mix buffer indices per channel.
    pub inputs: [i16; MAX_CHANNELS],
    pub outputs: [i16; MAX_CHANNELS],
    pub state: Option<StateHandle>,
    pub effect_enabled: bool,
}

impl Command for CompressorCommand {
    fn dump(&self, _processor: &CommandListProcessor, string: &mut String) {
        let _ = write!(
            string,
            "CompressorCommand\n\tenabled {}\n\tinputs: ",
            self.effect_enabled
        );
        for input in &self.inputs {
            let _ = write!(string, "{input:02X}, ");
        }
        let _ = write!(string, "\n\toutputs: ");
        for output in &self.outputs {
            let _ = write!(string, "{output:02X}, ");
        }
        string.push('\n');
    }

    fn verify(&self, _processor: &CommandListProcessor) -> bool {
        true
    }

    fn process(&self, processor: &mut CommandListProcessor) {
        let channel_count = self.parameter.channel_count.clamp(0, MAX_CHANNELS as i16) as usize;
        let Some(segments) = processor.channel_segments(channel_count, &self.inputs, &self.outputs)
        else {
            log::error!(
                "compressor: channel buffers out of bounds, inputs {:?} outputs {:?}",
                &self.inputs[..channel_count],
                &self.outputs[..channel_count]
            );
            return;
        };

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

        let Some(state) = self
            .state
            .and_then(|handle| states.compressor.get_mut(handle))
        else {
            log::error!("compressor: no detector state");
            return;
        };
        match ParameterState::from_u8(self.parameter.state) {
            Some(ParameterState::Initialized) => state.init(&self.parameter),
            Some(ParameterState::Updating) => state.set_params(&self.parameter),
            Some(ParameterState::Updated) => {}
            None => log::warn!("compressor: unknown parameter state {}", self.parameter.state),
        }
        apply_compressor(arena, &segments, &self.parameter, state, sample_count);
    }
}
