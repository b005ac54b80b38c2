// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use zerocopy::AsBytes;

use crate::behavior::BehaviorInfo;
use crate::behavior::CURRENT_REVISION;
use crate::command::BiquadFilterParameter;
use crate::command::BiquadFilterParameter2;
use crate::common::align_up;
use crate::common::MAX_BIQUAD_FILTERS;
use crate::common::MAX_CHANNELS;
use crate::common::MAX_MIX_BUFFERS;
use crate::common::TARGET_SAMPLE_RATE;
use crate::effect::BiquadFilterEffectParameter;
use crate::effect::CompressorParameter;
use crate::effect::EffectType;
use crate::effect::InParameterVersion1;
use crate::effect::LimiterParameter;
use crate::splitter::DestinationInParameter;
use crate::splitter::DestinationInParameterVersion2b;
use crate::splitter::InParameterHeader;
use crate::splitter::SplitterInfoInParameter;
use crate::splitter::DESTINATION_MAGIC;
use crate::splitter::HEADER_MAGIC;
use crate::splitter::INFO_MAGIC;
use crate::Error;
use crate::Result;

/// An effect applied in place to every channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Stage {
    /// Q14 coefficients, feedback terms negated.
    BiquadFilter {
        b: [i16; 3],
        a: [i16; 2],
    },
    Limiter {
        attack_time: f32,
        release_time: f32,
        threshold: f32,
        #[serde(default)]
        makeup_gain: f32,
        ratio: f32,
    },
    Compressor {
        threshold: f32,
        ratio: f32,
        /// Times in milliseconds.
        attack_time: f32,
        release_time: f32,
        #[serde(default = "default_detector_time")]
        detector_time: f32,
        #[serde(default)]
        out_gain: f32,
        #[serde(default)]
        makeup_gain: bool,
    },
}

/// Float coefficient biquad run on each channel after the stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DestinationFilter {
    pub numerator: [f32; 3],
    /// Feedback terms, negated.
    pub denominator: [f32; 2],
}

impl DestinationFilter {
    fn to_parameter(self) -> BiquadFilterParameter2 {
        BiquadFilterParameter2 {
            enabled: 1,
            numerator: self.numerator,
            denominator: self.denominator,
            ..Default::default()
        }
    }
}

fn default_detector_time() -> f32 {
    10.
}

fn default_sample_count() -> u32 {
    240
}

fn default_revision() -> u32 {
    CURRENT_REVISION
}

/// One pole step size reaching `1 - 1/e` after `time_ms`.
fn step_coefficient(time_ms: f32, sample_rate: u32) -> f32 {
    1. - (-1000. / (time_ms * sample_rate as f32)).exp()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RendererConfig {
    /// Samples per channel rendered by one command list.
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "default_revision")]
    pub revision: u32,
    /// Use the double precision biquad kernels.
    #[serde(default)]
    pub use_float_processing: bool,
    pub stages: Vec<Stage>,
    /// Routed through one splitter destination per channel. Needs a
    /// revision with float coefficient filters.
    #[serde(default)]
    pub destination_filters: Vec<DestinationFilter>,
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn behavior(&self) -> Result<BehaviorInfo> {
        BehaviorInfo::with_revision(self.revision)
    }

    fn validate(&self) -> Result<()> {
        if self.sample_count == 0 {
            return Err(Error::InvalidConfig("sample_count must be positive".into()));
        }
        if self.revision > CURRENT_REVISION {
            return Err(Error::InvalidConfig(format!(
                "revision {} is newer than {CURRENT_REVISION}",
                self.revision
            )));
        }
        if self.destination_filters.len() > MAX_BIQUAD_FILTERS {
            return Err(Error::InvalidConfig(format!(
                "{} destination filters; at most {MAX_BIQUAD_FILTERS} supported",
                self.destination_filters.len()
            )));
        }
        for (index, stage) in self.stages.iter().enumerate() {
            let valid = match stage {
                Stage::BiquadFilter { .. } => true,
                Stage::Limiter {
                    attack_time,
                    release_time,
                    ratio,
                    ..
                } => *attack_time > 0. && *release_time > 0. && *ratio >= 1.,
                Stage::Compressor {
                    attack_time,
                    release_time,
                    detector_time,
                    ratio,
                    ..
                } => *attack_time > 0. && *release_time > 0. && *detector_time > 0. && *ratio >= 1.,
            };
            if !valid {
                return Err(Error::InvalidConfig(format!(
                    "stage {index}: times must be positive and ratio at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Guest effect records running the stages in order, in place on mix
    /// buffers `0..channels`.
    pub fn effect_records(&self, channels: usize) -> Result<Vec<InParameterVersion1>> {
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "{channels} channels; 1 to {MAX_CHANNELS} supported"
            )));
        }
        let mut buffers = [0i8; MAX_CHANNELS];
        for (ch, buffer) in buffers.iter_mut().enumerate().take(channels) {
            *buffer = ch as i8;
        }
        let sample_rate = TARGET_SAMPLE_RATE;

        let records = self.stages.iter().enumerate().map(|(order, stage)| {
            let mut record = match stage {
                Stage::BiquadFilter { b, a } => InParameterVersion1::with_specific(
                    EffectType::BiquadFilter,
                    true,
                    &BiquadFilterEffectParameter {
                        inputs: buffers,
                        outputs: buffers,
                        biquad: BiquadFilterParameter { b: *b, a: *a },
                        channel_count: channels as i8,
                        state: 0,
                    },
                ),
                Stage::Limiter {
                    attack_time,
                    release_time,
                    threshold,
                    makeup_gain,
                    ratio,
                } => InParameterVersion1::with_specific(
                    EffectType::Limiter,
                    true,
                    &LimiterParameter {
                        inputs: buffers,
                        outputs: buffers,
                        channel_count: channels as u16,
                        sample_rate: sample_rate as i32,
                        attack_time: *attack_time,
                        release_time: *release_time,
                        threshold: *threshold,
                        makeup_gain: *makeup_gain,
                        ratio: *ratio,
                        is_enabled: 1,
                        ..Default::default()
                    },
                ),
                Stage::Compressor {
                    threshold,
                    ratio,
                    attack_time,
                    release_time,
                    detector_time,
                    out_gain,
                    makeup_gain,
                } => InParameterVersion1::with_specific(
                    EffectType::Compressor,
                    true,
                    &CompressorParameter {
                        inputs: buffers,
                        outputs: buffers,
                        channel_count_max: MAX_CHANNELS as i16,
                        channel_count: channels as i16,
                        sample_rate: sample_rate as i32,
                        threshold: *threshold,
                        compressor_ratio: *ratio,
                        attack_time: *attack_time as i32,
                        release_time: *release_time as i32,
                        detector_coeff: step_coefficient(*detector_time, sample_rate),
                        release_coeff: step_coefficient(*release_time, sample_rate),
                        attack_coeff: step_coefficient(*attack_time, sample_rate),
                        out_gain: *out_gain,
                        makeup_gain_enabled: *makeup_gain as u8,
                        ..Default::default()
                    },
                ),
            };
            record.process_order = order as u32;
            record
        });
        Ok(records.collect())
    }

    /// Guest splitter section linking splitter 0 to destinations
    /// `0..channels`, destination `n` routing channel `n` to mix `n` through
    /// the destination filters.
    pub fn splitter_update(&self, channels: usize) -> Result<Vec<u8>> {
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "{channels} channels; 1 to {MAX_CHANNELS} supported"
            )));
        }
        let mut filters = [BiquadFilterParameter2::default(); MAX_BIQUAD_FILTERS];
        for (slot, filter) in filters.iter_mut().zip(&self.destination_filters) {
            *slot = filter.to_parameter();
        }

        let mut bytes = InParameterHeader {
            magic: HEADER_MAGIC,
            info_count: 1,
            destination_count: channels as i32,
            ..Default::default()
        }
        .as_bytes()
        .to_vec();
        bytes.extend_from_slice(
            SplitterInfoInParameter {
                magic: INFO_MAGIC,
                id: 0,
                sample_rate: TARGET_SAMPLE_RATE,
                destination_count: channels as u32,
            }
            .as_bytes(),
        );
        for id in 0..channels as u32 {
            bytes.extend_from_slice(&id.to_le_bytes());
        }

        let v2b = self.behavior()?.is_splitter_destination_v2b_supported();
        for ch in 0..channels {
            let mut mix_volumes = [0.; MAX_MIX_BUFFERS];
            mix_volumes[ch] = 1.;
            let legacy = DestinationInParameter {
                magic: DESTINATION_MAGIC,
                id: ch as i32,
                mix_volumes,
                mix_id: ch as u32,
                in_use: 1,
                ..Default::default()
            };
            if v2b {
                bytes.extend_from_slice(
                    DestinationInParameterVersion2b {
                        magic: legacy.magic,
                        id: legacy.id,
                        mix_volumes: legacy.mix_volumes,
                        mix_id: legacy.mix_id,
                        biquad_filters: filters,
                        in_use: legacy.in_use,
                        ..Default::default()
                    }
                    .as_bytes(),
                );
            } else {
                bytes.extend_from_slice(legacy.as_bytes());
            }
        }
        bytes.resize(align_up(bytes.len(), 0x10), 0);
        Ok(bytes)
    }
}
