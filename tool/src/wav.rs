// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::Path;

use anyhow::ensure;
use anyhow::Context;
use hound::SampleFormat;
use hound::WavReader;
use hound::WavSpec;
use hound::WavWriter;

/// Full scale of the 16-bit samples the renderer mixes.
pub(crate) const FULL_SCALE: f32 = 32768.;

/// Reads `path` into one vector per channel, scaled to 16-bit range.
pub(crate) fn read_wav(path: &Path) -> anyhow::Result<(WavSpec, Vec<Vec<i32>>)> {
    let reader = WavReader::open(path).with_context(|| format!("open {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    ensure!(channels > 0, "{} has no channels", path.display());

    let samples: Vec<i32> = match spec.sample_format {
        SampleFormat::Int => {
            let bits = spec.bits_per_sample as u32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| to_16_bit(s, bits)))
                .collect::<Result<_, _>>()?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|s| (s * FULL_SCALE).round() as i32))
            .collect::<Result<_, _>>()?,
    };

    let mut out = vec![Vec::with_capacity(samples.len() / channels); channels];
    for (i, sample) in samples.into_iter().enumerate() {
        out[i % channels].push(sample);
    }
    Ok((spec, out))
}

fn to_16_bit(sample: i32, bits: u32) -> i32 {
    if bits > 16 {
        sample >> (bits - 16)
    } else {
        sample << (16 - bits)
    }
}

/// Writes 16-bit PCM, saturating out of range samples.
pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: &[Vec<i32>]) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("create {}", path.display()))?;
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    for i in 0..frames {
        for channel in channels {
            let sample = channel[i].clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Interleaves `channels` as floats in [-1, 1).
pub(crate) fn interleave_f32(channels: &[Vec<i32>]) -> Vec<f32> {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    (0..frames)
        .flat_map(|i| channels.iter().map(move |ch| ch[i] as f32 / FULL_SCALE))
        .collect()
}
