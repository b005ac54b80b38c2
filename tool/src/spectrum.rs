// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::f32::consts::PI;
use std::mem::size_of;
use std::path::PathBuf;

use anyhow::ensure;
use audio_dsp::fixed_point::linear_to_db;
use audio_dsp::Fft;
use audio_dsp::FftMode;
use clap::Args;
use rustfft::num_complex::Complex32;

use crate::wav::read_wav;
use crate::wav::FULL_SCALE;

#[derive(Args)]
pub(crate) struct SpectrumCommand {
    /// Path to the WAVE file
    input: PathBuf,
    /// Transform size, a power of two
    #[arg(long, default_value_t = 1024)]
    size: u32,
    /// Number of peaks to print
    #[arg(long, default_value_t = 5)]
    peaks: usize,
    /// Channel to analyze
    #[arg(long, default_value_t = 0)]
    channel: usize,
}

impl SpectrumCommand {
    pub(crate) fn run(&self) -> anyhow::Result<()> {
        let (spec, channels) = read_wav(&self.input)?;
        ensure!(
            self.channel < channels.len(),
            "channel {} out of {}",
            self.channel,
            channels.len()
        );
        let samples: Vec<f32> = channels[self.channel]
            .iter()
            .map(|&s| s as f32 / FULL_SCALE)
            .collect();
        for (frequency, db) in strongest_bins(&samples, self.size, spec.sample_rate, self.peaks)? {
            println!("{frequency:10.1} Hz {db:8.2} dBFS");
        }
        Ok(())
    }
}

/// Frequency and level of the `count` strongest bins of a Hann windowed
/// transform over the first `size` samples.
pub(crate) fn strongest_bins(
    samples: &[f32],
    size: u32,
    sample_rate: u32,
    count: usize,
) -> anyhow::Result<Vec<(f32, f32)>> {
    let n = size as usize;
    ensure!(
        samples.len() >= n,
        "need at least {n} samples; got {}",
        samples.len()
    );

    let mut work = vec![
        Complex32::default();
        Fft::work_buffer_size(size, FftMode::RealToComplex) / size_of::<Complex32>()
    ];
    let mut fft = Fft::new(size, FftMode::RealToComplex, &mut work)?;
    let windowed: Vec<f32> = samples[..n]
        .iter()
        .enumerate()
        .map(|(i, &x)| x * 0.5 * (1. - (2. * PI * i as f32 / n as f32).cos()))
        .collect();
    let mut bins = vec![Complex32::default(); n / 2 + 1];
    fft.process_real_to_complex(&mut bins, &windowed, size)?;

    // A windowed sine of amplitude A peaks at A * n / 4.
    let scale = 4. / n as f32;
    let mut levels: Vec<(usize, f32)> = bins.iter().map(|c| c.norm() * scale).enumerate().collect();
    levels.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(levels
        .into_iter()
        .take(count)
        .map(|(bin, level)| {
            (
                bin as f32 * sample_rate as f32 / n as f32,
                linear_to_db(level),
            )
        })
        .collect())
}
