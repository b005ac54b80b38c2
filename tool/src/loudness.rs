// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::PathBuf;

use audio_dsp::LoudnessCalculator;
use audio_dsp::LoudnessParameters;
use clap::Args;

use crate::wav::interleave_f32;
use crate::wav::read_wav;

#[derive(Args)]
pub(crate) struct LoudnessCommand {
    /// Path to the WAVE file
    input: PathBuf,
    /// Momentary window in seconds
    #[arg(long, default_value_t = 0.4)]
    momentary: f32,
}

#[derive(Debug, PartialEq)]
pub(crate) struct Measurement {
    pub momentary: f32,
    pub short_term: f32,
    pub integrated: f32,
}

impl LoudnessCommand {
    pub(crate) fn run(&self) -> anyhow::Result<()> {
        let m = self.measure()?;
        println!("momentary:  {:.2} LUFS", m.momentary);
        println!("short-term: {:.2} LUFS", m.short_term);
        println!("integrated: {:.2} LUFS", m.integrated);
        Ok(())
    }

    fn measure(&self) -> anyhow::Result<Measurement> {
        let (spec, channels) = read_wav(&self.input)?;
        let mut calc = LoudnessCalculator::new();
        calc.initialize(LoudnessParameters {
            sample_rate: spec.sample_rate,
            channel_count: channels.len() as u32,
            momentary_time_constant: self.momentary,
            ..Default::default()
        })?;

        // Analyze in 10 ms blocks.
        let block = (spec.sample_rate as usize / 100).max(1);
        let samples = interleave_f32(&channels);
        for chunk in samples.chunks(block * channels.len()) {
            calc.analyze(chunk, (chunk.len() / channels.len()) as u32)?;
        }
        Ok(Measurement {
            momentary: calc.momentary_loudness(),
            short_term: calc.short_term_loudness(),
            integrated: calc.integrated_loudness(),
        })
    }
}
