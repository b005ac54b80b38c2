// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! BS.1770 style loudness metering: K-weighting, momentary, short-term and
//! integrated LUFS.

use std::f64::consts::PI;

use crate::Error;
use crate::Result;

pub const MAX_CHANNELS: u32 = 6;

/// Highest accepted sample rate. The history rings hold three seconds of
/// audio at the configured rate.
pub const MAX_SAMPLE_RATE: u32 = 192000;

/// Loudness reported for silence and before any audio is analyzed.
pub const SILENCE_LUFS: f32 = -70.;

const LFE_CHANNEL: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoudnessParameters {
    pub sample_rate: u32,
    pub channel_count: u32,
    /// Seconds.
    pub momentary_time_constant: f32,
    /// Seconds.
    pub short_term_time_constant: f32,
}

impl Default for LoudnessParameters {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channel_count: 2,
            momentary_time_constant: 0.4,
            short_term_time_constant: 3.,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    fn high_shelf(sample_rate: f64) -> Self {
        let f0 = 1681.974450955533;
        let q = 0.7071752369554193;
        let k = (PI * f0 / sample_rate).tan();
        let vh = 10_f64.powf(4. / 20.);
        let vb = vh.powf(0.4996667741545416);
        let a0 = 1. + k / q + k * k;
        Self {
            b0: (vh + vb * k / q + k * k) / a0,
            b1: 2. * (k * k - vh) / a0,
            b2: (vh - vb * k / q + k * k) / a0,
            a1: 2. * (k * k - 1.) / a0,
            a2: (1. - k / q + k * k) / a0,
        }
    }

    fn high_pass(sample_rate: f64) -> Self {
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;
        let k = (PI * f0 / sample_rate).tan();
        let a0 = 1. + k / q + k * k;
        Self {
            b0: 1. / a0,
            b1: -2. / a0,
            b2: 1. / a0,
            a1: 2. * (k * k - 1.) / a0,
            a2: (1. - k / q + k * k) / a0,
        }
    }

    /// Transposed direct form II.
    fn run(&self, z: &mut [f64; 2], x: f64) -> f64 {
        let y = self.b0 * x + z[0];
        z[0] = self.b1 * x - self.a1 * y + z[1];
        z[1] = self.b2 * x - self.a2 * y;
        y
    }
}

struct Ring {
    values: Vec<f64>,
}

impl Ring {
    fn new(len: usize) -> Self {
        Self {
            values: vec![0.; len.max(1)],
        }
    }

    fn push(&mut self, seen: u64, value: f64) {
        let len = self.values.len() as u64;
        self.values[(seen % len) as usize] = value;
    }

    /// Mean of the `window` most recent entries, `seen` being the number of
    /// pushes so far.
    fn recent_mean(&self, seen: u64, window: usize) -> f64 {
        let len = self.values.len() as u64;
        let count = (window as u64).min(seen).min(len);
        if count == 0 {
            return 0.;
        }
        let sum: f64 = (seen - count..seen)
            .map(|i| self.values[(i % len) as usize])
            .sum();
        sum / count as f64
    }

    fn clear(&mut self) {
        self.values.fill(0.);
    }
}

pub struct LoudnessCalculator {
    params: LoudnessParameters,
    initialized: bool,
    shelf: Coefficients,
    high_pass: Coefficients,
    shelf_state: [[f64; 2]; MAX_CHANNELS as usize],
    high_pass_state: [[f64; 2]; MAX_CHANNELS as usize],
    momentary_ring: Ring,
    short_term_ring: Ring,
    seen: u64,
    integrated_sum: f64,
    momentary_loudness: f32,
    short_term_loudness: f32,
    integrated_loudness: f32,
}

impl Default for LoudnessCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl LoudnessCalculator {
    pub fn new() -> Self {
        Self {
            params: LoudnessParameters::default(),
            initialized: false,
            shelf: Coefficients::default(),
            high_pass: Coefficients::default(),
            shelf_state: Default::default(),
            high_pass_state: Default::default(),
            momentary_ring: Ring::new(1),
            short_term_ring: Ring::new(1),
            seen: 0,
            integrated_sum: 0.,
            momentary_loudness: SILENCE_LUFS,
            short_term_loudness: SILENCE_LUFS,
            integrated_loudness: SILENCE_LUFS,
        }
    }

    pub fn initialize(&mut self, params: LoudnessParameters) -> Result<()> {
        if params.channel_count == 0 || params.channel_count > MAX_CHANNELS {
            log::error!("invalid loudness channel count {}", params.channel_count);
            return Err(Error::InvalidChannelCount(params.channel_count));
        }
        if params.sample_rate == 0 || params.sample_rate > MAX_SAMPLE_RATE {
            log::error!("invalid loudness sample rate {}", params.sample_rate);
            return Err(Error::InvalidSampleRate(params.sample_rate));
        }

        let rate = params.sample_rate as f64;
        self.params = params;
        self.shelf = Coefficients::high_shelf(rate);
        self.high_pass = Coefficients::high_pass(rate);
        self.momentary_ring = Ring::new(params.sample_rate as usize);
        self.short_term_ring = Ring::new(3 * params.sample_rate as usize);
        self.initialized = true;
        self.reset();
        Ok(())
    }

    pub fn finalize(&mut self) {
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reset(&mut self) {
        self.shelf_state = Default::default();
        self.high_pass_state = Default::default();
        self.momentary_ring.clear();
        self.short_term_ring.clear();
        self.seen = 0;
        self.integrated_sum = 0.;
        self.momentary_loudness = SILENCE_LUFS;
        self.short_term_loudness = SILENCE_LUFS;
        self.integrated_loudness = SILENCE_LUFS;
    }

    /// Feeds `sample_count` interleaved frames. Does nothing before
    /// [`LoudnessCalculator::initialize`].
    pub fn analyze(&mut self, samples: &[f32], sample_count: u32) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        let channels = self.params.channel_count as usize;
        let want = sample_count as usize * channels;
        if samples.len() < want {
            log::error!(
                "loudness input too short: want {want}; got {}",
                samples.len()
            );
            return Err(Error::BufferTooShort {
                want,
                got: samples.len(),
            });
        }

        for frame in samples[..want].chunks_exact(channels) {
            let mut sum = 0.;
            for (ch, &sample) in frame.iter().enumerate() {
                let shelved = self.shelf.run(&mut self.shelf_state[ch], sample as f64);
                let weighted = self
                    .high_pass
                    .run(&mut self.high_pass_state[ch], shelved);
                if ch != LFE_CHANNEL {
                    sum += weighted * weighted;
                }
            }
            let mean_square = sum / channels as f64;
            self.momentary_ring.push(self.seen, mean_square);
            self.short_term_ring.push(self.seen, mean_square);
            self.integrated_sum += mean_square;
            self.seen += 1;
        }

        if self.seen == 0 {
            return Ok(());
        }
        let rate = self.params.sample_rate as f64;
        let momentary_window =
            (self.params.momentary_time_constant as f64 * rate).round() as usize;
        let short_term_window =
            (self.params.short_term_time_constant as f64 * rate).round() as usize;
        self.momentary_loudness =
            loudness(self.momentary_ring.recent_mean(self.seen, momentary_window));
        self.short_term_loudness =
            loudness(self.short_term_ring.recent_mean(self.seen, short_term_window));
        self.integrated_loudness = loudness(self.integrated_sum / self.seen as f64);
        Ok(())
    }

    pub fn set_momentary_time_constant(&mut self, seconds: f32) {
        if self.initialized {
            self.params.momentary_time_constant = seconds;
        }
    }

    pub fn momentary_loudness(&self) -> f32 {
        self.momentary_loudness
    }

    pub fn short_term_loudness(&self) -> f32 {
        self.short_term_loudness
    }

    pub fn integrated_loudness(&self) -> f32 {
        self.integrated_loudness
    }

    /// Loudness range is not measured.
    pub fn loudness_range(&self) -> f32 {
        0.
    }
}

/// LUFS of a K-weighted mean square.
pub fn loudness(mean_square: f64) -> f32 {
    if mean_square <= 0. {
        return SILENCE_LUFS;
    }
    (-0.691 + 10. * mean_square.log10()) as f32
}
