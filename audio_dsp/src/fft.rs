// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Radix-2 FFT operating entirely inside a caller supplied work buffer.

use std::f64::consts::PI;
use std::mem::size_of;

use rustfft::num_complex::Complex32;

use crate::Error;
use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FftMode {
    RealToComplex,
    ComplexToReal,
    ComplexToComplex,
}

#[derive(Debug)]
pub struct Fft<'a> {
    sample_count: u32,
    mode: FftMode,
    // First half holds the transform data, second half the bit-reversal copy.
    work: &'a mut [Complex32],
}

impl<'a> Fft<'a> {
    /// Bytes of work buffer needed for a transform of `sample_count` points.
    pub fn work_buffer_size(sample_count: u32, _mode: FftMode) -> usize {
        2 * sample_count as usize * size_of::<Complex32>()
    }

    pub fn work_buffer_alignment() -> usize {
        64
    }

    pub fn new(sample_count: u32, mode: FftMode, work: &'a mut [Complex32]) -> Result<Self> {
        if !sample_count.is_power_of_two() {
            log::error!("fft sample count must be a power of two, got {sample_count}");
            return Err(Error::InvalidSampleCount(sample_count));
        }
        let want = Self::work_buffer_size(sample_count, mode);
        let got = work.len() * size_of::<Complex32>();
        if got < want {
            log::error!("fft work buffer too small: want {want}; got {got}");
            return Err(Error::WorkBufferTooSmall { want, got });
        }
        Ok(Self {
            sample_count,
            mode,
            work,
        })
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn mode(&self) -> FftMode {
        self.mode
    }

    /// Transforms `sample_count` real samples into `sample_count / 2 + 1` bins.
    pub fn process_real_to_complex(
        &mut self,
        output: &mut [Complex32],
        input: &[f32],
        sample_count: u32,
    ) -> Result<()> {
        let n = self.check(sample_count)?;
        let bins = n / 2 + 1;
        check_len(input.len(), n)?;
        check_len(output.len(), bins)?;

        for (slot, &x) in self.work[..n].iter_mut().zip(input) {
            *slot = Complex32::new(x, 0.);
        }
        self.transform(false);
        output[..bins].copy_from_slice(&self.work[..bins]);
        Ok(())
    }

    /// Inverse of [`Fft::process_real_to_complex`]: rebuilds the upper half of the
    /// spectrum from conjugate symmetry and writes the real parts.
    pub fn process_complex_to_real(
        &mut self,
        output: &mut [f32],
        input: &[Complex32],
        sample_count: u32,
    ) -> Result<()> {
        let n = self.check(sample_count)?;
        let half = n / 2;
        check_len(input.len(), half + 1)?;
        check_len(output.len(), n)?;

        self.work[..=half].copy_from_slice(&input[..=half]);
        for i in 1..half {
            self.work[n - i] = self.work[i].conj();
        }
        self.transform(true);
        for (out, c) in output.iter_mut().zip(&self.work[..n]) {
            *out = c.re;
        }
        Ok(())
    }

    pub fn process_complex_to_complex(
        &mut self,
        output: &mut [Complex32],
        input: &[Complex32],
        sample_count: u32,
        inverse: bool,
    ) -> Result<()> {
        let n = self.check(sample_count)?;
        check_len(input.len(), n)?;
        check_len(output.len(), n)?;

        self.work[..n].copy_from_slice(&input[..n]);
        self.transform(inverse);
        output[..n].copy_from_slice(&self.work[..n]);
        Ok(())
    }

    fn check(&self, sample_count: u32) -> Result<usize> {
        if sample_count != self.sample_count {
            log::error!(
                "fft initialized with {} samples; got {sample_count}",
                self.sample_count
            );
            return Err(Error::SampleCountMismatch {
                want: self.sample_count,
                got: sample_count,
            });
        }
        Ok(sample_count as usize)
    }

    fn transform(&mut self, inverse: bool) {
        let n = self.sample_count as usize;
        let (data, scratch) = self.work.split_at_mut(n);
        let scratch = &mut scratch[..n];

        let bits = n.trailing_zeros();
        for (i, value) in data.iter().enumerate() {
            scratch[reverse_bits(i, bits)] = *value;
        }
        data.copy_from_slice(scratch);

        let direction = if inverse { 1. } else { -1. };
        let mut m = 2;
        while m <= n {
            let m2 = m / 2;
            for k in (0..n).step_by(m) {
                for j in 0..m2 {
                    let angle = direction * 2. * PI * j as f64 / m as f64;
                    let w = Complex32::new(angle.cos() as f32, angle.sin() as f32);
                    let t = w * data[k + j + m2];
                    let u = data[k + j];
                    data[k + j] = u + t;
                    data[k + j + m2] = u - t;
                }
            }
            m *= 2;
        }

        if inverse {
            let scale = 1. / n as f32;
            for value in data.iter_mut() {
                *value *= scale;
            }
        }
    }
}

fn reverse_bits(index: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    index.reverse_bits() >> (usize::BITS - bits)
}

fn check_len(got: usize, want: usize) -> Result<()> {
    if got < want {
        log::error!("fft buffer too short: want {want}; got {got}");
        return Err(Error::BufferTooShort { want, got });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use float_cmp::assert_approx_eq;
    use rustfft::FftPlanner;

    use super::*;

    fn work_for(n: u32) -> Vec<Complex32> {
        vec![Complex32::default(); 2 * n as usize]
    }

    #[test]
    fn sizes() {
        assert_eq!(Fft::work_buffer_size(256, FftMode::RealToComplex), 4096);
        assert_eq!(Fft::work_buffer_alignment(), 64);
    }

    #[test]
    fn rejects_bad_sample_count() {
        let mut work = work_for(16);
        assert_matches!(
            Fft::new(12, FftMode::ComplexToComplex, &mut work),
            Err(Error::InvalidSampleCount(12))
        );
        assert_matches!(
            Fft::new(0, FftMode::ComplexToComplex, &mut work),
            Err(Error::InvalidSampleCount(0))
        );
    }

    #[test]
    fn rejects_small_work_buffer() {
        let mut work = vec![Complex32::default(); 15];
        assert_matches!(
            Fft::new(8, FftMode::RealToComplex, &mut work),
            Err(Error::WorkBufferTooSmall { want: 128, got: 120 })
        );
    }

    #[test]
    fn mismatched_sample_count_leaves_output() {
        let mut work = work_for(8);
        let mut fft = Fft::new(8, FftMode::RealToComplex, &mut work).unwrap();
        let mut output = vec![Complex32::new(7., 7.); 9];
        assert_matches!(
            fft.process_real_to_complex(&mut output, &[1.; 16], 16),
            Err(Error::SampleCountMismatch { want: 8, got: 16 })
        );
        assert!(output.iter().all(|c| *c == Complex32::new(7., 7.)));
        assert_matches!(
            fft.process_real_to_complex(&mut output[..2], &[1.; 8], 8),
            Err(Error::BufferTooShort { want: 5, got: 2 })
        );
    }

    #[test]
    fn impulse_is_flat() {
        let mut work = work_for(8);
        let mut fft = Fft::new(8, FftMode::RealToComplex, &mut work).unwrap();
        let mut input = [0.; 8];
        input[0] = 1.;
        let mut output = [Complex32::default(); 5];
        fft.process_real_to_complex(&mut output, &input, 8).unwrap();
        for bin in output {
            assert_approx_eq!(f32, bin.re, 1., epsilon = 1e-6);
            assert_approx_eq!(f32, bin.im, 0., epsilon = 1e-6);
        }
    }

    #[test]
    fn matches_rustfft() {
        const N: usize = 64;
        let input: Vec<Complex32> = (0..N)
            .map(|i| Complex32::new((i as f32 * 0.3).sin(), (i as f32 * 0.7).cos() * 0.5))
            .collect();

        let mut expected = input.clone();
        FftPlanner::<f32>::new()
            .plan_fft_forward(N)
            .process(&mut expected);

        let mut work = work_for(N as u32);
        let mut fft = Fft::new(N as u32, FftMode::ComplexToComplex, &mut work).unwrap();
        let mut output = vec![Complex32::default(); N];
        fft.process_complex_to_complex(&mut output, &input, N as u32, false)
            .unwrap();

        for (got, want) in output.iter().zip(&expected) {
            assert_approx_eq!(f32, got.re, want.re, epsilon = 1e-4);
            assert_approx_eq!(f32, got.im, want.im, epsilon = 1e-4);
        }
    }

    #[test]
    fn complex_round_trip() {
        const N: u32 = 32;
        let input: Vec<Complex32> = (0..N)
            .map(|i| Complex32::new(i as f32, -(i as f32) * 0.5))
            .collect();
        let mut work = work_for(N);
        let mut fft = Fft::new(N, FftMode::ComplexToComplex, &mut work).unwrap();
        let mut spectrum = vec![Complex32::default(); N as usize];
        fft.process_complex_to_complex(&mut spectrum, &input, N, false)
            .unwrap();
        let mut restored = vec![Complex32::default(); N as usize];
        fft.process_complex_to_complex(&mut restored, &spectrum, N, true)
            .unwrap();
        for (got, want) in restored.iter().zip(&input) {
            assert_approx_eq!(f32, got.re, want.re, epsilon = 1e-3);
            assert_approx_eq!(f32, got.im, want.im, epsilon = 1e-3);
        }
    }

    #[test]
    fn real_round_trip() {
        const N: u32 = 128;
        let input: Vec<f32> = (0..N)
            .map(|i| (2. * std::f32::consts::PI * 5. * i as f32 / N as f32).sin())
            .collect();
        let mut work = work_for(N);
        let mut fft = Fft::new(N, FftMode::RealToComplex, &mut work).unwrap();
        let mut spectrum = vec![Complex32::default(); N as usize / 2 + 1];
        fft.process_real_to_complex(&mut spectrum, &input, N).unwrap();

        // All energy of a bin-aligned sine lands in bin 5.
        assert_approx_eq!(f32, spectrum[5].norm(), N as f32 / 2., epsilon = 1e-2);
        assert!(spectrum[4].norm() < 1e-2);

        let mut restored = vec![0.; N as usize];
        fft.process_complex_to_real(&mut restored, &spectrum, N)
            .unwrap();
        for (got, want) in restored.iter().zip(&input) {
            assert_approx_eq!(f32, *got, *want, epsilon = 1e-4);
        }
    }

    #[test]
    fn bit_reversal() {
        assert_eq!(reverse_bits(1, 3), 4);
        assert_eq!(reverse_bits(6, 3), 3);
        assert_eq!(reverse_bits(0, 0), 0);
    }
}
