// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt::Write;
use std::ops::Range;

use audio_dsp::fixed_point::clamp_f64_to_i32;
use audio_dsp::fixed_point::clamp_to_i32;
use audio_dsp::fixed_point::f64_to_bits_i64;
use audio_dsp::fixed_point::i64_bits_to_f64;
use audio_dsp::fixed_point::round_shift_right;
use audio_dsp::fixed_point::Q14;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::command::Command;
use crate::command::CommandListProcessor;
use crate::state::StateHandle;

/* Biquad coefficients in Q14. The transfer function H(z) is
 * (b0 + b1 z^-1 + b2 z^-2) / (1 - a0 z^-1 - a1 z^-2): the feedback
 * coefficients are stored negated.
 */
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct BiquadFilterParameter {
    pub b: [i16; 3],
    pub a: [i16; 2],
}

/// Float coefficient variant carried by splitter destinations. Same sign
/// convention as [`BiquadFilterParameter`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct BiquadFilterParameter2 {
    pub enabled: u8,
    pub reserved: [u8; 3],
    pub numerator: [f32; 3],
    pub denominator: [f32; 2],
}

static_assertions::const_assert_eq!(std::mem::size_of::<BiquadFilterParameter>(), 0xA);
static_assertions::const_assert_eq!(std::mem::size_of::<BiquadFilterParameter2>(), 0x18);

impl BiquadFilterParameter2 {
    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }
}

/// Filter memory persisted across frames. The float kernels store doubles
/// bit-for-bit in `s0` and `s1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BiquadFilterState {
    pub s0: i64,
    pub s1: i64,
    pub s2: i64,
    pub s3: i64,
}

/// Integer direct form 1 with Q14 rounding.
pub fn apply_biquad_filter_int(
    samples: &mut [i32],
    b: &[i16; 3],
    a: &[i16; 2],
    state: &mut BiquadFilterState,
) {
    let [b0, b1, b2] = b.map(i64::from);
    let [a0, a1] = a.map(i64::from);
    for sample in samples.iter_mut() {
        let input = *sample as i64;
        let acc = input * b0 + state.s0;
        let out = clamp_to_i32(round_shift_right(acc, 14)) as i64;
        *sample = out as i32;

        state.s0 = state.s1 + b1 * input + a0 * out;
        state.s1 = b2 * input + a1 * out;
    }
}

/// Double precision direct form 2 with Q14 coefficients.
pub fn apply_biquad_filter_float(
    samples: &mut [i32],
    b: &[i16; 3],
    a: &[i16; 2],
    state: &mut BiquadFilterState,
) {
    let q14 = |x: i16| Q14::from_base(x as i64).to_f64();
    apply_direct_form_2(samples, b.map(q14), a.map(q14), state);
}

/// Double precision direct form 2 with float coefficients.
pub fn apply_biquad_filter_float_coeff(
    samples: &mut [i32],
    numerator: &[f32; 3],
    denominator: &[f32; 2],
    state: &mut BiquadFilterState,
) {
    apply_direct_form_2(
        samples,
        numerator.map(f64::from),
        denominator.map(f64::from),
        state,
    );
}

fn apply_direct_form_2(
    samples: &mut [i32],
    b: [f64; 3],
    a: [f64; 2],
    state: &mut BiquadFilterState,
) {
    let mut s0 = i64_bits_to_f64(state.s0);
    let mut s1 = i64_bits_to_f64(state.s1);

    for sample in samples.iter_mut() {
        let input = *sample as f64;
        let acc = input * b[0] + s0;
        *sample = clamp_f64_to_i32(acc);

        s0 = input * b[1] + acc * a[0] + s1;
        s1 = input * b[2] + acc * a[1];
    }

    state.s0 = f64_to_bits_i64(s0);
    state.s1 = f64_to_bits_i64(s1);
    state.s2 = 0;
    state.s3 = 0;
}

#[derive(Clone, Debug, Default)]
pub struct BiquadFilterCommand {
    /// Mix buffer read from.
    pub input: i16,
    /// Mix buffer written to; negative filters `input` in place.
    pub output: i16,
    pub biquad: BiquadFilterParameter,
    pub biquad_float: BiquadFilterParameter2,
    pub state: Option<StateHandle>,
    /// Clears `state` before filtering.
    pub needs_init: bool,
    pub use_float_processing: bool,
    pub use_float_coefficients: bool,
}

impl BiquadFilterCommand {
    fn segments(&self, processor: &CommandListProcessor) -> Option<(Range<usize>, Range<usize>)> {
        if self.input < 0 || processor.sample_count == 0 {
            log::error!(
                "biquad filter: invalid input {} or sample count {}",
                self.input,
                processor.sample_count
            );
            return None;
        }
        let output = if self.output < 0 {
            self.input
        } else {
            self.output
        };
        match (processor.segment(self.input), processor.segment(output)) {
            (Some(input), Some(output)) => Some((input, output)),
            _ => {
                log::error!(
                    "biquad filter: buffers {} -> {} out of bounds, sample count {}, arena {}",
                    self.input,
                    output,
                    processor.sample_count,
                    processor.mix_buffers.len()
                );
                None
            }
        }
    }
}

impl Command for BiquadFilterCommand {
    fn dump(&self, _processor: &CommandListProcessor, string: &mut String) {
        let _ = writeln!(
            string,
            "BiquadFilterCommand\n\tinput {:02X} output {:02X} needs_init {} use_float_processing {}",
            self.input, self.output, self.needs_init, self.use_float_processing
        );
    }

    fn verify(&self, processor: &CommandListProcessor) -> bool {
        let has_state = self
            .state
            .is_some_and(|handle| processor.states.biquad.get(handle).is_some());
        if !has_state {
            log::error!("biquad filter: no filter state");
            return false;
        }
        self.segments(processor).is_some()
    }

    fn process(&self, processor: &mut CommandListProcessor) {
        let Some(handle) = self.state else {
            log::error!("biquad filter: no filter state");
            return;
        };
        let segments = self.segments(processor);
        let CommandListProcessor {
            mix_buffers,
            states,
            ..
        } = processor;
        let Some(state) = states.biquad.get_mut(handle) else {
            log::error!("biquad filter: stale state handle {}", handle.index());
            return;
        };
        if self.needs_init {
            *state = BiquadFilterState::default();
        }
        let Some((input, output)) = segments else {
            return;
        };

        let arena = mix_buffers.as_mut_slice();
        if input != output {
            arena.copy_within(input, output.start);
        }
        let samples = &mut arena[output];
        match (self.use_float_processing, self.use_float_coefficients) {
            (false, _) => apply_biquad_filter_int(samples, &self.biquad.b, &self.biquad.a, state),
            (true, false) => {
                apply_biquad_filter_float(samples, &self.biquad.b, &self.biquad.a, state)
            }
            (true, true) => apply_biquad_filter_float_coeff(
                samples,
                &self.biquad_float.numerator,
                &self.biquad_float.denominator,
                state,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;
    use crate::state::StateTable;

    // Poles at radius 0.5, unity numerator sum.
    const B: [i16; 3] = [4096, 8192, 4096];
    const A: [i16; 2] = [8192, -4096];

    fn processor_with(samples: &[i32]) -> CommandListProcessor {
        let mut processor = CommandListProcessor::new(2, samples.len() as u32);
        processor.mix_buffers[0].copy_from_slice(samples);
        processor
    }

    fn command(processor: &mut CommandListProcessor) -> BiquadFilterCommand {
        BiquadFilterCommand {
            input: 0,
            output: 1,
            biquad: BiquadFilterParameter { b: B, a: A },
            state: Some(processor.states.biquad.insert(BiquadFilterState::default())),
            ..Default::default()
        }
    }

    fn test_signal(len: usize) -> Vec<i32> {
        (0..len)
            .map(|i| ((i as f64 * 0.05).sin() * 1_000_000. + (i as f64 * 0.9).cos() * 30_000.) as i32)
            .collect()
    }

    #[test]
    fn layout() {
        assert_eq!(offset_of!(BiquadFilterParameter, a), 6);
        assert_eq!(offset_of!(BiquadFilterParameter2, numerator), 4);
        assert_eq!(offset_of!(BiquadFilterParameter2, denominator), 0x10);
    }

    #[test]
    fn verify_requires_input() {
        let mut processor = processor_with(&[0; 8]);
        let mut cmd = command(&mut processor);
        assert!(cmd.verify(&processor));
        cmd.input = -1;
        assert!(!cmd.verify(&processor));
        cmd.output = -1;
        assert!(!cmd.verify(&processor));
    }

    #[test]
    fn verify_rejects() {
        let mut processor = processor_with(&[0; 8]);
        let mut cmd = command(&mut processor);

        cmd.output = 2;
        assert!(!cmd.verify(&processor));

        cmd.output = -1;
        assert!(cmd.verify(&processor));

        cmd.state = None;
        assert!(!cmd.verify(&processor));

        let mut cmd = command(&mut processor);
        processor.sample_count = 0;
        assert!(!cmd.verify(&processor));

        processor.sample_count = 8;
        cmd.state = Some(foreign_handle());
        assert!(!cmd.verify(&processor));
    }

    #[test]
    fn needs_init_resets_state() {
        let mut processor = processor_with(&[0; 8]);
        let mut cmd = command(&mut processor);
        let handle = cmd.state.unwrap();
        *processor.states.biquad.get_mut(handle).unwrap() = BiquadFilterState {
            s0: 123,
            s1: -456,
            s2: 789,
            s3: -1,
        };
        cmd.needs_init = true;
        // A zero input keeps a cleared state cleared.
        cmd.process(&mut processor);
        assert_eq!(
            *processor.states.biquad.get(handle).unwrap(),
            BiquadFilterState::default()
        );

        // The reset happens even if the buffers are unusable.
        *processor.states.biquad.get_mut(handle).unwrap() = BiquadFilterState {
            s0: 1,
            s1: 2,
            s2: 3,
            s3: 4,
        };
        cmd.input = -1;
        cmd.process(&mut processor);
        assert_eq!(
            *processor.states.biquad.get(handle).unwrap(),
            BiquadFilterState::default()
        );
    }

    #[test]
    fn copies_then_filters() {
        let mut processor = processor_with(&[16384, 0, 0, 0]);
        let mut cmd = command(&mut processor);
        cmd.process(&mut processor);
        // Input untouched, output holds the impulse response.
        assert_eq!(processor.mix_buffers[0], [16384, 0, 0, 0]);
        // h = [0.25, 0.625, 0.5, 0.09375]
        assert_eq!(processor.mix_buffers[1], [4096, 10240, 8192, 1536]);

        cmd.output = -1;
        cmd.needs_init = true;
        cmd.process(&mut processor);
        assert_eq!(processor.mix_buffers[0], [4096, 10240, 8192, 1536]);
    }

    #[test]
    fn int_clamps() {
        let mut samples = [i32::MAX, i32::MIN];
        let mut state = BiquadFilterState::default();
        apply_biquad_filter_int(&mut samples, &[i16::MAX, 0, 0], &[0, 0], &mut state);
        assert_eq!(samples, [i32::MAX, i32::MIN]);

        let mut samples = [i32::MAX, i32::MIN];
        let mut state = BiquadFilterState::default();
        apply_biquad_filter_float(&mut samples, &[i16::MAX, 0, 0], &[0, 0], &mut state);
        assert_eq!(samples, [i32::MAX, i32::MIN]);

        let mut samples = [i32::MAX, i32::MIN];
        let mut state = BiquadFilterState::default();
        apply_biquad_filter_float_coeff(&mut samples, &[4., 0., 0.], &[0., 0.], &mut state);
        assert_eq!(samples, [i32::MAX, i32::MIN]);
    }

    #[test]
    fn kernels_agree() {
        let input = test_signal(2000);
        let numerator = B.map(|x| x as f32 / 16384.);
        let denominator = A.map(|x| x as f32 / 16384.);

        let mut int = input.clone();
        let mut float = input.clone();
        let mut float_coeff = input.clone();
        let mut states = [BiquadFilterState::default(); 3];
        // Several calls so that state carries across frames.
        for chunk in 0..4 {
            let range = chunk * 500..(chunk + 1) * 500;
            apply_biquad_filter_int(&mut int[range.clone()], &B, &A, &mut states[0]);
            apply_biquad_filter_float(&mut float[range.clone()], &B, &A, &mut states[1]);
            apply_biquad_filter_float_coeff(
                &mut float_coeff[range],
                &numerator,
                &denominator,
                &mut states[2],
            );
        }
        for i in 0..input.len() {
            assert!((int[i] - float[i]).abs() <= 4, "{i}: {} vs {}", int[i], float[i]);
            assert_eq!(float[i], float_coeff[i]);
        }
        assert_eq!(states[1], states[2]);
        assert_eq!(states[1].s2, 0);
        assert_eq!(states[1].s3, 0);
    }

    #[test]
    fn float_state_is_bit_cast() {
        let mut samples = [1000, 0];
        let mut state = BiquadFilterState::default();
        apply_biquad_filter_float(&mut samples, &B, &A, &mut state);
        // Recurrence evaluated by hand.
        let y0 = 1000. * 0.25;
        let s0 = 1000. * 0.5 + y0 * 0.5;
        let s1 = 1000. * 0.25 + y0 * -0.25;
        let y1 = s0;
        let next_s0 = y1 * 0.5 + s1;
        let next_s1 = y1 * -0.25;
        assert_eq!(samples, [y0 as i32, y1 as i32]);
        assert_eq!(i64_bits_to_f64(state.s0), next_s0);
        assert_eq!(i64_bits_to_f64(state.s1), next_s1);
    }

    #[test]
    fn dump() {
        let mut processor = processor_with(&[0; 4]);
        let cmd = command(&mut processor);
        let mut s = String::new();
        cmd.dump(&processor, &mut s);
        assert_eq!(
            s,
            "BiquadFilterCommand\n\tinput 00 output 01 needs_init false use_float_processing false\n"
        );
    }

    fn foreign_handle() -> StateHandle {
        let mut table = StateTable::new();
        for _ in 0..100 {
            table.insert(());
        }
        table.insert(())
    }
}
