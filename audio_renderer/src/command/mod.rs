// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The per-frame command list and the commands it runs against the
//! mix-buffer arena.

mod biquad_filter;
mod compressor;
mod limiter;

pub use biquad_filter::*;
pub use compressor::*;
pub use limiter::*;

use std::ops::Range;

use crate::common::MAX_CHANNELS;
use crate::common::TARGET_SAMPLE_RATE;
use crate::state::DspStates;
use crate::MixBuffer;
use crate::Shape;

/// A command of the DSP command list.
pub trait Command {
    /// Appends a human readable description of the command to `string`.
    fn dump(&self, processor: &CommandListProcessor, string: &mut String);

    /// Returns false if the command cannot run against `processor`.
    /// A command failing verification is skipped for the frame.
    fn verify(&self, processor: &CommandListProcessor) -> bool;

    fn process(&self, processor: &mut CommandListProcessor);
}

#[derive(Debug)]
pub enum CommandEntry {
    BiquadFilter(BiquadFilterCommand),
    Limiter(LimiterCommand),
    Compressor(CompressorCommand),
}

impl CommandEntry {
    fn as_command(&self) -> &dyn Command {
        match self {
            CommandEntry::BiquadFilter(c) => c,
            CommandEntry::Limiter(c) => c,
            CommandEntry::Compressor(c) => c,
        }
    }
}

impl Command for CommandEntry {
    fn dump(&self, processor: &CommandListProcessor, string: &mut String) {
        self.as_command().dump(processor, string)
    }

    fn verify(&self, processor: &CommandListProcessor) -> bool {
        self.as_command().verify(processor)
    }

    fn process(&self, processor: &mut CommandListProcessor) {
        self.as_command().process(processor)
    }
}

impl From<BiquadFilterCommand> for CommandEntry {
    fn from(c: BiquadFilterCommand) -> Self {
        CommandEntry::BiquadFilter(c)
    }
}

impl From<LimiterCommand> for CommandEntry {
    fn from(c: LimiterCommand) -> Self {
        CommandEntry::Limiter(c)
    }
}

impl From<CompressorCommand> for CommandEntry {
    fn from(c: CompressorCommand) -> Self {
        CommandEntry::Compressor(c)
    }
}

/// Outcome of one pass over a command list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub processed: u32,
    pub skipped: u32,
}

/// Executes command lists. Owns the mix-buffer arena and the DSP state
/// tables the commands refer to.
pub struct CommandListProcessor {
    pub mix_buffers: MixBuffer,
    pub sample_count: u32,
    pub target_sample_rate: u32,
    pub states: DspStates,
}

impl CommandListProcessor {
    pub fn new(buffer_count: usize, sample_count: u32) -> Self {
        Self {
            mix_buffers: MixBuffer::new(Shape {
                buffers: buffer_count,
                frames: sample_count as usize,
            }),
            sample_count,
            target_sample_rate: TARGET_SAMPLE_RATE,
            states: DspStates::default(),
        }
    }

    /// Runs `commands` in order. Later commands observe the writes of
    /// earlier ones.
    pub fn process(&mut self, commands: &[CommandEntry]) -> ProcessReport {
        let mut report = ProcessReport::default();
        for (index, command) in commands.iter().enumerate() {
            if log::log_enabled!(log::Level::Debug) {
                let mut dump = String::new();
                command.dump(self, &mut dump);
                log::debug!("command {index}: {dump}");
            }
            if !command.verify(self) {
                log::error!("command {index} failed verification, skipping");
                report.skipped += 1;
                continue;
            }
            command.process(self);
            report.processed += 1;
        }
        report
    }

    /// Sample range of mix buffer `index`, `None` for negative indices or
    /// ranges outside the arena.
    pub fn segment(&self, index: i16) -> Option<Range<usize>> {
        let index = usize::try_from(index).ok()?;
        self.mix_buffers
            .segment_range(index, self.sample_count as usize)
    }

    /// Ranges of the active channels of a multi-channel effect command.
    pub(crate) fn channel_segments(
        &self,
        channel_count: usize,
        inputs: &[i16; MAX_CHANNELS],
        outputs: &[i16; MAX_CHANNELS],
    ) -> Option<Vec<(Range<usize>, Range<usize>)>> {
        (0..channel_count.min(MAX_CHANNELS))
            .map(|ch| Some((self.segment(inputs[ch])?, self.segment(outputs[ch])?)))
            .collect()
    }
}

/// Pass-through used by disabled effects.
pub(crate) fn copy_segments(arena: &mut [i32], segments: &[(Range<usize>, Range<usize>)]) {
    for (input, output) in segments {
        if input != output {
            arena.copy_within(input.clone(), output.start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::LimiterParameter;
    use crate::effect::LimiterState;

    fn biquad(processor: &mut CommandListProcessor, input: i16, output: i16) -> CommandEntry {
        let state = processor.states.biquad.insert(BiquadFilterState::default());
        BiquadFilterCommand {
            input,
            output,
            biquad: BiquadFilterParameter {
                b: [16384 / 2, 0, 0],
                a: [0, 0],
            },
            state: Some(state),
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn runs_in_order() {
        let mut processor = CommandListProcessor::new(2, 4);
        processor.mix_buffers[0].copy_from_slice(&[400, 800, -400, 0]);
        let commands = vec![biquad(&mut processor, 0, 1), biquad(&mut processor, 1, -1)];
        let report = processor.process(&commands);
        assert_eq!(
            report,
            ProcessReport {
                processed: 2,
                skipped: 0
            }
        );
        assert_eq!(processor.mix_buffers[0], [400, 800, -400, 0]);
        // Halved twice: the second command sees the first one's output.
        assert_eq!(processor.mix_buffers[1], [100, 200, -100, 0]);
    }

    #[test]
    fn skips_failed_verification() {
        let mut processor = CommandListProcessor::new(2, 4);
        processor.mix_buffers[0].copy_from_slice(&[400, 800, -400, 0]);
        let commands = vec![
            biquad(&mut processor, -1, 1),
            biquad(&mut processor, 7, 1),
            LimiterCommand {
                parameter: LimiterParameter::default(),
                inputs: [0; MAX_CHANNELS],
                outputs: [1; MAX_CHANNELS],
                state: Some(processor.states.limiter.insert(LimiterState::initial())),
                effect_enabled: false,
            }
            .into(),
        ];
        let report = processor.process(&commands);
        assert_eq!(
            report,
            ProcessReport {
                processed: 1,
                skipped: 2
            }
        );
    }

    #[test]
    fn segments() {
        let processor = CommandListProcessor::new(3, 8);
        assert_eq!(processor.segment(-1), None);
        assert_eq!(processor.segment(2), Some(16..24));
        assert_eq!(processor.segment(3), None);
        assert_eq!(
            processor.channel_segments(2, &[0, 1, 9, 9, 9, 9], &[2, 2, 9, 9, 9, 9]),
            Some(vec![(0..8, 16..24), (8..16, 16..24)])
        );
        assert_eq!(
            processor.channel_segments(3, &[0, 1, 9, 9, 9, 9], &[2, 2, 9, 9, 9, 9]),
            None
        );
    }
}
