// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use audio_renderer::behavior::BehaviorInfo;
use audio_renderer::command::CommandEntry;
use audio_renderer::command::CommandListProcessor;
use audio_renderer::config::RendererConfig;
use audio_renderer::config::Stage;
use audio_renderer::effect::EffectContext;
use audio_renderer::effect::IdentityPoolMapper;
use audio_renderer::effect::ParameterVersion;
use audio_renderer::effect::UsageState;
use audio_renderer::snoop::AudioSnoopManager;
use audio_renderer::splitter::SplitterContext;
use clap::Args;
use zerocopy::AsBytes;

use crate::wav::read_wav;
use crate::wav::write_wav;

#[derive(Args)]
pub(crate) struct RenderCommand {
    /// Path to the JSON effect configuration
    config: PathBuf,
    /// Path to the input WAVE file
    input: PathBuf,
    /// Path to write the rendered 16-bit WAVE file
    output: PathBuf,
    /// Print DSP statistics when done
    #[arg(long)]
    stats: bool,
}

impl RenderCommand {
    pub(crate) fn run(&self) -> anyhow::Result<()> {
        let config = RendererConfig::from_path(&self.config)?;
        let (spec, input) = read_wav(&self.input)?;
        if spec.sample_rate != audio_renderer::common::TARGET_SAMPLE_RATE {
            log::warn!(
                "{} is {} Hz; effects are tuned for {} Hz",
                self.input.display(),
                spec.sample_rate,
                audio_renderer::common::TARGET_SAMPLE_RATE
            );
        }

        let snoop = AudioSnoopManager::new();
        snoop.set_dsp_statistics_enabled(self.stats);
        let mut renderer = Renderer::new(&config, input.len())
            .with_context(|| format!("config {}", self.config.display()))?;
        let output = renderer.render(&input, &snoop);
        write_wav(&self.output, spec.sample_rate, &output)?;

        log::info!(
            "rendered {} frames through {} stages",
            input.first().map_or(0, Vec::len),
            config.stages.len()
        );
        if self.stats {
            println!("{:?}", snoop.dsp_statistics());
        }
        Ok(())
    }
}

/// Runs the effect stages of a config over whole channels, one command
/// list per `sample_count` samples, then each channel's splitter
/// destination filters.
pub(crate) struct Renderer {
    behavior: BehaviorInfo,
    effects: EffectContext,
    splitter: SplitterContext,
    processor: CommandListProcessor,
    channels: usize,
    use_float_processing: bool,
}

impl Renderer {
    pub(crate) fn new(config: &RendererConfig, channels: usize) -> anyhow::Result<Self> {
        let behavior = config.behavior()?;
        let version = if behavior.is_effect_info_version2_supported() {
            ParameterVersion::Version2
        } else {
            ParameterVersion::Version1
        };
        if version == ParameterVersion::Version1
            && config
                .stages
                .iter()
                .any(|stage| matches!(stage, Stage::Compressor { .. }))
        {
            log::warn!(
                "revision {} has no compressor parameters; compressor stages pass through",
                config.revision
            );
        }

        let records = config.effect_records(channels)?;
        let blob: Vec<u8> = records.iter().flat_map(|r| r.as_bytes().to_vec()).collect();
        let mut effects = EffectContext::new(records.len(), records.len());
        effects.update(&blob, version, &IdentityPoolMapper)?;
        for (index, status) in effects.out_statuses().iter().enumerate() {
            if status.usage_state != UsageState::New as u8 {
                log::warn!("stage {index} is not in use: {}", status.usage_state);
            }
        }

        let mut splitter = SplitterContext::new();
        if !config.destination_filters.is_empty() {
            if !behavior.is_biquad_filter_float_coefficients_supported() {
                log::warn!(
                    "revision {} has no float coefficient filters; destination filters pass through",
                    config.revision
                );
            }
            splitter.initialize(&behavior, 1, channels as u32);
            if splitter.using_splitter() {
                let update = config.splitter_update(channels)?;
                let consumed = splitter.update(&update);
                anyhow::ensure!(
                    consumed == update.len(),
                    "splitter consumed {consumed} of {} bytes",
                    update.len()
                );
            }
        }

        Ok(Self {
            behavior,
            effects,
            splitter,
            processor: CommandListProcessor::new(channels, config.sample_count),
            channels,
            use_float_processing: config.use_float_processing,
        })
    }

    /// Renders `input`, one vector per channel. A trailing partial frame is
    /// zero padded and the padding dropped from the output.
    pub(crate) fn render(&mut self, input: &[Vec<i32>], snoop: &AudioSnoopManager) -> Vec<Vec<i32>> {
        let frame_len = self.processor.sample_count as usize;
        let total = input.iter().map(Vec::len).min().unwrap_or(0);
        let mut output = vec![Vec::with_capacity(total); self.channels];

        for start in (0..total).step_by(frame_len) {
            let len = frame_len.min(total - start);
            for (ch, samples) in input.iter().enumerate().take(self.channels) {
                let buffer = &mut self.processor.mix_buffers[ch];
                buffer[..len].copy_from_slice(&samples[start..start + len]);
                buffer[len..].fill(0);
            }

            let started = Instant::now();
            self.process_frame(snoop, started);

            for (ch, out) in output.iter_mut().enumerate() {
                out.extend_from_slice(&self.processor.mix_buffers[ch][..len]);
            }
        }
        output
    }

    fn process_frame(&mut self, snoop: &AudioSnoopManager, started: Instant) {
        let mut commands = Vec::new();
        for info in self.effects.infos_mut() {
            commands.extend(info.generate_commands(
                0,
                self.use_float_processing,
                &mut self.processor.states,
            ));
            info.update_for_command_generation();
        }
        let chain: Vec<usize> = self.splitter.chain(0).collect();
        for (ch, index) in chain.into_iter().enumerate() {
            if let Some(destination) = self.splitter.destination_mut(index) {
                commands.extend(
                    destination
                        .biquad_commands(&self.behavior, ch as i16, &mut self.processor.states.biquad)
                        .into_iter()
                        .map(CommandEntry::from),
                );
            }
        }

        let report = self.processor.process(&commands);
        self.effects.publish_dsp_states(&self.processor.states);
        self.effects.update_state_by_dsp_shared();
        self.splitter.update_internal_state();
        snoop.record(started.elapsed().as_nanos() as u64, 0, &report);
    }

    pub(crate) fn effects(&self) -> &EffectContext {
        &self.effects
    }
}

#[cfg(test)]
mod tests {
    use audio_renderer::effect::CompressorStatistics;
    use audio_renderer::effect::LimiterState;

    use super::*;

    fn config(stages: &str) -> RendererConfig {
        RendererConfig::from_json_str(&format!(
            r#"{{"sample_count": 64, "stages": [{stages}]}}"#
        ))
        .unwrap()
    }

    const HALVE: &str = r#"{"BiquadFilter": {"b": [8192, 0, 0], "a": [0, 0]}}"#;

    #[test]
    fn biquad_halves_every_channel() {
        let mut renderer = Renderer::new(&config(HALVE), 2).unwrap();
        let input = vec![vec![1000; 150], vec![-2000; 150]];
        let output = renderer.render(&input, &AudioSnoopManager::new());
        assert_eq!(output, vec![vec![500; 150], vec![-1000; 150]]);
    }

    #[test]
    fn stages_run_in_order() {
        let stages = format!("{HALVE}, {HALVE}");
        let mut renderer = Renderer::new(&config(&stages), 1).unwrap();
        let output = renderer.render(&[vec![4000; 64]], &AudioSnoopManager::new());
        assert_eq!(output, vec![vec![1000; 64]]);
    }

    #[test]
    fn limiter_publishes_state() {
        let stages = r#"{"Limiter": {"attack_time": 1.0, "release_time": 10.0, "threshold": -6.0, "ratio": 100.0}}"#;
        let mut renderer = Renderer::new(&config(stages), 1).unwrap();
        let output = renderer.render(&[vec![32000; 4800]], &AudioSnoopManager::new());
        let last = *output[0].last().unwrap();
        assert!(last < 32000, "{last}");

        let state: LimiterState = renderer
            .effects()
            .result_state(0)
            .unwrap()
            .view()
            .unwrap();
        assert!(state.gain_reduction < 1.);
    }

    #[test]
    fn compressor_reports_statistics() {
        let stages = r#"{"Compressor": {"threshold": -20.0, "ratio": 4.0, "attack_time": 1.0, "release_time": 50.0}}"#;
        let mut renderer = Renderer::new(&config(stages), 1).unwrap();
        let output = renderer.render(&[vec![16384; 960]], &AudioSnoopManager::new());
        assert_eq!(output[0][0], 16384);
        assert!(output[0][959] < 16000, "{}", output[0][959]);

        // Statistics are not enabled by the config.
        let stats: CompressorStatistics = renderer
            .effects()
            .result_state(0)
            .unwrap()
            .view()
            .unwrap();
        assert_eq!(stats, CompressorStatistics::initial());
    }

    #[test]
    fn snoop_sees_no_drops() {
        let snoop = AudioSnoopManager::new();
        snoop.set_dsp_statistics_enabled(true);
        let mut renderer = Renderer::new(&config(HALVE), 1).unwrap();
        renderer.render(&[vec![0; 640]], &snoop);
        assert_eq!(snoop.dsp_statistics().command_drop_count, 0);
    }

    const HALVING_FILTER: &str =
        r#""destination_filters": [{"numerator": [0.5, 0.0, 0.0], "denominator": [0.0, 0.0]}]"#;

    #[test]
    fn destination_filters_follow_stages() {
        let config = RendererConfig::from_json_str(&format!(
            r#"{{"sample_count": 64, "stages": [{HALVE}], {HALVING_FILTER}}}"#
        ))
        .unwrap();
        let mut renderer = Renderer::new(&config, 2).unwrap();
        let input = vec![vec![4000; 100], vec![-800; 100]];
        let output = renderer.render(&input, &AudioSnoopManager::new());
        assert_eq!(output, vec![vec![1000; 100], vec![-200; 100]]);
        assert_eq!(renderer.splitter.chain(0).count(), 2);
        // One state per channel filter and per biquad stage channel.
        assert_eq!(renderer.processor.states.biquad.len(), 4);
    }

    #[test]
    fn destination_filters_need_float_coefficients() {
        let config = RendererConfig::from_json_str(&format!(
            r#"{{"sample_count": 64, "revision": 14, "stages": [], {HALVING_FILTER}}}"#
        ))
        .unwrap();
        let mut renderer = Renderer::new(&config, 1).unwrap();
        let output = renderer.render(&[vec![4000; 64]], &AudioSnoopManager::new());
        assert_eq!(output, vec![vec![4000; 64]]);
        assert!(renderer.splitter.destination(0).unwrap().is_configured());
    }

    #[test]
    fn rejects_too_many_channels() {
        assert!(Renderer::new(&config(HALVE), 7).is_err());
    }

    #[test]
    fn run() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            format!(r#"{{"stages": [{HALVE}]}}"#),
        )
        .unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_wav(&input, 48000, &[vec![300; 1000]]).unwrap();

        RenderCommand {
            config: config_path,
            input,
            output: output.clone(),
            stats: false,
        }
        .run()
        .unwrap();

        let (spec, channels) = read_wav(&output).unwrap();
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(channels, vec![vec![150; 1000]]);
    }
}
