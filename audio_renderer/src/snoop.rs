// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! DSP load statistics gathered while command lists run.

use std::sync::Mutex;
use std::sync::MutexGuard;

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::command::ProcessReport;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, FromZeroes, FromBytes, AsBytes)]
pub struct DspStatistics {
    pub total_cycles: u64,
    pub active_cycles: u64,
    pub voice_drop_count: u32,
    pub command_drop_count: u32,
    pub buffer_underrun_count: u32,
    pub buffer_overrun_count: u32,
    pub cpu_usage_percent: f32,
    pub dsp_usage_percent: f32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DspStatistics>(), 0x28);

#[derive(Debug, Default)]
struct Snoop {
    enabled: bool,
    statistics: DspStatistics,
}

/// Shared between the renderer thread and readers of the statistics.
#[derive(Debug, Default)]
pub struct AudioSnoopManager {
    state: Mutex<Snoop>,
}

impl AudioSnoopManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Snoop> {
        // The statistics stay usable after a panic elsewhere.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A snapshot of the statistics, zeroed while collection is disabled.
    pub fn dsp_statistics(&self) -> DspStatistics {
        let state = self.lock();
        if state.enabled {
            state.statistics
        } else {
            DspStatistics::default()
        }
    }

    pub fn set_dsp_statistics_enabled(&self, enabled: bool) {
        let mut state = self.lock();
        state.enabled = enabled;
        if !enabled {
            state.statistics = DspStatistics::default();
        }
    }

    pub fn dsp_statistics_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Accounts one frame that took `cycles` with `active_voices` voices and
    /// dropped `dropped_commands` commands.
    pub fn update_statistics(&self, cycles: u64, active_voices: u32, dropped_commands: u32) {
        let mut state = self.lock();
        if !state.enabled {
            return;
        }
        let stats = &mut state.statistics;
        stats.total_cycles = stats.total_cycles.saturating_add(cycles);
        stats.active_cycles = stats.active_cycles.saturating_add(cycles);
        stats.command_drop_count = stats.command_drop_count.saturating_add(dropped_commands);
        if stats.total_cycles > 0 {
            stats.cpu_usage_percent =
                (stats.active_cycles as f64 / stats.total_cycles as f64 * 100.) as f32;
            stats.dsp_usage_percent = stats.cpu_usage_percent * 0.5;
        }
        log::trace!(
            "snoop: {cycles} cycles, {active_voices} voices, {dropped_commands} dropped"
        );
    }

    /// Records the skipped commands of a command list pass.
    pub fn record(&self, cycles: u64, active_voices: u32, report: &ProcessReport) {
        self.update_statistics(cycles, active_voices, report.skipped);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn disabled_reports_zero() {
        let snoop = AudioSnoopManager::new();
        assert!(!snoop.dsp_statistics_enabled());
        snoop.update_statistics(100, 1, 2);
        assert_eq!(snoop.dsp_statistics(), DspStatistics::default());
    }

    #[test]
    fn accumulates() {
        let snoop = AudioSnoopManager::new();
        snoop.set_dsp_statistics_enabled(true);
        snoop.update_statistics(100, 4, 1);
        snoop.record(
            50,
            4,
            &ProcessReport {
                processed: 3,
                skipped: 2,
            },
        );
        let stats = snoop.dsp_statistics();
        assert_eq!(stats.total_cycles, 150);
        assert_eq!(stats.active_cycles, 150);
        assert_eq!(stats.command_drop_count, 3);
        assert_eq!(stats.cpu_usage_percent, 100.);
        assert_eq!(stats.dsp_usage_percent, 50.);

        snoop.set_dsp_statistics_enabled(false);
        snoop.set_dsp_statistics_enabled(true);
        assert_eq!(snoop.dsp_statistics(), DspStatistics::default());
    }

    #[test]
    fn shared_between_threads() {
        let snoop = Arc::new(AudioSnoopManager::new());
        snoop.set_dsp_statistics_enabled(true);
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let snoop = snoop.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        snoop.update_statistics(1, 0, 0);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(snoop.dsp_statistics().total_cycles, 400);
    }
}
