// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod loudness;
mod render;
mod spectrum;
mod wav;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a WAVE file through the effect stages of a JSON config
    Render(render::RenderCommand),
    /// Measure the loudness of a WAVE file in LUFS
    Loudness(loudness::LoudnessCommand),
    /// Print the strongest frequencies of a WAVE file
    Spectrum(spectrum::SpectrumCommand),
}

impl Cli {
    fn run(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Render(c) => c.run(),
            Commands::Loudness(c) => c.run(),
            Commands::Spectrum(c) => c.run(),
        }
    }
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = Cli::parse().run() {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
