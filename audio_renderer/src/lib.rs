// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! DSP side of the audio renderer: the command list executed against the
//! mix-buffer arena every frame, the effect parameter objects feeding it and
//! the splitter graph.

pub mod behavior;
pub mod command;
pub mod common;
pub mod config;
pub mod effect;
mod mix_buffer;
pub mod snoop;
pub mod splitter;
pub mod state;

pub use mix_buffer::MixBuffer;
pub use mix_buffer::Shape;

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("effect slot {0} holds no effect")]
    InvalidEffect(usize),

    #[error("parameter blob too short: want {want} bytes; got {got}")]
    ShortParameter { want: usize, got: usize },

    #[error("unsupported revision magic {0:#010x}")]
    UnsupportedRevision(u32),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use crate::Error;

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::InvalidEffect(3).to_string(),
            "effect slot 3 holds no effect"
        );
        assert_eq!(
            Error::ShortParameter { want: 192, got: 10 }.to_string(),
            "parameter blob too short: want 192 bytes; got 10"
        );
        assert_eq!(
            Error::UnsupportedRevision(0x12345678).to_string(),
            "unsupported revision magic 0x12345678"
        );
    }
}
