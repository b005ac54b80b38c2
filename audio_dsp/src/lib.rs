// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod fft;
pub mod fixed_point;
pub mod loudness;

pub use fft::Fft;
pub use fft::FftMode;
pub use loudness::LoudnessCalculator;
pub use loudness::LoudnessParameters;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("sample count must be a non-zero power of two, got {0}")]
    InvalidSampleCount(u32),

    #[error("work buffer too small: want {want} bytes; got {got}")]
    WorkBufferTooSmall { want: usize, got: usize },

    #[error("sample count mismatch: initialized with {want}; got {got}")]
    SampleCountMismatch { want: u32, got: u32 },

    #[error("buffer too short: want {want}; got {got}")]
    BufferTooShort { want: usize, got: usize },

    #[error("invalid channel count {0}")]
    InvalidChannelCount(u32),

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use crate::Error;

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::InvalidSampleCount(3).to_string(),
            "sample count must be a non-zero power of two, got 3"
        );
        assert_eq!(
            Error::WorkBufferTooSmall { want: 64, got: 8 }.to_string(),
            "work buffer too small: want 64 bytes; got 8"
        );
        assert_eq!(
            Error::SampleCountMismatch { want: 8, got: 16 }.to_string(),
            "sample count mismatch: initialized with 8; got 16"
        );
    }
}
