// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt::Debug;
use std::ops::Index;
use std::ops::IndexMut;
use std::ops::Range;

/// Shape of a mix-buffer arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    /// Number of mix buffers.
    pub buffers: usize,
    /// Samples per mix buffer.
    pub frames: usize,
}

/// A `MixBuffer` is the arena every command of a frame reads from and writes
/// to. Buffer `i` occupies samples `[i * frames, (i + 1) * frames)` of one
/// contiguous allocation.
pub struct MixBuffer {
    shape: Shape,
    buffer: Vec<i32>,
}

impl MixBuffer {
    /// Create `shape.buffers` buffers of `shape.frames` zeroed samples.
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            buffer: vec![0; shape.buffers * shape.frames],
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Total number of samples in the arena.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.buffer
    }

    /// Sample range of buffer `index` when each buffer holds `sample_count`
    /// samples, or `None` if it does not fit in the arena.
    pub fn segment_range(&self, index: usize, sample_count: usize) -> Option<Range<usize>> {
        let start = index.checked_mul(sample_count)?;
        let end = start.checked_add(sample_count)?;
        if end > self.buffer.len() {
            return None;
        }
        Some(start..end)
    }

    pub fn fill(&mut self, value: i32) {
        self.buffer.fill(value);
    }

    pub fn to_vecs(&self) -> Vec<Vec<i32>> {
        (0..self.shape.buffers).map(|i| self[i].to_vec()).collect()
    }
}

impl Index<usize> for MixBuffer {
    type Output = [i32];

    fn index(&self, index: usize) -> &Self::Output {
        if index >= self.shape.buffers {
            panic!("index {} >= {}", index, self.shape.buffers);
        }
        let start = index * self.shape.frames;
        &self.buffer[start..start + self.shape.frames]
    }
}

impl IndexMut<usize> for MixBuffer {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        if index >= self.shape.buffers {
            panic!("index {} >= {}", index, self.shape.buffers);
        }
        let start = index * self.shape.frames;
        &mut self.buffer[start..start + self.shape.frames]
    }
}

impl From<Vec<Vec<i32>>> for MixBuffer {
    /// Take ownership from `vec` and create a `MixBuffer`.
    fn from(vec: Vec<Vec<i32>>) -> Self {
        let min_len = vec.iter().map(|b| b.len()).min().unwrap_or(0);
        let max_len = vec.iter().map(|b| b.len()).max().unwrap_or(0);
        assert_eq!(min_len, max_len);
        Self {
            shape: Shape {
                buffers: vec.len(),
                frames: min_len,
            },
            buffer: vec.into_iter().flatten().collect(),
        }
    }
}

impl Debug for MixBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MixBuffer {{ <{} buffers of {} samples> }}",
            self.shape.buffers, self.shape.frames
        )
    }
}
