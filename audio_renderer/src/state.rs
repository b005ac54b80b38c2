// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Persistent DSP state referenced by commands across frames.

use crate::command::BiquadFilterState;
use crate::command::CompressorState;
use crate::effect::LimiterState;

/// Opaque reference to a slot of a [`StateTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateHandle(usize);

impl StateHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Slots are never removed, so a handle stays valid for the table's lifetime.
#[derive(Debug)]
pub struct StateTable<T> {
    slots: Vec<T>,
}

impl<T> Default for StateTable<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> StateTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> StateHandle {
        self.slots.push(value);
        StateHandle(self.slots.len() - 1)
    }

    pub fn get(&self, handle: StateHandle) -> Option<&T> {
        self.slots.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: StateHandle) -> Option<&mut T> {
        self.slots.get_mut(handle.0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// State tables owned by the command-list processor.
#[derive(Debug, Default)]
pub struct DspStates {
    pub biquad: StateTable<BiquadFilterState>,
    pub limiter: StateTable<LimiterState>,
    pub compressor: StateTable<CompressorState>,
}
