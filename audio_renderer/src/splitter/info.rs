// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::mem::size_of;

use crate::splitter::SplitterInfoInParameter;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitterInfo {
    id: i32,
    sample_rate: u32,
    destination_count: u32,
    pub(crate) head: Option<usize>,
    has_new_connection: bool,
}

impl SplitterInfo {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            sample_rate: 0,
            destination_count: 0,
            head: None,
            has_new_connection: true,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of destinations linked into the chain.
    pub fn destination_count(&self) -> u32 {
        self.destination_count
    }

    /// Index of the first destination of the chain.
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn has_new_connection(&self) -> bool {
        self.has_new_connection
    }

    pub fn clear_new_connection_flag(&mut self) {
        self.has_new_connection = false;
    }

    pub(crate) fn set_destinations(&mut self, head: Option<usize>, count: u32) {
        self.head = head;
        self.destination_count = count;
    }

    /// Applies the fixed part of a guest record and returns the size of the
    /// whole record, id list included. Records for another splitter consume
    /// nothing.
    pub fn update(&mut self, params: &SplitterInfoInParameter) -> usize {
        if params.id != self.id {
            return 0;
        }
        self.sample_rate = params.sample_rate;
        self.has_new_connection = true;
        size_of::<SplitterInfoInParameter>() + params.destination_count as usize * size_of::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::INFO_MAGIC;

    #[test]
    fn update() {
        let mut info = SplitterInfo::new(1);
        info.clear_new_connection_flag();
        let mut params = SplitterInfoInParameter {
            magic: INFO_MAGIC,
            id: 1,
            sample_rate: 32000,
            destination_count: 3,
        };
        assert_eq!(info.update(&params), 0x1C);
        assert_eq!(info.sample_rate(), 32000);
        assert!(info.has_new_connection());

        params.id = 0;
        params.sample_rate = 48000;
        assert_eq!(info.update(&params), 0);
        assert_eq!(info.sample_rate(), 32000);
    }
}
