// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::common::CpuAddr;
use crate::common::DspAddr;

/// Translates guest addresses into addresses the DSP can reach.
pub trait PoolMapper {
    /// Returns `None` if `[address, address + size)` is not inside a mapped
    /// pool. A null address or empty range never maps.
    fn translate(&self, address: CpuAddr, size: u64) -> Option<DspAddr>;
}

/// Maps every non-null address onto itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityPoolMapper;

impl PoolMapper for IdentityPoolMapper {
    fn translate(&self, address: CpuAddr, size: u64) -> Option<DspAddr> {
        (address != 0 && size != 0).then_some(address)
    }
}

/// A guest memory region attached to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryPool {
    pub cpu_address: CpuAddr,
    pub dsp_address: DspAddr,
    pub size: u64,
}

impl MemoryPool {
    fn contains(&self, address: CpuAddr, size: u64) -> bool {
        let Some(end) = address.checked_add(size) else {
            return false;
        };
        address >= self.cpu_address && end <= self.cpu_address.saturating_add(self.size)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPoolMapper {
    pools: Vec<MemoryPool>,
}

impl MemoryPoolMapper {
    pub fn new(pools: Vec<MemoryPool>) -> Self {
        Self { pools }
    }

    pub fn attach(&mut self, pool: MemoryPool) {
        self.pools.push(pool);
    }
}

impl PoolMapper for MemoryPoolMapper {
    fn translate(&self, address: CpuAddr, size: u64) -> Option<DspAddr> {
        if address == 0 || size == 0 {
            return None;
        }
        self.pools
            .iter()
            .find(|pool| pool.contains(address, size))
            .map(|pool| pool.dsp_address + (address - pool.cpu_address))
    }
}
