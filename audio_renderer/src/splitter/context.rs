// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::mem::size_of;

use zerocopy::FromBytes;

use crate::behavior::BehaviorInfo;
use crate::common::align_up;
use crate::splitter::DestinationInParameter;
use crate::splitter::DestinationInParameterVersion2b;
use crate::splitter::InParameterHeader;
use crate::splitter::SplitterDestinationData;
use crate::splitter::SplitterInfo;
use crate::splitter::SplitterInfoInParameter;
use crate::splitter::DESTINATION_MAGIC;
use crate::splitter::HEADER_MAGIC;
use crate::splitter::INFO_MAGIC;

/// All splitters and the destination pool their chains are built from.
///
/// Chains are stored as indices into the pool. A destination belongs to at
/// most one chain at a time, so chains never share nodes or form cycles.
#[derive(Debug, Default)]
pub struct SplitterContext {
    infos: Vec<SplitterInfo>,
    destinations: Vec<SplitterDestinationData>,
    bug_fixed: bool,
    prev_volume_reset_supported: bool,
    float_coeff_supported: bool,
}

impl SplitterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `info_count` splitters and `destination_count` destinations
    /// if the guest's revision supports splitters. Leaves the context unused
    /// otherwise; that is not a failure.
    pub fn initialize(
        &mut self,
        behavior: &BehaviorInfo,
        info_count: u32,
        destination_count: u32,
    ) -> bool {
        if !behavior.is_splitter_supported() || info_count == 0 || destination_count == 0 {
            return true;
        }
        let infos = (0..info_count as i32).map(SplitterInfo::new).collect();
        let destinations = (0..destination_count as i32)
            .map(SplitterDestinationData::new)
            .collect();
        self.setup(infos, destinations, behavior.is_splitter_bug_fixed(), behavior);
        true
    }

    pub fn setup(
        &mut self,
        infos: Vec<SplitterInfo>,
        destinations: Vec<SplitterDestinationData>,
        bug_fixed: bool,
        behavior: &BehaviorInfo,
    ) {
        self.infos = infos;
        self.destinations = destinations;
        self.bug_fixed = bug_fixed;
        self.prev_volume_reset_supported = behavior.is_splitter_prev_volume_reset_supported();
        self.float_coeff_supported = behavior.is_splitter_destination_v2b_supported();
    }

    pub fn using_splitter(&self) -> bool {
        !self.infos.is_empty() && !self.destinations.is_empty()
    }

    pub fn info_count(&self) -> usize {
        self.infos.len()
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    pub fn info(&self, index: usize) -> Option<&SplitterInfo> {
        self.infos.get(index)
    }

    pub fn destination(&self, index: usize) -> Option<&SplitterDestinationData> {
        self.destinations.get(index)
    }

    pub fn destination_mut(&mut self, index: usize) -> Option<&mut SplitterDestinationData> {
        self.destinations.get_mut(index)
    }

    /// The `n`th destination of splitter `splitter_id`'s chain.
    pub fn destination_data(&self, splitter_id: usize, n: usize) -> Option<&SplitterDestinationData> {
        self.chain(splitter_id)
            .nth(n)
            .and_then(|index| self.destinations.get(index))
    }

    pub fn next_of(&self, destination: usize) -> Option<usize> {
        self.destinations.get(destination).and_then(|d| d.next)
    }

    /// Destination indices of splitter `info`, in chain order.
    pub fn chain(&self, info: usize) -> impl Iterator<Item = usize> + '_ {
        let head = self.infos.get(info).and_then(|i| i.head);
        std::iter::successors(head, move |&index| self.next_of(index)).take(self.destinations.len())
    }

    /// Applies the splitter section of a guest update and returns the number
    /// of bytes it occupies, rounded up to 16. Returns 0 when splitters are
    /// unused or the section is malformed.
    pub fn update(&mut self, input: &[u8]) -> usize {
        if !self.using_splitter() {
            return 0;
        }
        let Some(header) = InParameterHeader::read_from_prefix(input) else {
            log::warn!("splitter: update of {} bytes has no header", input.len());
            return 0;
        };
        if header.magic != HEADER_MAGIC {
            log::warn!("splitter: bad header magic {:#010x}", header.magic);
            return 0;
        }

        self.clear_all_new_connection_flags();
        let offset = size_of::<InParameterHeader>();
        let offset = self.update_info(input, offset, header.info_count.max(0) as usize);
        let offset = self.update_data(input, offset, header.destination_count.max(0) as usize);
        align_up(offset, 0x10)
    }

    fn update_info(&mut self, input: &[u8], mut offset: usize, count: usize) -> usize {
        for _ in 0..count {
            let Some(params) = input
                .get(offset..)
                .and_then(SplitterInfoInParameter::read_from_prefix)
            else {
                log::warn!("splitter: info record at {offset:#x} is truncated");
                break;
            };
            if params.magic != INFO_MAGIC {
                continue;
            }
            let Some(index) = usize::try_from(params.id)
                .ok()
                .filter(|&index| index < self.infos.len())
            else {
                log::warn!("splitter: info id {} out of range", params.id);
                break;
            };

            let ids = input
                .get(offset + size_of::<SplitterInfoInParameter>()..)
                .unwrap_or_default();
            self.recompose_destination(index, &params, ids);
            offset += self.infos[index].update(&params);
        }
        offset
    }

    fn update_data(&mut self, input: &[u8], mut offset: usize, count: usize) -> usize {
        for _ in 0..count {
            let Some(rest) = input.get(offset..) else {
                break;
            };
            let (params, biquad_filters, size) = if self.float_coeff_supported {
                let Some(v2b) = DestinationInParameterVersion2b::read_from_prefix(rest) else {
                    log::warn!("splitter: destination record at {offset:#x} is truncated");
                    break;
                };
                (
                    v2b.to_legacy(),
                    Some(v2b.biquad_filters),
                    size_of::<DestinationInParameterVersion2b>(),
                )
            } else {
                let Some(params) = DestinationInParameter::read_from_prefix(rest) else {
                    log::warn!("splitter: destination record at {offset:#x} is truncated");
                    break;
                };
                (params, None, size_of::<DestinationInParameter>())
            };

            if params.magic != DESTINATION_MAGIC {
                continue;
            }
            let Some(destination) = usize::try_from(params.id)
                .ok()
                .and_then(|index| self.destinations.get_mut(index))
            else {
                continue;
            };

            let mut params = params;
            if !self.prev_volume_reset_supported {
                params.reset_prev_volume = 0;
            }
            destination.update(&params);
            if let Some(filters) = biquad_filters {
                *destination.biquad_filters_mut() = filters;
            }
            offset += size;
        }
        offset
    }

    /// Destinations each legacy splitter may link.
    fn destinations_per_info_for_compat(&self) -> usize {
        if self.infos.is_empty() {
            return 0;
        }
        self.destinations.len() / self.infos.len()
    }

    /// Rebuilds splitter `info`'s chain from the ids in `ids`.
    fn recompose_destination(&mut self, info: usize, params: &SplitterInfoInParameter, ids: &[u8]) {
        let mut cursor = self.infos[info].head;
        while let Some(index) = cursor {
            let node = &mut self.destinations[index];
            cursor = node.next.take();
            node.owner = None;
        }
        self.infos[info].set_destinations(None, 0);

        let mut count = params.destination_count as usize;
        if !self.bug_fixed {
            count = count.min(self.destinations_per_info_for_compat());
        }

        let mut head = None;
        let mut tail: Option<usize> = None;
        let mut linked = 0;
        for id in ids.chunks_exact(size_of::<u32>()).take(count) {
            let id = u32::from_le_bytes([id[0], id[1], id[2], id[3]]) as usize;
            let Some(owner) = self.destinations.get(id).map(|node| node.owner) else {
                log::warn!("splitter {info}: destination {id} out of range");
                break;
            };
            match owner {
                Some(owner) if owner == info => {
                    log::warn!("splitter {info}: destination {id} listed twice");
                    continue;
                }
                Some(owner) => self.unlink(owner, id),
                None => {}
            }

            match tail {
                Some(tail) => self.destinations[tail].next = Some(id),
                None => head = Some(id),
            }
            self.destinations[id].owner = Some(info);
            tail = Some(id);
            linked += 1;
        }
        self.infos[info].set_destinations(head, linked);
    }

    /// Removes `node` from splitter `info`'s chain.
    fn unlink(&mut self, info: usize, node: usize) {
        let next = self.destinations[node].next.take();
        self.destinations[node].owner = None;

        let splitter = &mut self.infos[info];
        if splitter.head == Some(node) {
            splitter.head = next;
        } else {
            let mut cursor = splitter.head;
            while let Some(index) = cursor {
                let previous = &mut self.destinations[index];
                if previous.next == Some(node) {
                    previous.next = next;
                    break;
                }
                cursor = previous.next;
            }
        }
        let count = splitter.destination_count().saturating_sub(1);
        let head = splitter.head;
        splitter.set_destinations(head, count);
    }

    /// Latches the volumes of every linked destination.
    pub fn update_internal_state(&mut self) {
        for info in 0..self.infos.len() {
            let mut cursor = self.infos[info].head;
            while let Some(index) = cursor {
                let node = &mut self.destinations[index];
                node.update_internal_state();
                cursor = node.next;
            }
        }
    }

    /// Lowers every info's new connection flag. Infos named in the next
    /// guest update raise it again.
    pub fn clear_all_new_connection_flags(&mut self) {
        for info in &mut self.infos {
            info.clear_new_connection_flag();
        }
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::AsBytes;

    use super::*;
    use crate::command::BiquadFilterParameter2;
    use crate::common::MAX_MIX_BUFFERS;

    fn context(revision: u32, infos: u32, destinations: u32) -> SplitterContext {
        let behavior = BehaviorInfo::with_revision(revision).unwrap();
        let mut context = SplitterContext::new();
        assert!(context.initialize(&behavior, infos, destinations));
        context
    }

    fn header(infos: i32, destinations: i32) -> Vec<u8> {
        InParameterHeader {
            magic: HEADER_MAGIC,
            info_count: infos,
            destination_count: destinations,
            ..Default::default()
        }
        .as_bytes()
        .to_vec()
    }

    fn info(id: i32, ids: &[u32]) -> Vec<u8> {
        let mut bytes = SplitterInfoInParameter {
            magic: INFO_MAGIC,
            id,
            sample_rate: 48000,
            destination_count: ids.len() as u32,
        }
        .as_bytes()
        .to_vec();
        for id in ids {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        bytes
    }

    fn destination(id: i32, volume: f32, reset: bool) -> DestinationInParameter {
        DestinationInParameter {
            magic: DESTINATION_MAGIC,
            id,
            mix_volumes: [volume; MAX_MIX_BUFFERS],
            mix_id: 1,
            in_use: 1,
            reset_prev_volume: reset as u8,
            ..Default::default()
        }
    }

    fn chain(context: &SplitterContext, info: usize) -> Vec<usize> {
        context.chain(info).collect()
    }

    /// Every destination is referenced by at most one predecessor or head.
    fn assert_single_predecessor(context: &SplitterContext) {
        let mut references = vec![0; context.destination_count()];
        for info in 0..context.info_count() {
            for index in chain(context, info) {
                references[index] += 1;
            }
        }
        assert!(references.iter().all(|&r| r <= 1), "{references:?}");
    }

    #[test]
    fn initialize() {
        let unsupported = context(1, 2, 4);
        assert!(!unsupported.using_splitter());
        assert_eq!(unsupported.info_count(), 0);
        assert_eq!(unsupported.destination_count(), 0);

        let empty = context(15, 0, 4);
        assert!(!empty.using_splitter());

        let context = context(15, 2, 4);
        assert!(context.using_splitter());
        assert_eq!(context.info_count(), 2);
        assert_eq!(context.destination_count(), 4);
        assert_eq!(context.info(1).unwrap().id(), 1);
        assert_eq!(context.destination(3).unwrap().id(), 3);
    }

    #[test]
    fn malformed_updates_consume_nothing() {
        let mut unused = context(1, 2, 4);
        assert_eq!(unused.update(&header(0, 0)), 0);

        let mut context = context(14, 2, 6);
        assert_eq!(context.update(&header(0, 0)[..0x10]), 0);

        let mut bad = header(0, 0);
        bad[0] = b'X';
        assert_eq!(context.update(&bad), 0);
        // New connection flags are left alone.
        assert!(context.info(0).unwrap().has_new_connection());
    }

    #[test]
    fn recompose() {
        let mut context = context(14, 2, 6);
        let mut input = header(1, 0);
        input.extend(info(0, &[2, 0, 5]));
        assert_eq!(context.update(&input), align_up(0x20 + 0x10 + 12, 16));

        assert_eq!(chain(&context, 0), [2, 0, 5]);
        assert_eq!(context.info(0).unwrap().destination_count(), 3);
        assert!(context.info(0).unwrap().has_new_connection());
        assert!(!context.info(1).unwrap().has_new_connection());
        assert_eq!(context.next_of(0), Some(5));
        assert_eq!(context.destination_data(0, 1).unwrap().id(), 0);
        assert_eq!(context.destination_data(0, 3), None);

        // Recomposing replaces the old chain.
        let mut input = header(1, 0);
        input.extend(info(0, &[5, 2]));
        context.update(&input);
        assert_eq!(chain(&context, 0), [5, 2]);
        assert_eq!(context.next_of(0), None);
        assert_single_predecessor(&context);
    }

    #[test]
    fn shared_destination_moves() {
        let mut context = context(14, 2, 6);
        let mut input = header(2, 0);
        input.extend(info(0, &[2, 0, 5]));
        input.extend(info(1, &[0, 3]));
        context.update(&input);

        assert_eq!(chain(&context, 0), [2, 5]);
        assert_eq!(context.info(0).unwrap().destination_count(), 2);
        assert_eq!(chain(&context, 1), [0, 3]);
        assert_single_predecessor(&context);

        // The same update again leaves one predecessor per node.
        context.update(&input);
        assert_eq!(chain(&context, 0), [2, 5]);
        assert_eq!(chain(&context, 1), [0, 3]);
        assert_single_predecessor(&context);
    }

    #[test]
    fn duplicate_and_out_of_range_ids() {
        let mut context = context(14, 1, 4);
        let mut input = header(1, 0);
        input.extend(info(0, &[1, 1, 2]));
        context.update(&input);
        assert_eq!(chain(&context, 0), [1, 2]);

        let mut input = header(1, 0);
        input.extend(info(0, &[3, 9, 0]));
        context.update(&input);
        assert_eq!(chain(&context, 0), [3]);
        assert_single_predecessor(&context);
    }

    #[test]
    fn legacy_truncation() {
        // Six destinations over two splitters: three each before the fix.
        let mut legacy = context(4, 2, 6);
        let mut input = header(1, 0);
        input.extend(info(0, &[0, 1, 2, 3, 4]));
        // The whole record is still consumed.
        assert_eq!(legacy.update(&input), align_up(0x20 + 0x10 + 20, 16));
        assert_eq!(chain(&legacy, 0), [0, 1, 2]);

        let mut fixed = context(5, 2, 6);
        fixed.update(&input);
        assert_eq!(chain(&fixed, 0), [0, 1, 2, 3, 4]);
    }

    #[test]
    fn bad_info_records() {
        let mut context = context(14, 2, 4);
        let mut input = header(2, 0);
        let mut bad = info(0, &[1]);
        bad[0] = 0;
        input.extend(bad);
        input.extend(info(1, &[2]));
        // The bad record is skipped without advancing, so the valid record
        // behind it is never reached.
        assert_eq!(context.update(&input), 0x20);
        assert_eq!(chain(&context, 0), Vec::<usize>::new());
        assert_eq!(chain(&context, 1), Vec::<usize>::new());

        let mut input = header(2, 0);
        input.extend(info(7, &[1]));
        input.extend(info(1, &[2]));
        assert_eq!(context.update(&input), 0x20);
        assert_eq!(chain(&context, 1), Vec::<usize>::new());
    }

    #[test]
    fn destination_updates() {
        let mut context = context(14, 1, 4);
        let mut input = header(0, 3);
        input.extend(destination(1, 0.5, false).as_bytes());
        input.extend(destination(9, 0.5, false).as_bytes());
        input.extend(destination(2, 0.25, false).as_bytes());
        // The out of range record is skipped without advancing: the record
        // after it is read in its place and ignored again.
        assert_eq!(context.update(&input), 0x20 + 0x70);
        let d = context.destination(1).unwrap();
        assert!(d.is_configured());
        assert_eq!(d.mix_volume(0), 0.5);
        assert!(!context.destination(2).unwrap().is_configured());
    }

    #[test]
    fn prev_volume_reset_needs_revision() {
        for (revision, expected) in [(12, 0.5), (13, 0.75)] {
            let mut context = context(revision, 1, 2);
            let mut input = header(0, 1);
            input.extend(destination(0, 0.5, false).as_bytes());
            context.update(&input);

            let mut input = header(0, 1);
            input.extend(destination(0, 0.75, true).as_bytes());
            context.update(&input);
            assert_eq!(
                context.destination(0).unwrap().prev_mix_volume(0),
                expected,
                "revision {revision}"
            );
        }
    }

    #[test]
    fn version2b_destinations() {
        let mut context = context(15, 1, 2);
        let filter = BiquadFilterParameter2 {
            enabled: 1,
            numerator: [0.5, 0.25, 0.125],
            denominator: [0.1, -0.2],
            ..Default::default()
        };
        let record = DestinationInParameterVersion2b {
            magic: DESTINATION_MAGIC,
            id: 1,
            mix_volumes: [0.5; MAX_MIX_BUFFERS],
            mix_id: 3,
            biquad_filters: [filter, BiquadFilterParameter2::default()],
            in_use: 1,
            ..Default::default()
        };
        let mut input = header(0, 1);
        input.extend(record.as_bytes());
        assert_eq!(context.update(&input), align_up(0x20 + 0xA8, 16));

        let d = context.destination(1).unwrap();
        assert_eq!(d.mix_id(), 3);
        assert!(d.biquad_filters()[0].is_enabled());
        assert_eq!(d.biquad_filters()[0], filter);
        assert!(!d.biquad_filters()[1].is_enabled());
    }

    #[test]
    fn update_internal_state() {
        let mut context = context(14, 1, 3);
        let mut input = header(1, 2);
        input.extend(info(0, &[0]));
        input.extend(destination(0, 0.5, false).as_bytes());
        input.extend(destination(1, 0.5, false).as_bytes());
        context.update(&input);

        for index in 0..2 {
            let d = context.destination_mut(index).unwrap();
            d.mix_volumes_mut()[0] = 1.;
            d.mark_as_need_to_update_internal_state();
        }
        context.update_internal_state();
        // Only destinations linked into a chain are latched.
        assert_eq!(context.destination(0).unwrap().prev_mix_volume(0), 1.);
        assert_eq!(context.destination(1).unwrap().prev_mix_volume(0), 0.5);
        assert!(context.destination(1).unwrap().needs_update());
    }

    #[test]
    fn clear_new_connection_flags() {
        let mut context = context(14, 2, 2);
        assert!(context.info(0).unwrap().has_new_connection());
        context.clear_all_new_connection_flags();
        assert!(!context.info(0).unwrap().has_new_connection());
        assert!(!context.info(1).unwrap().has_new_connection());
    }
}
