// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Contiguous span allocator over a single growable index space
//!
//! The allocator only does bookkeeping: it hands out `[offset, offset+count)`
//! spans and takes them back. The registry owns whatever lives in the slots.

use super::Section;
use crate::error::{ConsistencyError, RegistryError};
use log::{debug, trace};

/// Largest index space the allocator will grow to
pub const MAX_INDEX_SPACE: u64 = u32::MAX as u64;

/// First-fit allocator with a sorted, coalesced free list
#[derive(Debug, Clone, Default)]
pub struct RangeAllocator {
    /// Free spans sorted by offset; never empty, never adjacent
    free_spans: Vec<Section>,
    /// Size of the index space handed out so far
    len: u32,
}

impl RangeAllocator {
    pub fn new() -> Self {
        Self {
            free_spans: Vec::new(),
            len: 0,
        }
    }

    /// Allocate `count` contiguous slots and return the first offset
    pub fn allocate(&mut self, count: u32) -> Result<u32, RegistryError> {
        if count == 0 {
            return Err(RegistryError::ZeroCount);
        }

        if let Some(pos) = self.free_spans.iter().position(|span| span.len >= count) {
            let span = &mut self.free_spans[pos];
            let offset = span.offset;
            span.offset += count;
            span.len -= count;
            if span.len == 0 {
                self.free_spans.remove(pos);
            }
            trace!("allocated [{}, +{}) from free list", offset, count);
            return Ok(offset);
        }

        // A free run touching the tail is absorbed into the growth
        let offset = match self.free_spans.last() {
            Some(last) if last.end() == self.len => last.offset,
            _ => self.len,
        };
        let new_len = offset as u64 + count as u64;
        if new_len > MAX_INDEX_SPACE {
            return Err(RegistryError::CapacityExceeded { requested: new_len });
        }
        if offset != self.len {
            self.free_spans.pop();
        }
        self.len = new_len as u32;
        debug!("index space grown to {} slots", self.len);
        Ok(offset)
    }

    /// Return `[offset, offset+count)` to the free list
    pub fn free(&mut self, offset: u32, count: u32) -> Result<(), RegistryError> {
        if count == 0 {
            return Err(RegistryError::ZeroCount);
        }
        let end = self.checked_end(offset, count)?;

        let pos = self.free_spans.partition_point(|span| span.offset < offset);
        let overlaps_prev = pos > 0 && self.free_spans[pos - 1].end() > offset;
        let overlaps_next = pos < self.free_spans.len() && self.free_spans[pos].offset < end;
        if overlaps_prev || overlaps_next {
            return Err(RegistryError::DoubleFree { offset, count });
        }

        let merge_prev = pos > 0 && self.free_spans[pos - 1].end() == offset;
        let merge_next = pos < self.free_spans.len() && self.free_spans[pos].offset == end;
        match (merge_prev, merge_next) {
            (true, true) => {
                let next_len = self.free_spans[pos].len;
                self.free_spans[pos - 1].len += count + next_len;
                self.free_spans.remove(pos);
            }
            (true, false) => self.free_spans[pos - 1].len += count,
            (false, true) => {
                let next = &mut self.free_spans[pos];
                next.offset = offset;
                next.len += count;
            }
            (false, false) => self.free_spans.insert(pos, Section::new(offset, count)),
        }
        trace!("freed [{}, +{})", offset, count);
        Ok(())
    }

    /// Resize an allocated span, growing in place when the slots after it
    /// are free. Returns the span's offset afterwards; when it differs from
    /// `offset` the caller must migrate the contents. The old span is only
    /// released after the new one is reserved, so the two never overlap.
    pub fn reallocate(
        &mut self,
        offset: u32,
        old_count: u32,
        new_count: u32,
    ) -> Result<u32, RegistryError> {
        if old_count == 0 || new_count == 0 {
            return Err(RegistryError::ZeroCount);
        }
        if !self.is_range_allocated(offset, old_count) {
            return Err(RegistryError::NotAllocated {
                offset,
                count: old_count,
            });
        }

        if new_count == old_count {
            return Ok(offset);
        }
        if new_count < old_count {
            self.free(offset + new_count, old_count - new_count)?;
            return Ok(offset);
        }

        let extra = new_count - old_count;
        let tail = offset + old_count;

        if tail == self.len {
            self.grow(extra)?;
            return Ok(offset);
        }

        let pos = self.free_spans.partition_point(|span| span.offset < tail);
        if pos < self.free_spans.len() && self.free_spans[pos].offset == tail {
            let span = self.free_spans[pos];
            if span.len >= extra {
                if span.len == extra {
                    self.free_spans.remove(pos);
                } else {
                    let span = &mut self.free_spans[pos];
                    span.offset += extra;
                    span.len -= extra;
                }
                return Ok(offset);
            }
            if span.end() == self.len {
                self.grow(extra - span.len)?;
                self.free_spans.remove(pos);
                return Ok(offset);
            }
        }

        let new_offset = self.allocate(new_count)?;
        self.free(offset, old_count)?;
        debug!(
            "relocated span [{}, +{}) to [{}, +{})",
            offset, old_count, new_offset, new_count
        );
        Ok(new_offset)
    }

    /// Whether `index` is currently not handed out
    pub fn is_free(&self, index: u32) -> bool {
        if index >= self.len {
            return true;
        }
        let pos = self.free_spans.partition_point(|span| span.offset <= index);
        pos > 0 && self.free_spans[pos - 1].end() > index
    }

    /// Whether every slot of `[offset, offset+count)` is handed out
    pub fn is_range_allocated(&self, offset: u32, count: u32) -> bool {
        let end = offset as u64 + count as u64;
        if end > self.len as u64 {
            return false;
        }
        let pos = self.free_spans.partition_point(|span| span.end() <= offset);
        pos == self.free_spans.len() || self.free_spans[pos].offset as u64 >= end
    }

    /// Size of the index space handed out so far
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free_span_count(&self) -> usize {
        self.free_spans.len()
    }

    pub fn free_slot_count(&self) -> u32 {
        self.free_spans.iter().map(|span| span.len).sum()
    }

    pub fn free_spans(&self) -> &[Section] {
        &self.free_spans
    }

    /// Forget every span and shrink the index space to zero
    pub fn clear(&mut self) {
        self.free_spans.clear();
        self.len = 0;
    }

    /// Verify the free list is sorted, coalesced and inside the index space
    pub fn validate(&self) -> Result<(), ConsistencyError> {
        let mut previous_end: Option<u32> = None;
        for span in &self.free_spans {
            let malformed = span.len == 0
                || span.offset as u64 + span.len as u64 > self.len as u64
                || previous_end.is_some_and(|end| span.offset <= end);
            if malformed {
                return Err(ConsistencyError::MalformedFreeSpan {
                    offset: span.offset,
                    count: span.len,
                });
            }
            previous_end = Some(span.end());
        }
        Ok(())
    }

    fn grow(&mut self, extra: u32) -> Result<(), RegistryError> {
        let new_len = self.len as u64 + extra as u64;
        if new_len > MAX_INDEX_SPACE {
            return Err(RegistryError::CapacityExceeded { requested: new_len });
        }
        self.len = new_len as u32;
        debug!("index space grown in place to {} slots", self.len);
        Ok(())
    }

    fn checked_end(&self, offset: u32, count: u32) -> Result<u32, RegistryError> {
        let end = offset as u64 + count as u64;
        if end > self.len as u64 {
            return Err(RegistryError::OutOfBounds {
                offset,
                count,
                len: self.len,
            });
        }
        Ok(end as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_grows_tail() {
        let mut allocator = RangeAllocator::new();
        assert_eq!(allocator.allocate(3).unwrap(), 0);
        assert_eq!(allocator.allocate(2).unwrap(), 3);
        assert_eq!(allocator.len(), 5);
        assert_eq!(allocator.free_span_count(), 0);
    }

    #[test]
    fn test_zero_count_is_rejected() {
        let mut allocator = RangeAllocator::new();
        assert_eq!(allocator.allocate(0), Err(RegistryError::ZeroCount));
        allocator.allocate(1).unwrap();
        assert_eq!(allocator.free(0, 0), Err(RegistryError::ZeroCount));
    }

    #[test]
    fn test_first_fit_reuses_hole() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(10).unwrap();
        allocator.free(2, 3).unwrap();
        allocator.free(7, 2).unwrap();

        // First hole that fits wins, even if a later one is a tighter fit
        assert_eq!(allocator.allocate(2).unwrap(), 2);
        assert_eq!(allocator.free_spans(), &[Section::new(4, 1), Section::new(7, 2)]);
        assert_eq!(allocator.len(), 10);
    }

    #[test]
    fn test_free_coalesces_neighbours() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(9).unwrap();
        allocator.free(0, 2).unwrap();
        allocator.free(4, 2).unwrap();
        assert_eq!(allocator.free_span_count(), 2);

        allocator.free(2, 2).unwrap();
        assert_eq!(allocator.free_spans(), &[Section::new(0, 6)]);

        allocator.free(6, 3).unwrap();
        assert_eq!(allocator.free_spans(), &[Section::new(0, 9)]);
        assert!(allocator.validate().is_ok());
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(6).unwrap();
        allocator.free(1, 3).unwrap();

        assert_eq!(
            allocator.free(2, 1),
            Err(RegistryError::DoubleFree { offset: 2, count: 1 })
        );
        assert_eq!(
            allocator.free(0, 2),
            Err(RegistryError::DoubleFree { offset: 0, count: 2 })
        );
        assert!(matches!(
            allocator.free(5, 4),
            Err(RegistryError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_allocate_absorbs_trailing_free_run() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(4).unwrap();
        allocator.free(2, 2).unwrap();

        assert_eq!(allocator.allocate(5).unwrap(), 2);
        assert_eq!(allocator.len(), 7);
        assert_eq!(allocator.free_span_count(), 0);
    }

    #[test]
    fn test_is_free() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(5).unwrap();
        allocator.free(1, 2).unwrap();

        assert!(!allocator.is_free(0));
        assert!(allocator.is_free(1));
        assert!(allocator.is_free(2));
        assert!(!allocator.is_free(3));
        assert!(allocator.is_free(5));

        assert!(allocator.is_range_allocated(3, 2));
        assert!(!allocator.is_range_allocated(0, 2));
        assert!(!allocator.is_range_allocated(4, 2));
    }

    #[test]
    fn test_reallocate_in_place_at_end() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(2).unwrap();
        let offset = allocator.allocate(3).unwrap();

        assert_eq!(allocator.reallocate(offset, 3, 4).unwrap(), offset);
        assert_eq!(allocator.len(), 6);
    }

    #[test]
    fn test_reallocate_in_place_into_free_tail() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(8).unwrap();
        allocator.free(3, 3).unwrap();

        assert_eq!(allocator.reallocate(0, 3, 5).unwrap(), 0);
        assert_eq!(allocator.free_spans(), &[Section::new(5, 1)]);
    }

    #[test]
    fn test_reallocate_relocates_when_blocked() {
        let mut allocator = RangeAllocator::new();
        let first = allocator.allocate(2).unwrap();
        allocator.allocate(2).unwrap();

        let moved = allocator.reallocate(first, 2, 3).unwrap();
        assert_eq!(moved, 4);
        assert!(allocator.is_free(0));
        assert!(allocator.is_free(1));
        assert!(allocator.is_range_allocated(4, 3));
    }

    #[test]
    fn test_reallocate_shrinks_in_place() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(6).unwrap();

        assert_eq!(allocator.reallocate(0, 6, 4).unwrap(), 0);
        assert_eq!(allocator.free_spans(), &[Section::new(4, 2)]);
    }

    #[test]
    fn test_reallocate_rejects_free_span() {
        let mut allocator = RangeAllocator::new();
        allocator.allocate(4).unwrap();
        allocator.free(0, 2).unwrap();

        assert_eq!(
            allocator.reallocate(0, 2, 3),
            Err(RegistryError::NotAllocated { offset: 0, count: 2 })
        );
    }
}
