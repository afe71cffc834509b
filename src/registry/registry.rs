// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Generation-checked handle registry over dense, compactable slots
//!
//! The registry keeps two inverse tables: `id_to_index` (one entry per id
//! ever minted) and `slots` (one entry per index in the allocator's space).
//! An id has no index exactly when it sits in the free list, and every
//! occupied slot names the id bound to it. Range operations move slots
//! around, never ids, so handles held outside stay valid.

use super::{Handle, HandleStatus, RangeAllocator, Section};
use crate::error::{ConsistencyError, RegistryError};
use crate::release::{release_deferred, PendingRelease};
use ahash::AHashSet;
use log::{debug, trace, warn};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
struct Slot<T> {
    id: u32,
    value: T,
}

#[derive(Debug, Clone, Copy)]
struct IdEntry {
    index: Option<u32>,
    generation: u32,
}

/// Registry mapping stable `(id, generation)` handles to slot indices
///
/// The optional payload `T` lives in the slot, so compaction moves it
/// together with the id. Use `HandleRegistry<()>` for pure id management.
#[derive(Debug, Clone)]
pub struct HandleRegistry<T = ()> {
    id_to_index: Vec<IdEntry>,
    slots: Vec<Option<Slot<T>>>,
    /// Min-heap, so `pop` hands out the lowest free id
    free_ids: BinaryHeap<Reverse<u32>>,
    allocator: RangeAllocator,
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            id_to_index: Vec::new(),
            slots: Vec::new(),
            free_ids: BinaryHeap::new(),
            allocator: RangeAllocator::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id_to_index: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free_ids: BinaryHeap::new(),
            allocator: RangeAllocator::new(),
        }
    }

    /// Bind `count` default-valued handles to a fresh contiguous range
    pub fn create(&mut self, count: u32) -> Result<(u32, Vec<Handle>), RegistryError>
    where
        T: Default,
    {
        self.create_with((0..count).map(|_| T::default()))
    }

    /// Bind one handle per value to a fresh contiguous range, in order
    ///
    /// Returns the first index of the range and the handles bound to it.
    pub fn create_with<I>(&mut self, values: I) -> Result<(u32, Vec<Handle>), RegistryError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        let count = u32::try_from(values.len()).map_err(|_| RegistryError::CapacityExceeded {
            requested: values.len() as u64,
        })?;

        let first_index = self.allocator.allocate(count)?;
        self.sync_slot_table();

        let mut handles = Vec::with_capacity(count as usize);
        for (index, value) in (first_index..first_index + count).zip(values) {
            let handle = self.acquire_id(index)?;
            self.slots[index as usize] = Some(Slot {
                id: handle.id,
                value,
            });
            handles.push(handle);
        }
        trace!("created {} handles at [{}, +{})", count, first_index, count);
        Ok((first_index, handles))
    }

    /// Current slot of `handle`, or `None` if it is stale, freed or unknown
    pub fn resolve(&self, handle: Handle) -> Option<u32> {
        let entry = self.id_to_index.get(handle.id as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let index = entry.index?;
        if self.allocator.is_free(index) {
            return None;
        }
        Some(index)
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        self.resolve(handle).is_some()
    }

    pub fn status(&self, handle: Handle) -> HandleStatus {
        let Some(entry) = self.id_to_index.get(handle.id as usize) else {
            return HandleStatus::Unknown;
        };
        if entry.generation != handle.generation {
            return HandleStatus::Stale;
        }
        match entry.index {
            Some(index) if !self.allocator.is_free(index) => HandleStatus::Live(index),
            _ => HandleStatus::Freed,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let index = self.resolve(handle)?;
        self.slots[index as usize].as_ref().map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let index = self.resolve(handle)?;
        self.slots[index as usize].as_mut().map(|slot| &mut slot.value)
    }

    /// Handle currently bound to `index`, if any
    pub fn handle_at(&self, index: u32) -> Option<Handle> {
        let slot = self.slots.get(index as usize)?.as_ref()?;
        let generation = self.id_to_index[slot.id as usize].generation;
        Some(Handle::new(slot.id, generation))
    }

    pub fn value_at(&self, index: u32) -> Option<&T> {
        self.slots
            .get(index as usize)?
            .as_ref()
            .map(|slot| &slot.value)
    }

    /// Handles bound to each slot of `section`, in slot order
    pub fn handles_in(&self, section: Section) -> Vec<Option<Handle>> {
        (section.offset..section.end())
            .map(|index| self.handle_at(index))
            .collect()
    }

    /// Free a single handle, returning its slot to the allocator
    pub fn free(&mut self, handle: Handle) -> Result<T, RegistryError> {
        let index = self
            .resolve(handle)
            .ok_or(RegistryError::InvalidHandle(handle))?;
        if self.slots[index as usize].is_none() {
            return Err(RegistryError::EmptySlot(index));
        }
        self.allocator.free(index, 1)?;

        let slot = self.slots[index as usize]
            .take()
            .ok_or(RegistryError::EmptySlot(index))?;
        self.release_id(slot.id);
        trace!("freed handle {} at slot {}", handle, index);
        Ok(slot.value)
    }

    /// Free every handle bound inside `[start, start+count)` and return the
    /// span to the allocator
    pub fn free_range(&mut self, start: u32, count: u32) -> Result<Vec<T>, RegistryError> {
        self.check_allocated(start, count)?;
        self.allocator.free(start, count)?;

        let mut values = Vec::with_capacity(count as usize);
        for index in start..start + count {
            if let Some(slot) = self.slots[index as usize].take() {
                self.release_id(slot.id);
                values.push(slot.value);
            }
        }
        trace!("freed range [{}, +{}), {} handles", start, count, values.len());
        Ok(values)
    }

    /// Move `[swap_start, swap_start+swap_count)` of `section` to its tail,
    /// keeping the order of both the moved run and the remainder
    pub fn swap_range_to_back(
        &mut self,
        section: Section,
        swap_start: u32,
        swap_count: u32,
    ) -> Result<(), RegistryError> {
        if swap_start as u64 + swap_count as u64 > section.len as u64 {
            return Err(RegistryError::SubRangeOutOfSection {
                start: swap_start,
                count: swap_count,
                len: section.len,
            });
        }
        if section.is_empty() {
            return Ok(());
        }
        self.check_allocated(section.offset, section.len)?;
        if swap_count == 0 {
            return Ok(());
        }

        let start = section.offset + swap_start;
        let end = section.end();
        if start + swap_count == end {
            return Ok(());
        }

        self.slots[start as usize..end as usize].rotate_left(swap_count as usize);
        self.resync(start, end);
        Ok(())
    }

    /// Grow `section` by one and move the slot at `source_index` into it at
    /// `insert_pos`. Returns the section's (possibly relocated) offset.
    ///
    /// `source_index` must be a standalone single-slot allocation outside the
    /// section, such as one produced by `create(1)`. Its handle keeps its id
    /// and generation; the vacated source slot goes back to the allocator.
    pub fn insert_into_range(
        &mut self,
        section: Section,
        insert_pos: u32,
        source_index: u32,
    ) -> Result<u32, RegistryError> {
        if insert_pos > section.len {
            return Err(RegistryError::InsertPositionOutOfSection {
                position: insert_pos,
                len: section.len,
            });
        }
        if section.contains(source_index) {
            return Err(RegistryError::SourceInsideSection {
                source_index,
                offset: section.offset,
                len: section.len,
            });
        }
        if self.allocator.is_free(source_index) {
            return Err(RegistryError::NotAllocated {
                offset: source_index,
                count: 1,
            });
        }
        if self.slots[source_index as usize].is_none() {
            return Err(RegistryError::EmptySlot(source_index));
        }

        let new_len = section
            .len
            .checked_add(1)
            .ok_or(RegistryError::CapacityExceeded {
                requested: section.len as u64 + 1,
            })?;
        let new_offset = if section.is_empty() {
            self.allocator.allocate(1)?
        } else {
            self.check_allocated(section.offset, section.len)?;
            self.allocator
                .reallocate(section.offset, section.len, new_len)?
        };
        self.sync_slot_table();

        let old = section.offset as usize;
        let len = section.len as usize;
        let pos = insert_pos as usize;
        if !section.is_empty() {
            if new_offset == section.offset {
                // Grown in place: the slot past the old end is empty
                self.slots[old + pos..old + len + 1].rotate_right(1);
            } else {
                let new = new_offset as usize;
                for i in 0..pos {
                    self.slots[new + i] = self.slots[old + i].take();
                }
                for i in pos..len {
                    self.slots[new + i + 1] = self.slots[old + i].take();
                }
                debug!(
                    "section [{}, +{}) relocated to [{}, +{})",
                    section.offset, section.len, new_offset, new_len
                );
            }
        }

        let moved = self.slots[source_index as usize].take();
        self.slots[new_offset as usize + pos] = moved;
        self.allocator.free(source_index, 1)?;

        self.resync(new_offset, new_offset + new_len);
        Ok(new_offset)
    }

    /// Free the handles in `[remove_index, remove_index+remove_count)` of the
    /// section at `offset`, close the gap and release the vacated tail
    pub fn remove_range(
        &mut self,
        offset: u32,
        count: u32,
        remove_index: u32,
        remove_count: u32,
    ) -> Result<Vec<T>, RegistryError> {
        if remove_count == 0 {
            return Err(RegistryError::ZeroCount);
        }
        if remove_index as u64 + remove_count as u64 > count as u64 {
            return Err(RegistryError::SubRangeOutOfSection {
                start: remove_index,
                count: remove_count,
                len: count,
            });
        }
        self.check_allocated(offset, count)?;

        let start = offset + remove_index;
        let end = offset + count;

        let mut removed = Vec::with_capacity(remove_count as usize);
        for index in start..start + remove_count {
            if let Some(slot) = self.slots[index as usize].take() {
                self.release_id(slot.id);
                removed.push(slot.value);
            }
        }

        self.slots[start as usize..end as usize].rotate_left(remove_count as usize);
        self.resync(start, end - remove_count);
        self.allocator.free(end - remove_count, remove_count)?;
        Ok(removed)
    }

    /// Iterate live handles and their values in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.slots.iter().filter_map(move |slot| {
            let slot = slot.as_ref()?;
            let generation = self.id_to_index[slot.id as usize].generation;
            Some((Handle::new(slot.id, generation), &slot.value))
        })
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.id_to_index.len() - self.free_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ids ever minted
    pub fn id_capacity(&self) -> usize {
        self.id_to_index.len()
    }

    pub fn index_space_len(&self) -> u32 {
        self.allocator.len()
    }

    pub fn allocator(&self) -> &RangeAllocator {
        &self.allocator
    }

    /// Whether `id` has been minted and is waiting for reuse
    pub fn is_id_free(&self, id: u32) -> bool {
        self.id_to_index
            .get(id as usize)
            .is_some_and(|entry| entry.index.is_none())
    }

    /// Free every handle. Generations are kept so old handles stay invalid.
    pub fn clear(&mut self) {
        for entry in &mut self.id_to_index {
            entry.index = None;
        }
        let id_count = self.id_to_index.len() as u32;
        self.free_ids = (0..id_count).map(Reverse).collect();
        self.slots.clear();
        self.allocator.clear();
    }

    /// Full O(n) verification of the id/index bijection
    pub fn validate(&self) -> Result<(), ConsistencyError> {
        self.allocator.validate()?;

        let id_len = self.id_to_index.len() as u32;
        let mut free_set = AHashSet::with_capacity(self.free_ids.len());
        for &Reverse(id) in &self.free_ids {
            if id >= id_len {
                return Err(ConsistencyError::FreeIdOutOfRange { id, len: id_len });
            }
            if !free_set.insert(id) {
                return Err(ConsistencyError::DuplicateFreeId { id });
            }
        }

        for (id, entry) in self.id_to_index.iter().enumerate() {
            let id = id as u32;
            let Some(index) = entry.index else {
                if !free_set.contains(&id) {
                    return Err(ConsistencyError::UnboundIdNotFree { id });
                }
                continue;
            };
            if free_set.contains(&id) {
                return Err(ConsistencyError::FreeIdBound { id, index });
            }
            let found = self
                .slots
                .get(index as usize)
                .and_then(|slot| slot.as_ref())
                .map(|slot| slot.id);
            if found != Some(id) {
                return Err(ConsistencyError::BrokenRoundTrip { id, index, found });
            }
            if self.allocator.is_free(index) {
                return Err(ConsistencyError::BoundIndexFree { index });
            }
        }

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let index = index as u32;
            let found = self
                .id_to_index
                .get(slot.id as usize)
                .and_then(|entry| entry.index);
            if found != Some(index) {
                return Err(ConsistencyError::BrokenBackMapping {
                    index,
                    id: slot.id,
                    found,
                });
            }
            if self.allocator.is_free(index) {
                return Err(ConsistencyError::FreeIndexOccupied { index, id: slot.id });
            }
        }

        Ok(())
    }

    /// Diagnostic-only wrapper around [`validate`](Self::validate)
    pub fn check_consistency(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!("handle registry is inconsistent: {}", err);
                false
            }
        }
    }

    /// Hand the tables to a background task for disposal
    pub fn release_deferred(self) -> PendingRelease
    where
        T: Send + 'static,
    {
        release_deferred("handle registry", self)
    }

    fn acquire_id(&mut self, index: u32) -> Result<Handle, RegistryError> {
        if let Some(Reverse(id)) = self.free_ids.pop() {
            let entry = &mut self.id_to_index[id as usize];
            entry.generation = entry.generation.checked_add(1).unwrap_or(1);
            entry.index = Some(index);
            return Ok(Handle::new(id, entry.generation));
        }

        let id = u32::try_from(self.id_to_index.len()).map_err(|_| {
            RegistryError::CapacityExceeded {
                requested: self.id_to_index.len() as u64 + 1,
            }
        })?;
        self.id_to_index.push(IdEntry {
            index: Some(index),
            generation: 1,
        });
        Ok(Handle::new(id, 1))
    }

    fn release_id(&mut self, id: u32) {
        self.id_to_index[id as usize].index = None;
        self.free_ids.push(Reverse(id));
    }

    fn resync(&mut self, start: u32, end: u32) {
        for index in start..end {
            if let Some(slot) = &self.slots[index as usize] {
                self.id_to_index[slot.id as usize].index = Some(index);
            }
        }
    }

    fn sync_slot_table(&mut self) {
        let len = self.allocator.len() as usize;
        if self.slots.len() < len {
            self.slots.resize_with(len, || None);
        }
    }

    fn check_allocated(&self, offset: u32, count: u32) -> Result<(), RegistryError> {
        if count == 0 {
            return Err(RegistryError::ZeroCount);
        }
        if offset as u64 + count as u64 > self.allocator.len() as u64 {
            return Err(RegistryError::OutOfBounds {
                offset,
                count,
                len: self.allocator.len(),
            });
        }
        if !self.allocator.is_range_allocated(offset, count) {
            return Err(RegistryError::NotAllocated { offset, count });
        }
        Ok(())
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
