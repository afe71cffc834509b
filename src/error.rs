// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for the handle registry and the vertex welder
//!
//! Every variant here is a caller contract violation. Expected negative
//! outcomes (a stale handle passed to `resolve`, no welding match) are
//! reported through `Option` instead.

use crate::registry::Handle;

/// Contract violations raised by the range allocator and handle registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("allocation count must be positive")]
    ZeroCount,

    #[error("range [{offset}, {offset}+{count}) exceeds index space of {len} slots")]
    OutOfBounds { offset: u32, count: u32, len: u32 },

    #[error("range [{offset}, {offset}+{count}) overlaps a span that is already free")]
    DoubleFree { offset: u32, count: u32 },

    #[error("range [{offset}, {offset}+{count}) is not fully allocated")]
    NotAllocated { offset: u32, count: u32 },

    #[error("sub-range [{start}, {start}+{count}) exceeds section length {len}")]
    SubRangeOutOfSection { start: u32, count: u32, len: u32 },

    #[error("insert position {position} exceeds section length {len}")]
    InsertPositionOutOfSection { position: u32, len: u32 },

    #[error("source slot {source_index} lies inside section [{offset}, {offset}+{len})")]
    SourceInsideSection {
        source_index: u32,
        offset: u32,
        len: u32,
    },

    #[error("slot {0} is not bound to any handle")]
    EmptySlot(u32),

    #[error("handle {0} is stale or unknown")]
    InvalidHandle(Handle),

    #[error("index space exhausted: {requested} slots requested")]
    CapacityExceeded { requested: u64 },
}

/// Contract violations raised by the vertex welder
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeldError {
    #[error("welder capacity exceeded: {requested} vertices requested, maximum is {max}")]
    CapacityExceeded { requested: usize, max: usize },

    #[error("no reserved capacity left ({len} of {capacity} used); call reserve_additional first")]
    InsufficientReservation { len: usize, capacity: usize },

    #[error("position epsilon must be finite and positive, got {0}")]
    InvalidEpsilon(f32),
}

/// First broken invariant found by a full registry consistency check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("id {id} has no index but is missing from the free list")]
    UnboundIdNotFree { id: u32 },

    #[error("id {id} is in the free list but is bound to index {index}")]
    FreeIdBound { id: u32, index: u32 },

    #[error("id {id} appears in the free list more than once")]
    DuplicateFreeId { id: u32 },

    #[error("free list holds id {id} beyond the id table of {len} entries")]
    FreeIdOutOfRange { id: u32, len: u32 },

    #[error("id {id} maps to index {index}, which maps back to {found:?}")]
    BrokenRoundTrip {
        id: u32,
        index: u32,
        found: Option<u32>,
    },

    #[error("index {index} maps to id {id}, which maps back to {found:?}")]
    BrokenBackMapping {
        index: u32,
        id: u32,
        found: Option<u32>,
    },

    #[error("index {index} is bound but the allocator reports it free")]
    BoundIndexFree { index: u32 },

    #[error("index {index} is free but still holds id {id}")]
    FreeIndexOccupied { index: u32, id: u32 },

    #[error("free span [{offset}, {offset}+{count}) is empty, unsorted, uncoalesced or out of bounds")]
    MalformedFreeSpan { offset: u32, count: u32 },
}
