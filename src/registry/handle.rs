// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Stable external handles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque `(id, generation)` pair identifying an entity independent of
/// where its slot currently lives.
///
/// Generations start at 1, so `Handle::default()` never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Handle {
    pub id: u32,
    pub generation: u32,
}

impl Handle {
    pub const fn new(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.id, self.generation)
    }
}

/// What the registry currently knows about a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    /// Bound to the given slot index
    Live(u32),
    /// Freed in its current generation and not reused yet
    Freed,
    /// The id has been reused (or never reached this generation)
    Stale,
    /// The id was never minted by this registry
    Unknown,
}

impl HandleStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, HandleStatus::Live(_))
    }
}

/// A contiguous span of slots owned by one logical group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Section {
    pub offset: u32,
    pub len: u32,
}

impl Section {
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// One past the last slot, clamped to the `u32` index space
    pub const fn end(&self) -> u32 {
        self.offset.saturating_add(self.len)
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn contains(&self, index: u32) -> bool {
        index >= self.offset && (index as u64) < self.offset as u64 + self.len as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handle_is_generation_zero() {
        let handle = Handle::default();
        assert_eq!(handle.generation, 0);
        assert_eq!(handle.to_string(), "#0v0");
    }

    #[test]
    fn test_section_bounds() {
        let section = Section::new(4, 3);
        assert_eq!(section.end(), 7);
        assert!(section.contains(4));
        assert!(section.contains(6));
        assert!(!section.contains(7));
        assert!(!section.contains(3));
        assert!(Section::new(9, 0).is_empty());
    }

    #[test]
    fn test_section_near_index_space_end() {
        let section = Section::new(u32::MAX - 1, 10);
        assert_eq!(section.end(), u32::MAX);
        assert!(section.contains(u32::MAX));
        assert!(section.contains(u32::MAX - 1));
        assert!(!section.contains(0));
    }
}
