// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Handle registry module - stable handles over compactable slot ranges

mod handle;
mod range_allocator;
#[allow(clippy::module_inception)]
mod registry;

pub use handle::{Handle, HandleStatus, Section};
pub use range_allocator::{RangeAllocator, MAX_INDEX_SPACE};
pub use registry::HandleRegistry;
