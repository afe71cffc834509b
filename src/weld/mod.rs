// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Vertex welding module - spatial-hash deduplication of nearby points

mod batch;
mod hash;
mod welder;

pub use batch::{weld_batches_parallel, weld_points, weld_polygons, IndexedPolygons, WeldedPoints};
pub use hash::{CellCoord, Neighborhood, CELL_SIZE_FACTOR, HASH_TABLE_SIZE};
pub use welder::{VertexWelder, MAX_VERTEX_COUNT};
