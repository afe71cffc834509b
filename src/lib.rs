// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Substrate
//!
//! Memory and identity primitives for the Polyframe CSG engine: a
//! generational handle registry whose slots can be compacted and reordered
//! in contiguous ranges, and a spatial-hash vertex welder that collapses
//! nearly coincident points into shared indices.

pub mod benchmark_metrics;
pub mod config;
pub mod error;
pub mod registry;
pub mod release;
pub mod weld;

pub use config::{RegistryConfig, SubstrateConfig, WeldConfig, DEFAULT_WELD_EPSILON};
pub use error::{ConsistencyError, RegistryError, WeldError};
pub use registry::{Handle, HandleRegistry, HandleStatus, RangeAllocator, Section};
pub use release::{release_deferred, PendingRelease};
pub use weld::{weld_points, weld_polygons, IndexedPolygons, VertexWelder, WeldedPoints};

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_handles_survive_compaction() {
        let mut registry: HandleRegistry<Point3<f32>> = HandleRegistry::new();
        let mut welder = VertexWelder::new(DEFAULT_WELD_EPSILON).unwrap();

        let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let (_, handles) = registry.create_with(points.iter().copied()).unwrap();
        for handle in &handles {
            welder.get_or_add(*registry.get(*handle).unwrap()).unwrap();
        }

        registry.swap_range_to_back(Section::new(0, 2), 0, 1).unwrap();
        assert_eq!(registry.resolve(handles[0]), Some(1));
        assert_eq!(welder.index_of(registry.get(handles[1]).unwrap()), Some(1));
    }
}
