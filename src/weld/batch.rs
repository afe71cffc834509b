// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Welding helpers for mesh builders

use super::{VertexWelder, MAX_VERTEX_COUNT};
use crate::error::WeldError;
use log::trace;
use nalgebra::Point3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Unique points plus, for every input point, the index it welded to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeldedPoints {
    pub vertices: Vec<Point3<f32>>,
    pub remap: Vec<u16>,
}

impl WeldedPoints {
    /// Input points that merged into an earlier one
    pub fn duplicate_count(&self) -> usize {
        self.remap.len() - self.vertices.len()
    }
}

/// Polygon loops expressed as indices into a shared welded vertex list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexedPolygons {
    pub vertices: Vec<Point3<f32>>,
    pub polygons: Vec<Vec<u16>>,
}

impl IndexedPolygons {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }
}

/// Weld a flat list of points
pub fn weld_points(points: &[Point3<f32>], epsilon: f32) -> Result<WeldedPoints, WeldError> {
    let mut welder = VertexWelder::with_capacity(epsilon, points.len().min(MAX_VERTEX_COUNT))?;
    let remap = welder.extend_unique(points)?;
    Ok(WeldedPoints {
        vertices: welder.into_vec(),
        remap,
    })
}

/// Stream polygon loops through one welder and build index buffers.
///
/// Consecutive indices that weld together collapse into one, and loops left
/// with fewer than three distinct indices are dropped.
pub fn weld_polygons<P>(polygons: &[P], epsilon: f32) -> Result<IndexedPolygons, WeldError>
where
    P: AsRef<[Point3<f32>]>,
{
    let total: usize = polygons.iter().map(|polygon| polygon.as_ref().len()).sum();
    let mut welder = VertexWelder::with_capacity(epsilon, total.min(MAX_VERTEX_COUNT))?;
    let mut indexed = Vec::with_capacity(polygons.len());

    for polygon in polygons {
        let points = polygon.as_ref();
        let mut indices: Vec<u16> = Vec::with_capacity(points.len());
        for point in points {
            let index = welder.get_or_add(*point)?;
            if indices.last() != Some(&index) {
                indices.push(index);
            }
        }
        while indices.len() > 1 && indices.first() == indices.last() {
            indices.pop();
        }

        let mut distinct = indices.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 3 {
            trace!("dropping degenerate polygon with {} points", points.len());
            continue;
        }
        indexed.push(indices);
    }

    Ok(IndexedPolygons {
        vertices: welder.into_vec(),
        polygons: indexed,
    })
}

/// Weld independent batches in parallel, one welder per batch.
///
/// Results come back in batch order; indices are local to each batch.
pub fn weld_batches_parallel<B>(batches: &[B], epsilon: f32) -> Result<Vec<WeldedPoints>, WeldError>
where
    B: AsRef<[Point3<f32>]> + Sync,
{
    batches
        .par_iter()
        .map(|batch| weld_points(batch.as_ref(), epsilon))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(offset: f32) -> Vec<Point3<f32>> {
        vec![
            Point3::new(offset, 0.0, 0.0),
            Point3::new(offset + 1.0, 0.0, 0.0),
            Point3::new(offset + 1.0, 1.0, 0.0),
            Point3::new(offset, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_weld_points_remap() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0002),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let welded = weld_points(&points, 0.001).unwrap();
        assert_eq!(welded.vertices.len(), 2);
        assert_eq!(welded.remap, vec![0, 0, 1]);
        assert_eq!(welded.duplicate_count(), 1);
    }

    #[test]
    fn test_adjacent_polygons_share_vertices() {
        let polygons = vec![square(0.0), square(1.0)];
        let indexed = weld_polygons(&polygons, 0.001).unwrap();

        assert_eq!(indexed.polygon_count(), 2);
        assert_eq!(indexed.vertex_count(), 6);
        assert_eq!(indexed.polygons[0], vec![0, 1, 2, 3]);
        assert_eq!(indexed.polygons[1], vec![1, 4, 5, 2]);
    }

    #[test]
    fn test_degenerate_polygon_dropped() {
        let sliver = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0001),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
        ];
        let indexed = weld_polygons(&[sliver], 0.001).unwrap();
        assert_eq!(indexed.polygon_count(), 0);
        assert_eq!(indexed.vertex_count(), 2);
    }

    #[test]
    fn test_parallel_batches_match_sequential() {
        let batches: Vec<Vec<Point3<f32>>> = (0..8)
            .map(|batch| {
                (0..200)
                    .map(|i| Point3::new((i % 50) as f32 * 0.1, batch as f32, 0.0))
                    .collect()
            })
            .collect();

        let parallel = weld_batches_parallel(&batches, 0.001).unwrap();
        assert_eq!(parallel.len(), batches.len());
        for (batch, welded) in batches.iter().zip(&parallel) {
            let sequential = weld_points(batch, 0.001).unwrap();
            assert_eq!(welded.remap, sequential.remap);
            assert_eq!(welded.vertices.len(), 50);
        }
    }
}
