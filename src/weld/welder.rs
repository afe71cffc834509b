// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Spatial-hash vertex welder
//!
//! Points live in a flat arena. Each of the `HASH_TABLE_SIZE` buckets holds
//! the most recently added point whose cell hashes there, and `chain[i]`
//! links point `i` to the previous point of the same bucket. Lookups probe
//! the 27 cells around the query and keep the closest point within epsilon.

use super::hash::{CellCoord, CELL_SIZE_FACTOR, HASH_TABLE_SIZE};
use crate::error::WeldError;
use crate::release::{release_deferred, PendingRelease};
use log::{debug, trace};
use nalgebra::Point3;
use std::num::NonZeroU16;
use std::ops::Index;

/// Hard cap on welded points per instance; chain links are 16-bit
pub const MAX_VERTEX_COUNT: usize = 65_000;

/// Link to a point in the arena, stored as `index + 1` so that `None` marks
/// the end of a chain without costing extra space
type Link = Option<NonZeroU16>;

fn link_to(index: usize) -> Link {
    NonZeroU16::new((index + 1) as u16)
}

fn link_index(link: NonZeroU16) -> usize {
    link.get() as usize - 1
}

/// Deduplicates 3D points that lie within `epsilon` of each other
#[derive(Debug, Clone)]
pub struct VertexWelder {
    epsilon: f32,
    epsilon_sq: f32,
    cell_size: f32,
    vertices: Vec<Point3<f32>>,
    chain: Vec<Link>,
    buckets: Box<[Link]>,
}

impl VertexWelder {
    pub fn new(epsilon: f32) -> Result<Self, WeldError> {
        Self::with_capacity(epsilon, 0)
    }

    pub fn with_capacity(epsilon: f32, capacity: usize) -> Result<Self, WeldError> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(WeldError::InvalidEpsilon(epsilon));
        }
        if capacity > MAX_VERTEX_COUNT {
            return Err(WeldError::CapacityExceeded {
                requested: capacity,
                max: MAX_VERTEX_COUNT,
            });
        }
        Ok(Self {
            epsilon,
            epsilon_sq: epsilon * epsilon,
            cell_size: epsilon * CELL_SIZE_FACTOR,
            vertices: Vec::with_capacity(capacity),
            chain: Vec::with_capacity(capacity),
            buckets: vec![None; HASH_TABLE_SIZE].into_boxed_slice(),
        })
    }

    /// Build a welder already holding the unique points of `points`
    pub fn from_points(epsilon: f32, points: &[Point3<f32>]) -> Result<Self, WeldError> {
        let mut welder = Self::with_capacity(epsilon, points.len().min(MAX_VERTEX_COUNT))?;
        welder.extend_unique(points)?;
        Ok(welder)
    }

    /// Index of the closest stored point within epsilon, adding `point` if
    /// there is none
    pub fn get_or_add(&mut self, point: Point3<f32>) -> Result<u16, WeldError> {
        let cell = CellCoord::of(&point, self.cell_size);
        if let Some(index) = self.find_closest(&point, cell) {
            return Ok(index as u16);
        }
        if self.vertices.len() >= MAX_VERTEX_COUNT {
            return Err(WeldError::CapacityExceeded {
                requested: self.vertices.len() + 1,
                max: MAX_VERTEX_COUNT,
            });
        }
        Ok(self.push(point, cell))
    }

    /// Same as [`get_or_add`](Self::get_or_add) but never allocates; the
    /// caller must have reserved room with
    /// [`reserve_additional`](Self::reserve_additional)
    pub fn add_no_resize(&mut self, point: Point3<f32>) -> Result<u16, WeldError> {
        let cell = CellCoord::of(&point, self.cell_size);
        if let Some(index) = self.find_closest(&point, cell) {
            return Ok(index as u16);
        }
        let len = self.vertices.len();
        if len >= MAX_VERTEX_COUNT {
            return Err(WeldError::CapacityExceeded {
                requested: len + 1,
                max: MAX_VERTEX_COUNT,
            });
        }
        if len >= self.capacity() {
            return Err(WeldError::InsufficientReservation {
                len,
                capacity: self.capacity(),
            });
        }
        Ok(self.push(point, cell))
    }

    /// Overwrite the stored point matching `point` with `point` itself.
    ///
    /// The point moves to the chain of its new bucket, so repeated snaps
    /// keep it reachable from every lookup within epsilon.
    pub fn replace_if_exists(&mut self, point: Point3<f32>) -> Option<u16> {
        let cell = CellCoord::of(&point, self.cell_size);
        let index = self.find_closest(&point, cell)?;
        let old_bucket = CellCoord::of(&self.vertices[index], self.cell_size).bucket();
        let new_bucket = cell.bucket();
        self.vertices[index] = point;
        if old_bucket != new_bucket {
            self.unlink(index, old_bucket);
            self.chain[index] = self.buckets[new_bucket];
            self.buckets[new_bucket] = link_to(index);
            trace!("welder moved point {} to bucket {}", index, new_bucket);
        }
        Some(index as u16)
    }

    /// Lookup without inserting
    pub fn index_of(&self, point: &Point3<f32>) -> Option<u16> {
        let cell = CellCoord::of(point, self.cell_size);
        self.find_closest(point, cell).map(|index| index as u16)
    }

    /// Weld every point in order, returning the index each one mapped to
    pub fn extend_unique(&mut self, points: &[Point3<f32>]) -> Result<Vec<u16>, WeldError> {
        self.reserve_additional(points.len().min(MAX_VERTEX_COUNT - self.vertices.len()))?;
        points
            .iter()
            .map(|point| self.get_or_add(*point))
            .collect()
    }

    /// Make room for `additional` more points, growing to
    /// `len + 2 * additional` when the current capacity is too small
    pub fn reserve_additional(&mut self, additional: usize) -> Result<(), WeldError> {
        let len = self.vertices.len();
        let required = len.saturating_add(additional);
        if required > MAX_VERTEX_COUNT {
            return Err(WeldError::CapacityExceeded {
                requested: required,
                max: MAX_VERTEX_COUNT,
            });
        }
        if required <= self.capacity() {
            return Ok(());
        }

        let target = len
            .saturating_add(additional.saturating_mul(2))
            .min(MAX_VERTEX_COUNT);
        self.vertices.reserve_exact(target - len);
        self.chain.reserve_exact(target - len);
        debug!("welder arena grown to {} points", self.capacity());
        Ok(())
    }

    /// Forget every point but keep the arena allocation
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.chain.clear();
        self.buckets.fill(None);
    }

    pub fn get(&self, index: u16) -> Option<&Point3<f32>> {
        self.vertices.get(index as usize)
    }

    pub fn as_slice(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Points that fit without reallocating
    pub fn capacity(&self) -> usize {
        self.vertices.capacity().min(self.chain.capacity())
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn into_vec(self) -> Vec<Point3<f32>> {
        self.vertices
    }

    /// Hand the arena to a background task for disposal
    pub fn release_deferred(self) -> PendingRelease {
        release_deferred("vertex welder", self)
    }

    fn find_closest(&self, point: &Point3<f32>, cell: CellCoord) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for &bucket in cell.neighborhood().as_slice() {
            let mut link = self.buckets[bucket as usize];
            while let Some(current) = link {
                let index = link_index(current);
                let distance_sq = (self.vertices[index] - *point).norm_squared();
                if distance_sq < self.epsilon_sq
                    && best.map_or(true, |(_, closest)| distance_sq < closest)
                {
                    best = Some((index, distance_sq));
                }
                link = self.chain[index];
            }
        }
        best.map(|(index, _)| index)
    }

    /// Remove `index` from the chain of `bucket`
    fn unlink(&mut self, index: usize, bucket: usize) {
        let target = link_to(index);
        if self.buckets[bucket] == target {
            self.buckets[bucket] = self.chain[index];
            return;
        }
        let mut link = self.buckets[bucket];
        while let Some(current) = link {
            let current = link_index(current);
            if self.chain[current] == target {
                self.chain[current] = self.chain[index];
                return;
            }
            link = self.chain[current];
        }
    }

    fn push(&mut self, point: Point3<f32>, cell: CellCoord) -> u16 {
        let index = self.vertices.len();
        let bucket = cell.bucket();
        self.vertices.push(point);
        self.chain.push(self.buckets[bucket]);
        self.buckets[bucket] = link_to(index);
        trace!("welder added point {} in bucket {}", index, bucket);
        index as u16
    }
}

impl Index<u16> for VertexWelder {
    type Output = Point3<f32>;

    fn index(&self, index: u16) -> &Self::Output {
        &self.vertices[index as usize]
    }
}
