// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Uniform grid cells and the fixed bucket hash used by the welder

use nalgebra::Point3;

/// Number of buckets in the welder's hash table (prime)
pub const HASH_TABLE_SIZE: usize = 509;

/// Grid cell edge length as a multiple of the welding epsilon.
///
/// Must stay above 1 so that any point within epsilon of a query lies in the
/// query's cell or one of its 26 neighbours.
pub const CELL_SIZE_FACTOR: f32 = 2.5;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Integer grid coordinate of a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// `floor(component / cell_size)` per axis
    pub fn of(point: &Point3<f32>, cell_size: f32) -> Self {
        Self {
            x: (point.x / cell_size).floor() as i32,
            y: (point.y / cell_size).floor() as i32,
            z: (point.z / cell_size).floor() as i32,
        }
    }

    pub const fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
            z: self.z.wrapping_add(dz),
        }
    }

    /// FNV-style multiplicative mix of x, y, z (in that order), reduced
    /// modulo the table size
    pub fn bucket(&self) -> usize {
        let mut hash = FNV_OFFSET_BASIS;
        for component in [self.x, self.y, self.z] {
            hash ^= component as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        (hash % HASH_TABLE_SIZE as u32) as usize
    }

    /// Distinct buckets of the 3×3×3 block of cells centred on this one
    pub fn neighborhood(&self) -> Neighborhood {
        let mut neighborhood = Neighborhood {
            buckets: [0; 27],
            len: 0,
        };
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    neighborhood.push(self.offset(dx, dy, dz).bucket() as u16);
                }
            }
        }
        neighborhood
    }
}

/// Up to 27 bucket indices, each listed once
#[derive(Debug, Clone, Copy)]
pub struct Neighborhood {
    buckets: [u16; 27],
    len: usize,
}

impl Neighborhood {
    fn push(&mut self, bucket: u16) {
        if !self.buckets[..self.len].contains(&bucket) {
            self.buckets[self.len] = bucket;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.buckets[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_floors_negative_components() {
        let cell = CellCoord::of(&Point3::new(-0.1, 0.1, 2.6), 1.0);
        assert_eq!(cell, CellCoord::new(-1, 0, 2));
    }

    #[test]
    fn test_bucket_is_in_table() {
        for x in -20..20 {
            for y in -3..3 {
                let bucket = CellCoord::new(x, y, x * y).bucket();
                assert!(bucket < HASH_TABLE_SIZE);
            }
        }
    }

    #[test]
    fn test_bucket_depends_on_axis_order() {
        let a = CellCoord::new(1, 2, 3).bucket();
        let b = CellCoord::new(3, 2, 1).bucket();
        assert_ne!(a, b);
    }

    #[test]
    fn test_neighborhood_lists_each_bucket_once() {
        let neighborhood = CellCoord::new(4, -7, 11).neighborhood();
        let slice = neighborhood.as_slice();
        assert!(!neighborhood.is_empty());
        assert!(slice.len() <= 27);
        for (i, bucket) in slice.iter().enumerate() {
            assert!(!slice[i + 1..].contains(bucket));
        }
        assert!(slice.contains(&(CellCoord::new(4, -7, 11).bucket() as u16)));
    }
}
