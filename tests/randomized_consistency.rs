// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Seeded random operation sequences checked against a simple model

use ahash::AHashMap;
use anyhow::{ensure, Result};
use polyframe_substrate::{Handle, HandleRegistry, Section};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sections as a mesh builder would track them
struct Model {
    sections: Vec<(u32, Vec<Handle>)>,
    payloads: AHashMap<Handle, u64>,
    dead: Vec<Handle>,
    next: u64,
}

impl Model {
    fn new() -> Self {
        Self {
            sections: Vec::new(),
            payloads: AHashMap::new(),
            dead: Vec::new(),
            next: 0,
        }
    }

    fn create(&mut self, registry: &mut HandleRegistry<u64>, count: u32) -> Result<(u32, Vec<Handle>)> {
        let start = self.next;
        self.next += count as u64;
        let payloads: Vec<u64> = (start..start + count as u64).collect();
        let (offset, handles) = registry.create_with(payloads)?;
        for (i, handle) in handles.iter().enumerate() {
            self.payloads.insert(*handle, start + i as u64);
        }
        Ok((offset, handles))
    }

    fn kill(&mut self, handles: impl IntoIterator<Item = Handle>) {
        for handle in handles {
            self.payloads.remove(&handle);
            self.dead.push(handle);
        }
    }

    fn check(&self, registry: &HandleRegistry<u64>) -> Result<()> {
        registry.validate()?;
        ensure!(registry.len() == self.payloads.len(), "live count mismatch");
        for (offset, handles) in &self.sections {
            for (i, handle) in handles.iter().enumerate() {
                ensure!(
                    registry.resolve(*handle) == Some(offset + i as u32),
                    "{} resolves to {:?}, expected {}",
                    handle,
                    registry.resolve(*handle),
                    offset + i as u32
                );
                ensure!(registry.get(*handle) == self.payloads.get(handle));
            }
        }
        for handle in &self.dead {
            ensure!(registry.resolve(*handle).is_none(), "dead handle {} resolves", handle);
        }
        Ok(())
    }
}

fn run(seed: u64, ops: usize) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let mut model = Model::new();

    for _ in 0..ops {
        let op = if model.sections.is_empty() { 0 } else { rng.gen_range(0..5) };
        match op {
            0 => {
                let count = rng.gen_range(1..=12);
                let section = model.create(&mut registry, count)?;
                model.sections.push(section);
            }
            1 => {
                let which = rng.gen_range(0..model.sections.len());
                let (offset, handles) = model.sections.swap_remove(which);
                if handles.len() == 1 {
                    registry.free(handles[0])?;
                } else {
                    registry.free_range(offset, handles.len() as u32)?;
                }
                model.kill(handles);
            }
            2 => {
                let which = rng.gen_range(0..model.sections.len());
                let (offset, handles) = &mut model.sections[which];
                let len = handles.len() as u32;
                let start = rng.gen_range(0..len);
                let count = rng.gen_range(0..=len - start);
                registry.swap_range_to_back(Section::new(*offset, len), start, count)?;
                let moved: Vec<Handle> =
                    handles.drain(start as usize..(start + count) as usize).collect();
                handles.extend(moved);
            }
            3 => {
                let which = rng.gen_range(0..model.sections.len());
                let (source, mut inserted) = model.create(&mut registry, 1)?;
                let (offset, handles) = &mut model.sections[which];
                let len = handles.len() as u32;
                let position = rng.gen_range(0..=len);
                *offset = registry.insert_into_range(Section::new(*offset, len), position, source)?;
                handles.insert(position as usize, inserted.remove(0));
            }
            _ => {
                let which = rng.gen_range(0..model.sections.len());
                let (offset, handles) = &mut model.sections[which];
                let len = handles.len() as u32;
                let start = rng.gen_range(0..len);
                let count = rng.gen_range(1..=len - start);
                registry.remove_range(*offset, len, start, count)?;
                let removed: Vec<Handle> =
                    handles.drain(start as usize..(start + count) as usize).collect();
                let emptied = handles.is_empty();
                model.kill(removed);
                if emptied {
                    model.sections.swap_remove(which);
                }
            }
        }
        model.check(&registry)?;
    }
    Ok(())
}

#[test]
fn test_random_sequences_stay_consistent() -> Result<()> {
    for seed in 0..8 {
        run(seed, 600)?;
    }
    Ok(())
}

#[test]
fn test_long_sequence_stays_consistent() -> Result<()> {
    run(0xfeed_beef, 4000)
}
