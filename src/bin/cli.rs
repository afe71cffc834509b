// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Substrate CLI

use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Point3;
use polyframe_substrate::benchmark_metrics::{BenchmarkReport, Timer};
use polyframe_substrate::{
    weld_points, weld_polygons, Handle, HandleRegistry, Section, SubstrateConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

#[derive(Parser)]
#[command(name = "polyframe-substrate")]
#[command(about = "Polyframe Substrate - handle registry and vertex welder diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Weld a JSON list of points (or polygons with --polygons)
    Weld {
        /// Input JSON file
        input: String,

        /// Welding tolerance (defaults to the configured epsilon)
        #[arg(short, long)]
        epsilon: Option<f32>,

        /// Treat the input as a list of polygon loops
        #[arg(long)]
        polygons: bool,

        /// Write the welded result as JSON
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Replay a seeded random sequence of registry operations
    Stress {
        /// Number of operations
        #[arg(long, default_value = "10000")]
        ops: usize,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Run a full consistency check every N operations (0 disables)
        #[arg(long, default_value = "100")]
        check_every: usize,

        /// Write the metrics report as JSON
        #[arg(long)]
        report: Option<String>,
    },

    /// Print or write the effective configuration
    Config {
        /// Write to this path instead of printing
        #[arg(long)]
        write: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = SubstrateConfig::load()?;

    match &cli.command {
        Commands::Weld {
            input,
            epsilon,
            polygons,
            output,
        } => {
            let epsilon = epsilon.unwrap_or(config.weld.epsilon);
            weld_command(input, epsilon, *polygons, output.as_deref(), cli.verbose)?;
        }
        Commands::Stress {
            ops,
            seed,
            check_every,
            report,
        } => {
            stress_command(&config, *ops, *seed, *check_every, report.as_deref(), cli.verbose)?;
        }
        Commands::Config { write } => {
            config_command(&config, write.as_deref())?;
        }
        Commands::Version => {
            println!("Polyframe Substrate v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn weld_command(
    input: &str,
    epsilon: f32,
    polygons: bool,
    output: Option<&str>,
    verbose: bool,
) -> Result<()> {
    if !Path::new(input).exists() {
        bail!("Input file not found: {}", input);
    }
    let content =
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?;

    if verbose {
        println!("Welding {} with epsilon {}", input, epsilon);
    }

    let timer = Timer::start();
    let json = if polygons {
        let loops: Vec<Vec<Point3<f32>>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse polygon list from {}", input))?;
        let indexed = weld_polygons(&loops, epsilon)?;
        println!("{}", "Welding complete".green().bold());
        println!("  Input polygons:  {}", loops.len());
        println!("  Kept polygons:   {}", indexed.polygon_count());
        println!("  Unique vertices: {}", indexed.vertex_count());
        serde_json::to_string_pretty(&indexed)?
    } else {
        let points: Vec<Point3<f32>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse point list from {}", input))?;
        let welded = weld_points(&points, epsilon)?;
        println!("{}", "Welding complete".green().bold());
        println!("  Input points:    {}", points.len());
        println!("  Unique vertices: {}", welded.vertices.len());
        println!("  Merged:          {}", welded.duplicate_count());
        serde_json::to_string_pretty(&welded)?
    };
    println!("  Time:            {:.2} ms", timer.elapsed_ms());

    if let Some(output) = output {
        std::fs::write(output, json).with_context(|| format!("Failed to write {}", output))?;
        println!("{} Wrote {}", "Success:".green(), output);
    }

    Ok(())
}

/// A contiguous run of handles as the consumer tracks it
struct TrackedSection {
    offset: u32,
    handles: Vec<Handle>,
}

impl TrackedSection {
    fn section(&self) -> Section {
        Section::new(self.offset, self.handles.len() as u32)
    }
}

struct StressState {
    registry: HandleRegistry<u64>,
    sections: Vec<TrackedSection>,
    tags: AHashMap<Handle, u64>,
    retired: Vec<Handle>,
    next_tag: u64,
}

impl StressState {
    fn new(config: &SubstrateConfig) -> Self {
        Self {
            registry: config.registry.build(),
            sections: Vec::new(),
            tags: AHashMap::new(),
            retired: Vec::new(),
            next_tag: 0,
        }
    }

    fn create(&mut self, count: u32) -> Result<TrackedSection> {
        let tags: Vec<u64> = (0..count).map(|i| self.next_tag + i as u64).collect();
        self.next_tag += count as u64;
        let (offset, handles) = self.registry.create_with(tags.iter().copied())?;
        for (handle, tag) in handles.iter().zip(tags) {
            self.tags.insert(*handle, tag);
        }
        Ok(TrackedSection { offset, handles })
    }

    fn retire(&mut self, handles: impl IntoIterator<Item = Handle>) {
        for handle in handles {
            self.tags.remove(&handle);
            self.retired.push(handle);
        }
    }

    fn step(&mut self, rng: &mut StdRng, report: &mut BenchmarkReport) -> Result<()> {
        let choice = if self.sections.is_empty() {
            0
        } else {
            rng.gen_range(0..6)
        };

        match choice {
            0 => {
                let count = rng.gen_range(1..=16);
                let tracked = report.measure("create", || {
                    let result = self.create(count);
                    let ok = result.is_ok();
                    (result, ok)
                })?;
                self.sections.push(tracked);
            }
            1 => {
                let which = rng.gen_range(0..self.sections.len());
                let tracked = self.sections.swap_remove(which);
                let timer = Timer::start();
                if tracked.handles.len() == 1 {
                    let result = self.registry.free(tracked.handles[0]);
                    report.record("free", timer.elapsed(), result.is_ok());
                    result?;
                } else {
                    let section = tracked.section();
                    let result = self.registry.free_range(section.offset, section.len);
                    report.record("free_range", timer.elapsed(), result.is_ok());
                    result?;
                }
                self.retire(tracked.handles);
            }
            2 => {
                let which = rng.gen_range(0..self.sections.len());
                let len = self.sections[which].handles.len() as u32;
                let start = rng.gen_range(0..len);
                let count = rng.gen_range(0..=len - start);
                let section = self.sections[which].section();

                let timer = Timer::start();
                let result = self.registry.swap_range_to_back(section, start, count);
                report.record("swap_range_to_back", timer.elapsed(), result.is_ok());
                result?;

                let handles = &mut self.sections[which].handles;
                let moved: Vec<Handle> =
                    handles.drain(start as usize..(start + count) as usize).collect();
                handles.extend(moved);
            }
            3 => {
                let which = rng.gen_range(0..self.sections.len());
                let source = self.create(1)?;
                let len = self.sections[which].handles.len() as u32;
                let position = rng.gen_range(0..=len);
                let section = self.sections[which].section();

                let timer = Timer::start();
                let result = self
                    .registry
                    .insert_into_range(section, position, source.offset);
                report.record("insert_into_range", timer.elapsed(), result.is_ok());
                let offset = result?;

                let tracked = &mut self.sections[which];
                tracked.offset = offset;
                tracked.handles.insert(position as usize, source.handles[0]);
            }
            4 => {
                let which = rng.gen_range(0..self.sections.len());
                let len = self.sections[which].handles.len() as u32;
                let start = rng.gen_range(0..len);
                let count = rng.gen_range(1..=len - start);
                let section = self.sections[which].section();

                let timer = Timer::start();
                let result = self
                    .registry
                    .remove_range(section.offset, section.len, start, count);
                report.record("remove_range", timer.elapsed(), result.is_ok());
                result?;

                let removed: Vec<Handle> = self.sections[which]
                    .handles
                    .drain(start as usize..(start + count) as usize)
                    .collect();
                self.retire(removed);
                if self.sections[which].handles.is_empty() {
                    self.sections.swap_remove(which);
                }
            }
            _ => {
                if let Some(&handle) = self.retired.get(rng.gen_range(0..self.retired.len().max(1))) {
                    let resolved = report.measure("resolve_stale", || {
                        let resolved = self.registry.resolve(handle);
                        (resolved, resolved.is_none())
                    });
                    if resolved.is_some() {
                        bail!("retired handle {} still resolves", handle);
                    }
                }
            }
        }
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        self.registry
            .validate()
            .context("registry failed its consistency check")?;
        for tracked in &self.sections {
            for (i, handle) in tracked.handles.iter().enumerate() {
                let expected = tracked.offset + i as u32;
                if self.registry.resolve(*handle) != Some(expected) {
                    bail!(
                        "handle {} resolves to {:?}, expected slot {}",
                        handle,
                        self.registry.resolve(*handle),
                        expected
                    );
                }
                if self.registry.get(*handle) != self.tags.get(handle) {
                    bail!("handle {} lost its payload", handle);
                }
            }
        }
        Ok(())
    }
}

fn stress_command(
    config: &SubstrateConfig,
    ops: usize,
    seed: u64,
    check_every: usize,
    report_path: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = StressState::new(config);
    let mut report = BenchmarkReport::new(format!("REGISTRY STRESS - seed {}", seed));

    let progress = ProgressBar::new(ops as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let timer = Timer::start();
    for op in 0..ops {
        state
            .step(&mut rng, &mut report)
            .with_context(|| format!("operation {} failed", op))?;
        if check_every > 0 && (op + 1) % check_every == 0 {
            state
                .verify()
                .with_context(|| format!("verification after operation {} failed", op))?;
        }
        progress.inc(1);
    }
    state.verify().context("final verification failed")?;
    progress.finish_and_clear();

    println!(
        "{} {} operations in {:.2} ms",
        "Consistent:".green().bold(),
        ops,
        timer.elapsed_ms()
    );
    if verbose {
        println!("  Live handles:   {}", state.registry.len());
        println!("  Ids minted:     {}", state.registry.id_capacity());
        println!("  Index space:    {}", state.registry.index_space_len());
        println!("  Free spans:     {}", state.registry.allocator().free_span_count());
    }
    report.print_report();

    if let Some(path) = report_path {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write {}", path))?;
        println!("{} Wrote {}", "Success:".green(), path);
    }

    let pending = state.registry.release_deferred();
    let elapsed = pending.wait();
    if verbose {
        println!("  Released in {:.2?}", elapsed);
    }

    Ok(())
}

fn config_command(config: &SubstrateConfig, write: Option<&str>) -> Result<()> {
    match write {
        Some(path) => {
            config.save(path)?;
            println!("{} Wrote {}", "Success:".green(), path);
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}
