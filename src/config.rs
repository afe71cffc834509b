// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Substrate configuration system

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::registry::HandleRegistry;
use crate::weld::{VertexWelder, MAX_VERTEX_COUNT};

/// Config file picked up by [`SubstrateConfig::load`]
pub const CONFIG_FILE_NAME: &str = "substrate.toml";

/// Welding tolerance used when nothing else is configured
pub const DEFAULT_WELD_EPSILON: f32 = 0.001;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    pub weld: WeldConfig,
    pub registry: RegistryConfig,
}

/// Vertex welder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeldConfig {
    /// Points closer than this are merged
    pub epsilon: f32,
    /// Vertices reserved up front
    pub initial_capacity: usize,
}

impl Default for WeldConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_WELD_EPSILON,
            initial_capacity: 0,
        }
    }
}

impl WeldConfig {
    /// Construct a welder with these settings
    pub fn build(&self) -> Result<VertexWelder> {
        VertexWelder::with_capacity(self.epsilon, self.initial_capacity)
            .context("Failed to build vertex welder")
    }
}

/// Handle registry settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Slots reserved up front
    pub initial_capacity: usize,
}

impl RegistryConfig {
    pub fn build<T>(&self) -> HandleRegistry<T> {
        HandleRegistry::with_capacity(self.initial_capacity)
    }
}

impl SubstrateConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: SubstrateConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from(CONFIG_FILE_NAME).exists() {
            Self::from_file(CONFIG_FILE_NAME)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SUBSTRATE_*` overrides fetched through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(epsilon) = lookup("SUBSTRATE_WELD_EPSILON") {
            self.weld.epsilon = epsilon
                .trim()
                .parse()
                .with_context(|| format!("Invalid SUBSTRATE_WELD_EPSILON: {epsilon:?}"))?;
        }

        if let Some(capacity) = lookup("SUBSTRATE_WELD_CAPACITY") {
            self.weld.initial_capacity = capacity
                .trim()
                .parse()
                .with_context(|| format!("Invalid SUBSTRATE_WELD_CAPACITY: {capacity:?}"))?;
        }

        if let Some(capacity) = lookup("SUBSTRATE_REGISTRY_CAPACITY") {
            self.registry.initial_capacity = capacity
                .trim()
                .parse()
                .with_context(|| format!("Invalid SUBSTRATE_REGISTRY_CAPACITY: {capacity:?}"))?;
        }

        Ok(())
    }

    /// Reject values the components would refuse at construction
    pub fn validate(&self) -> Result<()> {
        if !(self.weld.epsilon.is_finite() && self.weld.epsilon > 0.0) {
            bail!("weld.epsilon must be positive and finite, got {}", self.weld.epsilon);
        }
        if self.weld.initial_capacity > MAX_VERTEX_COUNT {
            bail!(
                "weld.initial_capacity {} exceeds the vertex limit of {}",
                self.weld.initial_capacity,
                MAX_VERTEX_COUNT
            );
        }
        if self.registry.initial_capacity > u32::MAX as usize {
            bail!(
                "registry.initial_capacity {} exceeds the index space",
                self.registry.initial_capacity
            );
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
