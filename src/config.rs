//! Configuration management for polymorph

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::composite::CompositeMode;
use crate::embedding::EmbeddingConfig;
use crate::render::RenderOptions;
use crate::session::RenderSettings;
use crate::warp::WarpParams;

/// Compositing configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CompositeConfig {
    #[serde(default)]
    pub mode: CompositeMode,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Multi-line weighting parameters
    #[serde(default)]
    pub warp: WarpParams,

    /// Sampling grid and interpolation
    #[serde(default)]
    pub render: RenderOptions,

    #[serde(default)]
    pub composite: CompositeConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            config
                .validate()
                .with_context(|| format!("Invalid configuration in {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Check the warp parameters and render options
    pub fn validate(&self) -> crate::Result<()> {
        self.warp.validate()?;
        self.render.validate()
    }

    /// Parameters for a [`crate::MorphSession`]
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            warp: self.warp,
            render: self.render,
            composite: self.composite.mode,
        }
    }
}
