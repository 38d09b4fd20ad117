//! Configuration management for the board visualizer
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration file.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub use watcher::ConfigWatcher;

use crate::pipeline::PipelineOptions;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mappings: MappingsConfig,
    /// Diagram geometry file; without it every target is accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<PathBuf>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi: Option<MidiConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamConfig>,
}

/// Mapping sources: the base file and the optional learned overlay
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MappingsConfig {
    #[serde(default = "default_base_mappings")]
    pub base: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned: Option<PathBuf>,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            base: default_base_mappings(),
            learned: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Note-on light pulse length
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pulse_ms: default_pulse_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Window in which an identical event from another transport is dropped
    #[serde(default = "default_dedup_ms")]
    pub dedup_ms: u64,
    /// Record events produced by playback as well
    #[serde(default)]
    pub capture_playback: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dedup_ms: default_dedup_ms(),
            capture_playback: false,
        }
    }
}

/// MIDI input port configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Case-insensitive substring of the input port name
    pub input: String,
}

/// WebSocket stream configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamConfig {
    pub url: String,
    #[serde(default = "default_liveness_ms")]
    pub liveness_ms: u64,
}

impl StreamConfig {
    pub fn liveness(&self) -> Duration {
        Duration::from_millis(self.liveness_ms)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.resolve_paths(path.parent().unwrap_or_else(|| Path::new("")));
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.mappings.base.as_os_str().is_empty() {
            anyhow::bail!("mappings.base cannot be empty");
        }
        if self.engine.pulse_ms == 0 {
            anyhow::bail!("engine.pulse_ms must be greater than 0");
        }

        if let Some(midi) = &self.midi {
            if midi.input.trim().is_empty() {
                anyhow::bail!("midi.input cannot be empty");
            }
        }

        if let Some(stream) = &self.stream {
            // Built without a TLS backend
            if stream.url.starts_with("wss://") {
                anyhow::bail!("stream.url: wss:// is not supported, use a plain ws:// source (got '{}')", stream.url);
            }
            if !stream.url.starts_with("ws://") {
                anyhow::bail!("stream.url must start with ws:// (got '{}')", stream.url);
            }
            if stream.liveness_ms == 0 {
                anyhow::bail!("stream.liveness_ms must be greater than 0");
            }
        }

        Ok(())
    }

    /// Make relative file paths relative to the config file's directory
    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };

        resolve(&mut self.mappings.base);
        if let Some(learned) = self.mappings.learned.as_mut() {
            resolve(learned);
        }
        if let Some(diagram) = self.diagram.as_mut() {
            resolve(diagram);
        }
    }

    /// Pipeline options derived from the engine and recorder sections
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            pulse: Duration::from_millis(self.engine.pulse_ms),
            dedup_ms: self.recorder.dedup_ms,
            capture_playback: self.recorder.capture_playback,
        }
    }

    /// Whether a reload to `other` needs the mapping table rebuilt
    pub fn mappings_changed(&self, other: &AppConfig) -> bool {
        self.mappings != other.mappings
    }

    /// Files whose changes should trigger a reload, config file excluded
    pub fn watched_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.mappings.base.clone()];
        files.extend(self.mappings.learned.clone());
        files
    }
}

// Default value functions
fn default_base_mappings() -> PathBuf { PathBuf::from("flx6_map.json") }
fn default_pulse_ms() -> u64 { 120 }
fn default_dedup_ms() -> u64 { 6 }
fn default_liveness_ms() -> u64 { 10_000 }
