//! Config file watcher for hot-reload support
//!
//! Watches the config file and the mapping files it names. Every change
//! reloads the config; changes to a mapping file are flagged so the caller
//! rebuilds the mapping table even when the config itself is unchanged.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Delay before reloading so editors can finish writing
const DEBOUNCE: Duration = Duration::from_millis(100);

/// A reloaded configuration
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub config: AppConfig,
    /// A mapping file (not the config file) triggered the reload
    pub mapping_files_changed: bool,
}

/// Config watcher that monitors file changes and sends reload notifications
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<ConfigUpdate>,
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl ConfigWatcher {
    /// Create a new config watcher for the specified file
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<(Self, Arc<AppConfig>)> {
        let config_path = config_path.into();
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let mapping_files: Vec<PathBuf> = initial_config
            .watched_files()
            .iter()
            .map(|p| canonical(p))
            .collect();
        let tracked = mapping_files.clone();
        let reload_path = config_path.clone();

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_)) {
                    return;
                }
                debug!("Watched file modified: {:?}", event.paths);

                let mapping_files_changed = event
                    .paths
                    .iter()
                    .any(|p| tracked.iter().any(|m| *m == canonical(p)));
                let config_path = reload_path.clone();
                let tx = tx.clone();

                runtime_handle.spawn(async move {
                    tokio::time::sleep(DEBOUNCE).await;

                    match AppConfig::load(&config_path).await {
                        Ok(config) => {
                            info!("Configuration reloaded successfully");
                            let update = ConfigUpdate {
                                config,
                                mapping_files_changed,
                            };
                            if let Err(e) = tx.send(update).await {
                                error!("Failed to send config update: {}", e);
                            }
                        }
                        Err(e) => warn!("Failed to reload config (keeping old config): {:#}", e),
                    }
                });
            }
            Err(e) => error!("Watch error: {}", e),
        })?;

        watcher
            .watch(&config_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path.display()))?;

        for file in &mapping_files {
            // The learned overlay may not exist yet
            if let Err(e) = watcher.watch(file, RecursiveMode::NonRecursive) {
                warn!("Not watching mapping file {}: {}", file.display(), e);
            }
        }

        info!("Config file watcher started for: {}", config_path.display());

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            Arc::new(initial_config),
        ))
    }

    /// Wait for the next config update
    /// Returns None if the watcher has been closed
    pub async fn next_update(&mut self) -> Option<ConfigUpdate> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_reloads_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "engine:\n  pulse_ms: 120\n")?;

        let (mut watcher, config) = ConfigWatcher::new(&config_path).await?;
        assert_eq!(config.engine.pulse_ms, 120);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "engine:\n  pulse_ms: 250\n")?;

        let update = tokio::time::timeout(Duration::from_secs(2), watcher.next_update())
            .await?
            .expect("watcher channel closed");
        assert_eq!(update.config.engine.pulse_ms, 250);
        assert!(!update.mapping_files_changed);

        Ok(())
    }

    #[tokio::test]
    async fn test_mapping_file_change_is_flagged() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        let map_path = temp_dir.path().join("map.json");
        fs::write(&config_path, "mappings:\n  base: map.json\n")?;
        fs::write(&map_path, "[]")?;

        let (mut watcher, config) = ConfigWatcher::new(&config_path).await?;
        assert_eq!(config.mappings.base, map_path);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&map_path, r#"[{"type":"cc","ch":1,"code":7,"target":"fader1"}]"#)?;

        let update = tokio::time::timeout(Duration::from_secs(2), watcher.next_update())
            .await?
            .expect("watcher channel closed");
        assert!(update.mapping_files_changed);

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_initial_config_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "engine:\n  pulse_ms: 0\n")?;

        assert!(ConfigWatcher::new(&config_path).await.is_err());
        Ok(())
    }
}
