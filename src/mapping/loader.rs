//! Mapping file loading and learned-mapping persistence

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use super::entry::{MappingDefinition, MappingEntry};
use super::table::MappingTable;

/// Parse a JSON array of mapping definitions.
///
/// Definitions that cannot become an entry (no target, unknown type) are
/// skipped with a warning; the rest of the file still loads.
pub fn parse_entries(json: &str) -> Result<Vec<MappingEntry>> {
    let definitions: Vec<MappingDefinition> =
        serde_json::from_str(json).context("Mapping file is not a JSON array of mappings")?;

    let total = definitions.len();
    let entries: Vec<MappingEntry> = definitions
        .into_iter()
        .enumerate()
        .filter_map(|(index, def)| match MappingEntry::from_definition(def, index) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping mapping: {}", e);
                None
            }
        })
        .collect();

    if entries.len() != total {
        debug!("Loaded {}/{} mapping definitions", entries.len(), total);
    }
    Ok(entries)
}

/// Load entries from a mapping file
pub async fn load_entries(path: impl AsRef<Path>) -> Result<Vec<MappingEntry>> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;

    parse_entries(&json).with_context(|| format!("Failed to parse mapping file: {}", path.display()))
}

/// Load the learned set. A missing file means nothing has been learned yet.
pub async fn load_learned(path: impl AsRef<Path>) -> Result<Vec<MappingEntry>> {
    let path = path.as_ref();
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!("No learned mappings at {}", path.display());
        return Ok(Vec::new());
    }
    load_entries(path).await
}

/// Persist learned entries as a JSON array of definitions
pub async fn save_learned(path: impl AsRef<Path>, entries: &[MappingEntry]) -> Result<()> {
    let path = path.as_ref();
    let definitions: Vec<MappingDefinition> = entries.iter().map(MappingEntry::to_definition).collect();
    let json = serde_json::to_string_pretty(&definitions).context("Failed to serialize learned mappings")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write learned mappings: {}", path.display()))?;

    debug!("Saved {} learned mappings to {}", entries.len(), path.display());
    Ok(())
}

/// Build the merged table from the base file and an optional learned file.
///
/// A base file that cannot be loaded yields an empty base set: the visualizer
/// keeps running and simply resolves nothing. A broken learned file is
/// ignored the same way.
pub async fn load_table(base: impl AsRef<Path>, learned: Option<&Path>) -> MappingTable {
    let base = base.as_ref();
    let base_entries = match load_entries(base).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Base mappings unavailable: {:#}", e);
            Vec::new()
        }
    };

    let learned_entries = match learned {
        Some(path) => match load_learned(path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring learned mappings: {:#}", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let (base_count, learned_count) = (base_entries.len(), learned_entries.len());
    let table = MappingTable::merge(base_entries, learned_entries);
    info!(
        "Mappings loaded: {} entries ({} base, {} learned)",
        table.len(),
        base_count,
        learned_count
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CanonicalEvent;
    use crate::mapping::entry::AnimationCategory;
    use tempfile::TempDir;

    const BASE: &str = r#"[
        {"key":"cc:1:7","target":"fader1","name":"Volume 1","category":"slide","axis":"y","min":0,"max":140},
        {"type":"noteon","ch":1,"code":11,"target":"play_a"},
        {"key":"cc:1:22","target":""}
    ]"#;

    #[test]
    fn test_parse_skips_invalid_definitions() {
        let entries = parse_entries(BASE).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].animation.category, Some(AnimationCategory::Slide));
        assert_eq!(entries[1].key, None);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_entries(r#"{"key":"cc:1:7"}"#).is_err());
        assert!(parse_entries("not json").is_err());
    }

    #[tokio::test]
    async fn test_load_table_merges_learned() {
        let dir = TempDir::new().unwrap();
        let base_path = dir.path().join("mappings.json");
        let learned_path = dir.path().join("learned.json");
        fs::write(&base_path, BASE).await.unwrap();
        fs::write(&learned_path, r#"[{"key":"cc:1:7","target":"fader2"}]"#)
            .await
            .unwrap();

        let table = load_table(&base_path, Some(learned_path.as_path())).await;
        assert_eq!(table.len(), 2);

        let entry = table.lookup(&CanonicalEvent::control_change(1, 7, 64)).unwrap();
        assert_eq!(entry.target, "fader2");
        assert_eq!(entry.display_name.as_deref(), Some("Volume 1"));
        // Learned entry carries no category, so the override is lit-only
        assert_eq!(entry.animation.category, None);
    }

    #[tokio::test]
    async fn test_missing_files_yield_empty_table() {
        let dir = TempDir::new().unwrap();
        let table = load_table(dir.path().join("nope.json"), Some(dir.path().join("none.json").as_path())).await;
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload_learned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("learned.json");

        let entries = parse_entries(BASE).unwrap();
        save_learned(&path, &entries).await.unwrap();

        let back = load_learned(&path).await.unwrap();
        assert_eq!(back, entries);
    }
}
