//! Merged mapping table and event resolution

use std::collections::HashMap;
use tracing::{debug, trace};

use crate::event::{CanonicalEvent, EventKind};

use super::entry::MappingEntry;

/// Ordered set of mapping entries with at most one entry per key.
///
/// Built once from the base and learned sets and replaced wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
    /// Declared key -> entry index
    by_key: HashMap<String, usize>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from a single set of entries
    pub fn from_entries(entries: Vec<MappingEntry>) -> Self {
        Self::merge(entries, Vec::new())
    }

    /// Merge the shipped base set with user-learned overrides.
    ///
    /// Entries are grouped by [`MappingEntry::group_key`]. A learned entry whose
    /// key exists in the base replaces the target and animation and keeps the
    /// base display name unless it brings its own. Learned entries with new keys
    /// are appended, as are entries without a usable key.
    pub fn merge(base: Vec<MappingEntry>, learned: Vec<MappingEntry>) -> Self {
        let mut entries: Vec<MappingEntry> = Vec::with_capacity(base.len() + learned.len());
        let mut groups: HashMap<String, usize> = HashMap::new();

        for entry in base {
            match entry.group_key() {
                Some(key) => match groups.get(&key) {
                    Some(&idx) => {
                        debug!("Duplicate base mapping for {}, later entry wins", key);
                        entries[idx] = entry;
                    }
                    None => {
                        groups.insert(key, entries.len());
                        entries.push(entry);
                    }
                },
                None => entries.push(entry),
            }
        }

        for entry in learned {
            match entry.group_key() {
                Some(key) => match groups.get(&key) {
                    Some(&idx) => {
                        let existing = &mut entries[idx];
                        debug!(
                            "Learned mapping {} overrides '{}' -> '{}'",
                            key, existing.target, entry.target
                        );
                        existing.target = entry.target;
                        existing.animation = entry.animation;
                        if entry.display_name.is_some() {
                            existing.display_name = entry.display_name;
                        }
                    }
                    None => {
                        groups.insert(key, entries.len());
                        entries.push(entry);
                    }
                },
                None => entries.push(entry),
            }
        }

        let by_key = entries
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| e.key.clone().map(|k| (k, idx)))
            .collect();

        Self { entries, by_key }
    }

    /// Resolve the entry an event drives.
    ///
    /// Declared keys are matched first, then keyless entries are compared
    /// structurally in table order. A note off without an entry of its own
    /// resolves through the note on mapping of the same note.
    pub fn lookup(&self, event: &CanonicalEvent) -> Option<&MappingEntry> {
        if let Some(entry) = self.lookup_exact(event) {
            return Some(entry);
        }

        if event.kind == EventKind::NoteOff {
            let as_note_on = CanonicalEvent {
                kind: EventKind::NoteOn,
                ..*event
            };
            if let Some(entry) = self.lookup_exact(&as_note_on) {
                return Some(entry);
            }
        }

        trace!("No mapping for {}", event.key());
        None
    }

    fn lookup_exact(&self, event: &CanonicalEvent) -> Option<&MappingEntry> {
        let key = event.key().to_string();
        if let Some(&idx) = self.by_key.get(&key) {
            return self.entries.get(idx);
        }

        self.entries
            .iter()
            .find(|e| e.key.is_none() && e.matches_fields(event))
    }

    /// Entry by declared key
    pub fn get(&self, key: &str) -> Option<&MappingEntry> {
        self.by_key.get(key).and_then(|&idx| self.entries.get(idx))
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
