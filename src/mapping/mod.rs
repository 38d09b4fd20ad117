//! Control-to-element mapping
//!
//! A mapping entry binds an event identity (`kind:channel:code`) to a diagram
//! element and describes how that element animates. Entries come from a
//! shipped base file and a user-learned file; the learned set overrides the
//! base per key.

pub mod entry;
pub mod loader;
pub mod table;

pub use entry::{
    Animation, AnimationCategory, Axis, MappingDefinition, MappingEntry, RotationConfig, RotationMode,
    SlideConfig,
};
pub use loader::{load_entries, load_learned, load_table, parse_entries, save_learned};
pub use table::MappingTable;
