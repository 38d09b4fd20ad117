//! Board Viz - live controller visualizer
//!
//! Lights and animates the elements of a controller diagram from MIDI or
//! stream input, and records takes that can be replayed deterministically.

pub mod config;
pub mod error;
pub mod event;
pub mod mapping;
pub mod midi;
pub mod pipeline;
pub mod recorder;
pub mod transport;
pub mod visual;

pub use error::{MappingError, PlayError, TakeError};
pub use event::{CanonicalEvent, EventKey, EventKind};
pub use pipeline::{Origin, PipelineActor, PipelineHandle, PipelineOptions};
