//! Error types for the visualizer core
//!
//! Only take loading surfaces an error to the caller of the core. Decode
//! failures, resolution misses and missing render targets are recovered
//! locally and logged.

/// Failure to load a take. Loading is all-or-nothing.
#[derive(Debug, thiserror::Error)]
pub enum TakeError {
    /// Input is not JSON at all
    #[error("take is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Input has no `events` array
    #[error("take has no event sequence")]
    MissingEvents,

    /// An entry of the `events` array does not describe a controller event
    #[error("take event #{index} is not a valid controller event")]
    InvalidEvent { index: usize },

    /// Export format version this build does not understand
    #[error("unsupported take version {0}")]
    UnsupportedVersion(u64),

    /// Reading or writing the take file failed
    #[error("take file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid mapping definition
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// Key is not of the form `kind:channel:code`
    #[error("invalid event key '{0}'")]
    InvalidKey(String),

    /// Mapping definition without a render target
    #[error("mapping #{index} has no target")]
    MissingTarget { index: usize },
}

/// Playback could not be started
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlayError {
    /// There is nothing recorded or loaded
    #[error("nothing to play")]
    Empty,

    /// The pipeline has shut down
    #[error("pipeline is not running")]
    PipelineClosed,
}
