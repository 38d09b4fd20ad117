//! Commands processed by the pipeline actor
//!
//! Hot path commands (ingest, timer expiries) carry no response. Queries and
//! recorder operations that return data use a oneshot channel.

use std::fmt;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::PlayError;
use crate::event::CanonicalEvent;
use crate::mapping::{MappingEntry, MappingTable};
use crate::recorder::{PlayOptions, RecordedEvent, Take};
use crate::visual::{AppliedAttributes, VisualElementState};

/// Where an ingested event came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// A live transport, by name
    Live(String),
    /// Replayed from a take
    Playback,
}

impl Origin {
    pub fn live(transport: impl Into<String>) -> Self {
        Origin::Live(transport.into())
    }

    pub fn is_playback(&self) -> bool {
        matches!(self, Origin::Playback)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Live(name) => f.write_str(name),
            Origin::Playback => f.write_str("playback"),
        }
    }
}

/// Counters exposed for inspection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Events that reached the ingress
    pub received: u64,
    /// Events captured by an active recording
    pub recorded: u64,
    /// Events that resolved to a mapping entry
    pub resolved: u64,
    /// Events without a mapping entry
    pub unresolved: u64,
}

pub enum PipelineCommand {
    // -------------------------------------------------------------------------
    // Hot path
    // -------------------------------------------------------------------------
    /// One canonical event, stamped at arrival
    Ingest {
        event: CanonicalEvent,
        origin: Origin,
        at: Instant,
    },

    /// A pulse timer fired
    PulseExpired { target: String, epoch: u64 },

    // -------------------------------------------------------------------------
    // Mapping
    // -------------------------------------------------------------------------
    ReplaceMappings { table: MappingTable },

    Lookup {
        event: CanonicalEvent,
        response: oneshot::Sender<Option<MappingEntry>>,
    },

    // -------------------------------------------------------------------------
    // Recorder and player
    // -------------------------------------------------------------------------
    InstallRecorder,

    /// `dedup_ms: None` uses the pipeline default window
    StartRecording { dedup_ms: Option<u64>, at: Instant },

    StopRecording {
        response: oneshot::Sender<Vec<RecordedEvent>>,
    },

    ClearRecording,

    ExportTake { response: oneshot::Sender<Take> },

    LoadTake { take: Take },

    Play {
        options: PlayOptions,
        response: oneshot::Sender<Result<(), PlayError>>,
    },

    StopPlayback,

    IsPlaying { response: oneshot::Sender<bool> },

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------
    ElementState {
        target: String,
        response: oneshot::Sender<Option<VisualElementState>>,
    },

    Applied {
        target: String,
        response: oneshot::Sender<Option<AppliedAttributes>>,
    },

    Targets { response: oneshot::Sender<Vec<String>> },

    Stats { response: oneshot::Sender<PipelineStats> },

    Shutdown,
}

impl fmt::Debug for PipelineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineCommand::Ingest { event, origin, .. } => f
                .debug_struct("Ingest")
                .field("event", &format_args!("{}", event))
                .field("origin", origin)
                .finish_non_exhaustive(),
            PipelineCommand::PulseExpired { target, epoch } => f
                .debug_struct("PulseExpired")
                .field("target", target)
                .field("epoch", epoch)
                .finish(),
            PipelineCommand::ReplaceMappings { table } => f
                .debug_struct("ReplaceMappings")
                .field("entries", &table.len())
                .finish(),
            PipelineCommand::Lookup { event, .. } => f
                .debug_struct("Lookup")
                .field("event", &format_args!("{}", event))
                .finish_non_exhaustive(),
            PipelineCommand::InstallRecorder => write!(f, "InstallRecorder"),
            PipelineCommand::StartRecording { dedup_ms, .. } => f
                .debug_struct("StartRecording")
                .field("dedup_ms", dedup_ms)
                .finish_non_exhaustive(),
            PipelineCommand::StopRecording { .. } => write!(f, "StopRecording"),
            PipelineCommand::ClearRecording => write!(f, "ClearRecording"),
            PipelineCommand::ExportTake { .. } => write!(f, "ExportTake"),
            PipelineCommand::LoadTake { take } => f
                .debug_struct("LoadTake")
                .field("events", &take.len())
                .finish(),
            PipelineCommand::Play { options, .. } => f
                .debug_struct("Play")
                .field("speed", &options.speed)
                .field("looping", &options.looping)
                .finish_non_exhaustive(),
            PipelineCommand::StopPlayback => write!(f, "StopPlayback"),
            PipelineCommand::IsPlaying { .. } => write!(f, "IsPlaying"),
            PipelineCommand::ElementState { target, .. } => f
                .debug_struct("ElementState")
                .field("target", target)
                .finish_non_exhaustive(),
            PipelineCommand::Applied { target, .. } => f
                .debug_struct("Applied")
                .field("target", target)
                .finish_non_exhaustive(),
            PipelineCommand::Targets { .. } => write!(f, "Targets"),
            PipelineCommand::Stats { .. } => write!(f, "Stats"),
            PipelineCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_debug() {
        let cmd = PipelineCommand::Ingest {
            event: CanonicalEvent::control_change(1, 7, 64),
            origin: Origin::live("midi"),
            at: Instant::now(),
        };
        let debug_str = format!("{:?}", cmd);
        assert!(debug_str.contains("Ingest"));
        assert!(debug_str.contains("cc ch:1 code:7 v:64"));
        assert!(debug_str.contains("midi"));

        let (tx, _rx) = oneshot::channel();
        let cmd = PipelineCommand::ElementState {
            target: "fader1".into(),
            response: tx,
        };
        assert!(format!("{:?}", cmd).contains("fader1"));

        assert_eq!(format!("{:?}", PipelineCommand::Shutdown), "Shutdown");
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::live("stream").to_string(), "stream");
        assert_eq!(Origin::Playback.to_string(), "playback");
        assert!(Origin::Playback.is_playback());
        assert!(!Origin::live("midi").is_playback());
    }
}
