//! PipelineHandle - the single ingress of the visualizer
//!
//! Every transport holds a clone and pushes events through it. Hot path
//! methods are fire-and-forget; queries await a oneshot response.

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{PlayError, TakeError};
use crate::event::CanonicalEvent;
use crate::mapping::{MappingEntry, MappingTable};
use crate::midi;
use crate::recorder::{PlayOptions, RecordedEvent, Take};
use crate::visual::{AppliedAttributes, VisualElementState};

use super::commands::{Origin, PipelineCommand, PipelineStats};

#[derive(Clone)]
pub struct PipelineHandle {
    cmd_tx: mpsc::UnboundedSender<PipelineCommand>,
}

impl PipelineHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<PipelineCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Whether the actor is still running
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    // =========================================================================
    // Ingress (fire-and-forget)
    // =========================================================================

    /// Push one canonical event. Arrival time is taken here.
    pub fn ingest(&self, event: CanonicalEvent, origin: Origin) {
        let _ = self.cmd_tx.send(PipelineCommand::Ingest {
            event,
            origin,
            at: Instant::now(),
        });
    }

    /// Decode a raw MIDI message and push it. Returns false when the message
    /// was filtered out by the decoder.
    pub fn ingest_raw(&self, transport: &str, data: &[u8]) -> bool {
        match midi::decode(data) {
            Some(event) => {
                trace!("{} [{}] -> {}", transport, midi::format_hex(data), event);
                self.ingest(event, Origin::live(transport));
                true
            }
            None => {
                trace!("{} [{}] ignored", transport, midi::format_hex(data));
                false
            }
        }
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    pub fn replace_mappings(&self, table: MappingTable) {
        let _ = self.cmd_tx.send(PipelineCommand::ReplaceMappings { table });
    }

    /// Entry the event would resolve to
    pub async fn lookup(&self, event: CanonicalEvent) -> Option<MappingEntry> {
        let (response, rx) = oneshot::channel();
        if self.cmd_tx.send(PipelineCommand::Lookup { event, response }).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    // =========================================================================
    // Recorder and player
    // =========================================================================

    pub fn install_recorder(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::InstallRecorder);
    }

    /// Start a new recording from now
    pub fn start_recording(&self, dedup_ms: u64) {
        self.send_start_recording(Some(dedup_ms));
    }

    /// Start a new recording with the pipeline's configured dedup window
    pub fn start_recording_default(&self) {
        self.send_start_recording(None);
    }

    fn send_start_recording(&self, dedup_ms: Option<u64>) {
        let _ = self.cmd_tx.send(PipelineCommand::StartRecording {
            dedup_ms,
            at: Instant::now(),
        });
    }

    /// Stop recording and return the captured events
    pub async fn stop_recording(&self) -> Vec<RecordedEvent> {
        let (response, rx) = oneshot::channel();
        if self.cmd_tx.send(PipelineCommand::StopRecording { response }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub fn clear_recording(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::ClearRecording);
    }

    /// Current buffer as a take
    pub async fn export_take(&self) -> Option<Take> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx.send(PipelineCommand::ExportTake { response }).ok()?;
        rx.await.ok()
    }

    pub fn load_take(&self, take: Take) {
        let _ = self.cmd_tx.send(PipelineCommand::LoadTake { take });
    }

    /// Parse an exported take and load it. Nothing is loaded on error.
    pub fn load_take_json(&self, json: &str) -> Result<(), TakeError> {
        let take = Take::from_json(json)?;
        debug!("Loading take with {} events", take.len());
        self.load_take(take);
        Ok(())
    }

    /// Replay the recorder buffer through the ingress
    pub async fn play(&self, options: PlayOptions) -> Result<(), PlayError> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(PipelineCommand::Play { options, response })
            .map_err(|_| PlayError::PipelineClosed)?;
        rx.await.map_err(|_| PlayError::PipelineClosed)?
    }

    pub fn stop_playback(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::StopPlayback);
    }

    pub async fn is_playing(&self) -> bool {
        let (response, rx) = oneshot::channel();
        if self.cmd_tx.send(PipelineCommand::IsPlaying { response }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn element_state(&self, target: &str) -> Option<VisualElementState> {
        let (response, rx) = oneshot::channel();
        let cmd = PipelineCommand::ElementState {
            target: target.to_string(),
            response,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Attributes the render surface last applied to an element
    pub async fn applied(&self, target: &str) -> Option<AppliedAttributes> {
        let (response, rx) = oneshot::channel();
        let cmd = PipelineCommand::Applied {
            target: target.to_string(),
            response,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn targets(&self) -> Vec<String> {
        let (response, rx) = oneshot::channel();
        if self.cmd_tx.send(PipelineCommand::Targets { response }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn stats(&self) -> PipelineStats {
        let (response, rx) = oneshot::channel();
        if self.cmd_tx.send(PipelineCommand::Stats { response }).is_err() {
            return PipelineStats::default();
        }
        rx.await.unwrap_or_default()
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::Shutdown);
    }
}
