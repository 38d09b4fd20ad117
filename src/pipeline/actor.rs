//! PipelineActor - serialized event pipeline
//!
//! Owns the mapping table, the visual engine, the recorder and the running
//! player. Every event goes through record -> resolve -> animate to
//! completion before the next command is taken from the channel, so none of
//! this state needs a lock.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::error::PlayError;
use crate::event::CanonicalEvent;
use crate::mapping::MappingTable;
use crate::recorder::{PlayOptions, Player, Recorder, DEFAULT_DEDUP_MS};
use crate::visual::{PulseDirective, RenderSurface, VisualEngine, DEFAULT_PULSE};

use super::commands::{Origin, PipelineCommand, PipelineStats};
use super::handle::PipelineHandle;

/// Tunables of a pipeline instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    /// How long a note on keeps its target lit
    pub pulse: Duration,
    /// Dedup window used when a recording is started without one
    pub dedup_ms: u64,
    /// Capture events replayed by the player into an active recording
    pub capture_playback: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            pulse: DEFAULT_PULSE,
            dedup_ms: DEFAULT_DEDUP_MS,
            capture_playback: false,
        }
    }
}

/// ```text
/// transports ──► PipelineHandle ──► command_rx ──► PipelineActor
///                                      ▲              │ record → resolve → animate
///         pulse timers, player ────────┘              ▼
///                                                RenderSurface
/// ```
pub struct PipelineActor {
    mappings: MappingTable,
    engine: VisualEngine,
    recorder: Recorder,
    options: PipelineOptions,

    /// Currently running replay
    player: Option<Player>,

    /// Pending pulse timer per target
    pulse_timers: HashMap<String, JoinHandle<()>>,

    command_rx: mpsc::UnboundedReceiver<PipelineCommand>,

    /// Weak so that timers and the player never keep the actor alive
    command_tx: mpsc::WeakUnboundedSender<PipelineCommand>,

    stats: PipelineStats,
}

impl PipelineActor {
    /// Spawn the actor on the current runtime and return its handle
    pub fn spawn(
        mappings: MappingTable,
        surface: Box<dyn RenderSurface>,
        options: PipelineOptions,
    ) -> PipelineHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = PipelineActor {
            mappings,
            engine: VisualEngine::new(surface).with_pulse(options.pulse),
            recorder: Recorder::new(),
            options,
            player: None,
            pulse_timers: HashMap::new(),
            command_rx: cmd_rx,
            command_tx: cmd_tx.downgrade(),
            stats: PipelineStats::default(),
        };

        tokio::spawn(actor.run());

        info!("Pipeline spawned");

        PipelineHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("Pipeline run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                PipelineCommand::Ingest { event, origin, at } => {
                    self.handle_ingest(event, &origin, at);
                }
                PipelineCommand::PulseExpired { target, epoch } => {
                    // A stale expiry must not drop the handle of a newer timer
                    if self.engine.expire_pulse(&target, epoch) {
                        self.pulse_timers.remove(&target);
                    }
                }

                PipelineCommand::ReplaceMappings { table } => {
                    info!("Mapping table replaced ({} entries)", table.len());
                    self.mappings = table;
                }
                PipelineCommand::Lookup { event, response } => {
                    let _ = response.send(self.mappings.lookup(&event).cloned());
                }

                PipelineCommand::InstallRecorder => self.recorder.install(),
                PipelineCommand::StartRecording { dedup_ms, at } => {
                    self.recorder.start(dedup_ms.unwrap_or(self.options.dedup_ms), at);
                }
                PipelineCommand::StopRecording { response } => {
                    let _ = response.send(self.recorder.stop());
                }
                PipelineCommand::ClearRecording => self.recorder.clear(),
                PipelineCommand::ExportTake { response } => {
                    let _ = response.send(self.recorder.export_take());
                }
                PipelineCommand::LoadTake { take } => self.recorder.load_take(take),
                PipelineCommand::Play { options, response } => {
                    let result = self.handle_play(options);
                    let _ = response.send(result);
                }
                PipelineCommand::StopPlayback => self.stop_playback(),
                PipelineCommand::IsPlaying { response } => {
                    let playing = self.player.as_ref().is_some_and(|p| !p.is_finished());
                    let _ = response.send(playing);
                }

                PipelineCommand::ElementState { target, response } => {
                    let _ = response.send(self.engine.state(&target).cloned());
                }
                PipelineCommand::Applied { target, response } => {
                    let _ = response.send(self.engine.surface().applied(&target));
                }
                PipelineCommand::Targets { response } => {
                    let _ = response.send(self.engine.targets());
                }
                PipelineCommand::Stats { response } => {
                    let _ = response.send(self.stats);
                }
                PipelineCommand::Shutdown => {
                    info!("Pipeline received shutdown command");
                    break;
                }
            }
        }

        self.stop_playback();
        for (_, timer) in self.pulse_timers.drain() {
            timer.abort();
        }

        info!(
            received = self.stats.received,
            resolved = self.stats.resolved,
            "Pipeline run loop terminated"
        );
    }

    fn handle_ingest(&mut self, event: CanonicalEvent, origin: &Origin, at: Instant) {
        self.stats.received += 1;

        let capture = !origin.is_playback() || self.options.capture_playback;
        if capture && self.recorder.record(&event, at) {
            self.stats.recorded += 1;
        }

        let Some(entry) = self.mappings.lookup(&event) else {
            self.stats.unresolved += 1;
            trace!("{} from {} has no mapping", event, origin);
            return;
        };
        self.stats.resolved += 1;

        if let Some(directive) = self.engine.apply(&event, entry) {
            self.handle_pulse_directive(directive);
        }
    }

    fn handle_pulse_directive(&mut self, directive: PulseDirective) {
        match directive {
            PulseDirective::Schedule { target, epoch, after } => {
                if let Some(previous) = self.pulse_timers.remove(&target) {
                    previous.abort();
                }

                let tx = self.command_tx.clone();
                let expired_target = target.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(PipelineCommand::PulseExpired {
                            target: expired_target,
                            epoch,
                        });
                    }
                });
                self.pulse_timers.insert(target, timer);
            }
            PulseDirective::Cancel { target } => {
                if let Some(timer) = self.pulse_timers.remove(&target) {
                    timer.abort();
                }
            }
        }
    }

    fn handle_play(&mut self, options: PlayOptions) -> Result<(), PlayError> {
        self.stop_playback();

        let tx = self.command_tx.clone();
        let sink = move |event: CanonicalEvent| match tx.upgrade() {
            Some(tx) => tx
                .send(PipelineCommand::Ingest {
                    event,
                    origin: Origin::Playback,
                    at: Instant::now(),
                })
                .is_ok(),
            None => false,
        };

        let player = Player::spawn(self.recorder.events().to_vec(), options, sink)?;
        self.recorder.set_speed_factor(options.speed);
        self.player = Some(player);
        Ok(())
    }

    fn stop_playback(&mut self) {
        if let Some(player) = self.player.take() {
            player.stop();
            debug!("Playback stopped");
        }
    }
}
