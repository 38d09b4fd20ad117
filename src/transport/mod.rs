//! Input transports
//!
//! Thin adapters that deliver controller input into the pipeline ingress.
//! Each transport reconnects on its own and reports its connection state
//! through status callbacks; a lost connection is never fatal.

pub mod midi_input;
pub mod stream;

pub use midi_input::MidiInputTransport;
pub use stream::StreamTransport;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::PipelineHandle;

/// Connection status of a transport
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    /// Transport is connected and delivering input
    Connected,
    /// Transport is disconnected
    Disconnected,
    /// Transport is waiting to retry
    Reconnecting { attempt: usize },
}

/// Type alias for connection status callbacks
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Transport trait - every input source implements this
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name used as the live origin of ingested events
    fn name(&self) -> &str;

    /// Start delivering events into the pipeline. Connection failures are
    /// retried in the background; only setup errors are returned.
    async fn start(&self, pipeline: PipelineHandle) -> Result<()>;

    /// Stop retrying and close the connection
    async fn shutdown(&self) -> Result<()>;

    fn connection_status(&self) -> ConnectionStatus;

    fn subscribe_connection_status(&self, callback: StatusCallback);
}

/// Current status plus the callbacks interested in it
#[derive(Default)]
pub struct StatusReporter {
    current: RwLock<Option<ConnectionStatus>>,
    callbacks: RwLock<Vec<StatusCallback>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConnectionStatus {
        self.current
            .read()
            .clone()
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    pub fn subscribe(&self, callback: StatusCallback) {
        self.callbacks.write().push(callback);
    }

    /// Record a status, notifying subscribers only when it changed
    pub fn set(&self, status: ConnectionStatus) {
        {
            let mut current = self.current.write();
            if current.as_ref() == Some(&status) {
                return;
            }
            *current = Some(status.clone());
        }

        for callback in self.callbacks.read().iter() {
            callback(status.clone());
        }
    }
}

/// Retry delays
pub mod backoff {
    use super::Duration;

    /// Linear backoff used for MIDI ports: `min(10 s, 250 ms * attempt)`
    pub fn linear(attempt: usize) -> Duration {
        let ms = (attempt as u64).saturating_mul(250).min(10_000);
        Duration::from_millis(ms)
    }

    /// Exponential backoff used for streams: `min(cap, base * 2^(attempt - 1))`
    pub fn exponential(attempt: usize, base: Duration, cap: Duration) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as u32;
        base.saturating_mul(1u32 << exp).min(cap)
    }
}
