//! Stream transport
//!
//! Connects to a WebSocket server that forwards already-normalized controller
//! events as `{ "type": "midi_like", "payload": { type, ch, d1, d2, ... } }`.
//! A connection that stays silent longer than the liveness timeout is closed
//! and reopened; failed attempts back off exponentially.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use super::{backoff, ConnectionStatus, StatusCallback, StatusReporter, Transport};
use crate::event::{CanonicalEvent, WireEvent};
use crate::pipeline::{Origin, PipelineHandle};

/// Default time without any inbound frame before the connection is recycled
pub const DEFAULT_LIVENESS: Duration = Duration::from_secs(10);

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// A decoded stream frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(CanonicalEvent),
    Log(String),
    Error(String),
    /// Unparseable, unknown or invalid frame
    Ignored,
}

/// Decode one text frame
pub fn parse_frame(text: &str) -> StreamFrame {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return StreamFrame::Ignored;
    };

    match envelope.kind.as_str() {
        "midi_like" => serde_json::from_value::<WireEvent>(envelope.payload)
            .ok()
            .and_then(|wire| CanonicalEvent::from_wire(&wire))
            .map(StreamFrame::Event)
            .unwrap_or(StreamFrame::Ignored),
        "log" => StreamFrame::Log(payload_text(envelope.payload)),
        "error" => StreamFrame::Error(payload_text(envelope.payload)),
        _ => StreamFrame::Ignored,
    }
}

fn payload_text(payload: Value) -> String {
    match payload {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

pub struct StreamTransport {
    name: String,
    url: String,
    liveness: Duration,
    status: Arc<StatusReporter>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: "stream".to_string(),
            url: url.into(),
            liveness: DEFAULT_LIVENESS,
            status: Arc::new(StatusReporter::new()),
            task: Mutex::new(None),
        }
    }

    pub fn with_liveness(mut self, liveness: Duration) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn run(name: String, url: String, liveness: Duration, pipeline: PipelineHandle, status: Arc<StatusReporter>) {
    let mut attempt: usize = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((mut socket, _response)) => {
                attempt = 0;
                status.set(ConnectionStatus::Connected);
                info!("Stream connected: {}", url);

                loop {
                    let next = match timeout(liveness, socket.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!("Stream silent for {}ms, reconnecting", liveness.as_millis());
                            break;
                        }
                    };

                    match next {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                            StreamFrame::Event(event) => pipeline.ingest(event, Origin::live(name.as_str())),
                            StreamFrame::Log(msg) => debug!("Stream log: {}", msg),
                            StreamFrame::Error(msg) => warn!("Stream source error: {}", msg),
                            StreamFrame::Ignored => trace!("Stream frame ignored"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Stream closed by server");
                            break;
                        }
                        // Ping, pong and binary frames only prove liveness
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Stream read error: {}", e);
                            break;
                        }
                    }

                    if pipeline.is_closed() {
                        return;
                    }
                }

                status.set(ConnectionStatus::Disconnected);
            }
            Err(e) => warn!("Stream connect to {} failed: {}", url, e),
        }

        if pipeline.is_closed() {
            return;
        }

        attempt += 1;
        let delay = backoff::exponential(attempt, BACKOFF_BASE, BACKOFF_CAP);
        debug!("Stream reconnect #{} in {}ms", attempt, delay.as_millis());
        status.set(ConnectionStatus::Reconnecting { attempt });
        sleep(delay).await;
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, pipeline: PipelineHandle) -> Result<()> {
        let parsed = tokio_tungstenite::tungstenite::http::Uri::try_from(self.url.as_str())
            .with_context(|| format!("Invalid stream URL: {}", self.url))?;
        debug!("Stream target {}", parsed);

        let mut task = self.task.lock();
        if task.is_none() {
            *task = Some(tokio::spawn(run(
                self.name.clone(),
                self.url.clone(),
                self.liveness,
                pipeline,
                Arc::clone(&self.status),
            )));
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.status.set(ConnectionStatus::Disconnected);
        Ok(())
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status.current()
    }

    fn subscribe_connection_status(&self, callback: StatusCallback) {
        self.status.subscribe(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_like_frame() {
        let frame = parse_frame(
            r#"{"type":"midi_like","payload":{"type":"cc","ch":1,"controller":7,"value":64,"d1":7,"d2":64}}"#,
        );
        assert_eq!(frame, StreamFrame::Event(CanonicalEvent::control_change(1, 7, 64)));

        let frame = parse_frame(r#"{"type":"midi_like","payload":{"type":"pitch","ch":1,"value":8192}}"#);
        assert_eq!(frame, StreamFrame::Event(CanonicalEvent::pitch_bend(1, 0)));
    }

    #[test]
    fn test_note_on_zero_frame_is_note_off() {
        let frame = parse_frame(
            r#"{"type":"midi_like","payload":{"type":"noteon","ch":1,"d1":11,"d2":0,"value":0}}"#,
        );
        assert_eq!(frame, StreamFrame::Event(CanonicalEvent::note_off(1, 11, 0)));
    }

    #[test]
    fn test_log_and_error_frames() {
        assert_eq!(
            parse_frame(r#"{"type":"log","payload":"HID opened"}"#),
            StreamFrame::Log("HID opened".into())
        );
        assert_eq!(
            parse_frame(r#"{"type":"error","payload":{"code":5}}"#),
            StreamFrame::Error(r#"{"code":5}"#.into())
        );
    }

    #[test]
    fn test_invalid_frames_are_ignored() {
        assert_eq!(parse_frame("not json"), StreamFrame::Ignored);
        assert_eq!(parse_frame(r#"{"payload":{}}"#), StreamFrame::Ignored);
        assert_eq!(parse_frame(r#"{"type":"hello"}"#), StreamFrame::Ignored);
        assert_eq!(
            parse_frame(r#"{"type":"midi_like","payload":{"type":"cc","ch":42,"d1":7}}"#),
            StreamFrame::Ignored
        );
        assert_eq!(parse_frame(r#"{"type":"midi_like"}"#), StreamFrame::Ignored);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        use crate::mapping::MappingTable;
        use crate::pipeline::{PipelineActor, PipelineOptions};
        use crate::visual::DiagramSurface;

        let pipeline = PipelineActor::spawn(
            MappingTable::new(),
            Box::new(DiagramSurface::open()),
            PipelineOptions::default(),
        );
        let transport = StreamTransport::new("not a url");
        assert!(transport.start(pipeline).await.is_err());
        assert_eq!(transport.connection_status(), ConnectionStatus::Disconnected);
    }
}
