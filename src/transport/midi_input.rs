//! MIDI input port transport
//!
//! Opens the first input port whose name contains the configured pattern and
//! feeds every raw message into the pipeline decoder. The port is reopened
//! with linear backoff when it is missing or disappears.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use colored::*;
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{backoff, ConnectionStatus, StatusCallback, StatusReporter, Transport};
use crate::pipeline::PipelineHandle;

/// How often an open port is checked for presence
const PRESENCE_CHECK: Duration = Duration::from_secs(2);

const CLIENT_NAME: &str = "board-viz-in";

/// Find an input port by case-insensitive substring match
pub fn find_port_by_substring(midi_in: &MidiInput, pattern: &str) -> Option<(MidiInputPort, String)> {
    let pattern = pattern.to_lowercase();
    midi_in.ports().into_iter().find_map(|port| {
        let name = midi_in.port_name(&port).ok()?;
        name.to_lowercase().contains(&pattern).then_some((port, name))
    })
}

/// Names of all MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new(CLIENT_NAME)?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect())
}

/// Print the MIDI input ports, marking the ones matching `pattern`
pub fn print_input_ports(pattern: Option<&str>) {
    println!("\n{}", "=== MIDI Input Ports ===".bold().cyan());

    match list_input_ports() {
        Ok(ports) if ports.is_empty() => println!("  {}", "No input ports found".dimmed()),
        Ok(ports) => {
            for (idx, name) in ports.iter().enumerate() {
                let matched = pattern.is_some_and(|p| name.to_lowercase().contains(&p.to_lowercase()));
                let marker = if matched { "[MATCH]".green() } else { "       ".normal() };
                println!("  {} {:>2}: {}", marker, idx, name);
            }
        }
        Err(e) => println!("  {} {}", "MIDI unavailable:".red(), e),
    }
    println!();
}

pub struct MidiInputTransport {
    name: String,
    port_pattern: String,
    connection: Arc<Mutex<Option<MidiInputConnection<()>>>>,
    status: Arc<StatusReporter>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl MidiInputTransport {
    pub fn new(port_pattern: impl Into<String>) -> Self {
        Self {
            name: "midi".to_string(),
            port_pattern: port_pattern.into(),
            connection: Arc::new(Mutex::new(None)),
            status: Arc::new(StatusReporter::new()),
            supervisor: Mutex::new(None),
        }
    }

    pub fn port_pattern(&self) -> &str {
        &self.port_pattern
    }
}

/// Try to open the input port once
fn try_open(name: &str, pattern: &str, pipeline: PipelineHandle) -> Result<(MidiInputConnection<()>, String)> {
    let midi_in = MidiInput::new(CLIENT_NAME)?;

    let (port, port_name) = find_port_by_substring(&midi_in, pattern)
        .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;

    let origin = name.to_string();
    let connection = midi_in
        .connect(
            &port,
            &format!("board-viz-{}", port_name),
            move |_timestamp, data, _| {
                pipeline.ingest_raw(&origin, data);
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect to '{}': {}", port_name, e))?;

    Ok((connection, port_name))
}

fn port_present(pattern: &str) -> bool {
    match MidiInput::new(CLIENT_NAME) {
        Ok(midi_in) => find_port_by_substring(&midi_in, pattern).is_some(),
        Err(_) => false,
    }
}

async fn supervise(
    name: String,
    pattern: String,
    pipeline: PipelineHandle,
    connection: Arc<Mutex<Option<MidiInputConnection<()>>>>,
    status: Arc<StatusReporter>,
) {
    let mut attempt: usize = 0;

    loop {
        if connection.lock().is_some() {
            sleep(PRESENCE_CHECK).await;
            if !port_present(&pattern) {
                warn!("MIDI input '{}' disappeared", pattern);
                if let Some(conn) = connection.lock().take() {
                    conn.close();
                }
                status.set(ConnectionStatus::Disconnected);
            }
            continue;
        }

        match try_open(&name, &pattern, pipeline.clone()) {
            Ok((conn, port_name)) => {
                *connection.lock() = Some(conn);
                attempt = 0;
                status.set(ConnectionStatus::Connected);
                info!("MIDI input opened: '{}'", port_name);
            }
            Err(e) => {
                attempt += 1;
                let delay = backoff::linear(attempt);
                debug!("MIDI input reconnect #{} in {}ms: {}", attempt, delay.as_millis(), e);
                status.set(ConnectionStatus::Reconnecting { attempt });
                sleep(delay).await;
            }
        }
    }
}

#[async_trait]
impl Transport for MidiInputTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, pipeline: PipelineHandle) -> Result<()> {
        let mut supervisor = self.supervisor.lock();
        if supervisor.is_some() {
            return Ok(());
        }

        info!("MIDI input: waiting for port matching '{}'", self.port_pattern);
        *supervisor = Some(tokio::spawn(supervise(
            self.name.clone(),
            self.port_pattern.clone(),
            pipeline,
            Arc::clone(&self.connection),
            Arc::clone(&self.status),
        )));
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(task) = self.supervisor.lock().take() {
            task.abort();
        }
        if let Some(conn) = self.connection.lock().take() {
            conn.close();
        }
        self.status.set(ConnectionStatus::Disconnected);
        debug!("MIDI input closed");
        Ok(())
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status.current()
    }

    fn subscribe_connection_status(&self, callback: StatusCallback) {
        self.status.subscribe(callback);
    }
}
