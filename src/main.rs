//! Board Viz - live controller visualizer
//!
//! Lights and animates diagram elements from a DJ controller's MIDI input,
//! records takes and replays them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use board_viz::config::{AppConfig, ConfigWatcher};
use board_viz::mapping::{load_table, MappingTable};
use board_viz::midi;
use board_viz::pipeline::{PipelineActor, PipelineHandle};
use board_viz::recorder::{PlayOptions, Take};
use board_viz::transport::{midi_input, MidiInputTransport, StreamTransport, Transport};
use board_viz::visual::DiagramSurface;

/// Board Viz - light up a controller diagram from live MIDI and replay takes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Visualize live input from the configured transports
    Run {
        /// Record everything and write the take here on exit
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Replay a recorded take through the pipeline
    Replay {
        take: PathBuf,

        /// Playback speed factor (defaults to the take's own)
        #[arg(long)]
        speed: Option<f64>,

        /// Restart the take when it ends
        #[arg(long = "loop")]
        looping: bool,
    },
    /// List available MIDI input ports
    ListPorts,
    /// Decode a raw MIDI message given as hex bytes (e.g. "B0 07 40")
    Decode {
        #[arg(required = true)]
        bytes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    match args.command.unwrap_or(Command::Run { record: None }) {
        Command::Run { record } => run(&args.config, record).await,
        Command::Replay {
            take,
            speed,
            looping,
        } => replay(&args.config, &take, speed, looping).await,
        Command::ListPorts => {
            let config = load_config_or_default(&args.config).await;
            let pattern = config.midi.as_ref().map(|m| m.input.as_str());
            midi_input::print_input_ports(pattern);
            Ok(())
        }
        Command::Decode { bytes } => decode(&bytes.join(" ")),
    }
}

async fn run(config_path: &Path, record: Option<PathBuf>) -> Result<()> {
    info!("Starting Board Viz...");
    info!("Configuration file: {}", config_path.display());

    let (mut config_watcher, initial_config) = ConfigWatcher::new(config_path).await?;
    info!("Configuration loaded successfully with hot-reload enabled");
    let mut config = (*initial_config).clone();

    let pipeline = build_pipeline(&config).await?;

    if record.is_some() {
        pipeline.start_recording_default();
        info!("Recording started (dedup {}ms)", config.recorder.dedup_ms);
    }

    let transports = start_transports(&config, &pipeline).await;
    if transports.is_empty() {
        warn!("No transport configured; add a 'midi' or 'stream' section to the config");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(update) = config_watcher.next_update() => {
                if update.mapping_files_changed || config.mappings_changed(&update.config) {
                    let table = build_table(&update.config).await;
                    pipeline.replace_mappings(table);
                }
                if config.pipeline_options() != update.config.pipeline_options()
                    || config.diagram != update.config.diagram
                    || config.midi != update.config.midi
                    || config.stream != update.config.stream
                {
                    warn!("Engine, recorder, diagram and transport settings apply on restart");
                }
                config = update.config;
            }
        }
    }

    for transport in &transports {
        if let Err(e) = transport.shutdown().await {
            warn!("Failed to stop {} transport: {}", transport.name(), e);
        }
    }

    if let Some(path) = record {
        let events = pipeline.stop_recording().await;
        info!("Recording stopped: {} events", events.len());
        match pipeline.export_take().await {
            Some(take) => {
                take.save(&path)
                    .await
                    .with_context(|| format!("Failed to write take: {}", path.display()))?;
                info!("Take written to {}", path.display());
            }
            None => error!("Pipeline closed before the take could be exported"),
        }
    }

    pipeline.shutdown();
    info!("Board Viz shutdown complete");
    Ok(())
}

async fn replay(config_path: &Path, take_path: &Path, speed: Option<f64>, looping: bool) -> Result<()> {
    let config = load_config_or_default(config_path).await;
    let take = Take::load(take_path)
        .await
        .with_context(|| format!("Failed to load take: {}", take_path.display()))?;

    let speed = speed.unwrap_or(take.speed_factor);
    info!(
        "Replaying {} events ({:.0}ms) at x{}{}",
        take.len(),
        take.duration_ms(),
        speed,
        if looping { ", looping" } else { "" }
    );

    let pipeline = build_pipeline(&config).await?;
    pipeline.load_take(take);
    pipeline.play(PlayOptions { speed, looping }).await?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                pipeline.stop_playback();
                break;
            }
            _ = ticker.tick() => {
                if !pipeline.is_playing().await {
                    break;
                }
            }
        }
    }

    print_summary(&pipeline).await;
    pipeline.shutdown();
    Ok(())
}

fn decode(input: &str) -> Result<()> {
    let bytes = midi::parse_hex(input).with_context(|| format!("Not a hex byte string: '{}'", input))?;

    match midi::decode(&bytes) {
        Some(event) => {
            println!("{} {}", "Event:".bold(), event.to_string().green());
            println!("{} {}", "Key:  ".bold(), event.key().to_string().cyan());
            println!("{} {}", "Wire: ".bold(), serde_json::to_string(&event.to_wire())?);
        }
        None => println!("{} {}", midi::format_hex(&bytes).yellow(), "is not a visualized channel message".dimmed()),
    }
    Ok(())
}

async fn build_table(config: &AppConfig) -> MappingTable {
    load_table(&config.mappings.base, config.mappings.learned.as_deref()).await
}

async fn build_pipeline(config: &AppConfig) -> Result<PipelineHandle> {
    let table = build_table(config).await;

    let surface = match &config.diagram {
        Some(path) => DiagramSurface::load(path).await?,
        None => {
            info!("No diagram configured; every mapping target is accepted");
            DiagramSurface::open()
        }
    };

    Ok(PipelineActor::spawn(table, Box::new(surface), config.pipeline_options()))
}

async fn start_transports(config: &AppConfig, pipeline: &PipelineHandle) -> Vec<Box<dyn Transport>> {
    let mut transports: Vec<Box<dyn Transport>> = Vec::new();

    if let Some(midi) = &config.midi {
        transports.push(Box::new(MidiInputTransport::new(midi.input.clone())));
    }
    if let Some(stream) = &config.stream {
        transports.push(Box::new(StreamTransport::new(stream.url.clone()).with_liveness(stream.liveness())));
    }

    let mut started = Vec::new();
    for transport in transports {
        let name = transport.name().to_string();
        transport.subscribe_connection_status(Arc::new(move |status| {
            debug!("{} transport status: {:?}", name, status);
        }));

        match transport.start(pipeline.clone()).await {
            Ok(()) => started.push(transport),
            Err(e) => error!("Failed to start {} transport: {:#}", transport.name(), e),
        }
    }
    started
}

async fn load_config_or_default(path: &Path) -> AppConfig {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return AppConfig::default();
    }
    match AppConfig::load(path).await {
        Ok(config) => config,
        Err(e) => {
            warn!("Using default configuration: {:#}", e);
            AppConfig::default()
        }
    }
}

async fn print_summary(pipeline: &PipelineHandle) {
    let stats = pipeline.stats().await;
    println!("\n{}", "=== Replay Summary ===".bold().cyan());
    println!(
        "  Events: {} received, {} resolved, {} unresolved",
        stats.received.to_string().green(),
        stats.resolved.to_string().green(),
        stats.unresolved.to_string().yellow()
    );

    for target in pipeline.targets().await {
        if let Some(state) = pipeline.element_state(&target).await {
            let lit = if state.lit { "on ".green() } else { "off".dimmed() };
            let position = state.position.map(|p| format!(" pos {:.1}", p)).unwrap_or_default();
            println!("  {} {}{} rot {:.1}", lit, target.bright_white(), position, state.rotation_angle);
        }
    }
    println!();
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
