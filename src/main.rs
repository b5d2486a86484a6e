//! Kontrol Bridge
//!
//! Keeps a Komplete Kontrol keyboard focused on the instrument of the armed track,
//! here driven by a simulated host loaded from a YAML session file.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use kontrol_bridge::bridge::Bridge;
use kontrol_bridge::config::BridgeConfig;
use kontrol_bridge::host::session::SessionWatcher;
use kontrol_bridge::host::SimulatedHost;
use kontrol_bridge::surface::port::{discovery, HardwareInput, HardwareOutput};
use kontrol_bridge::surface::{ConsoleSink, MidiSink};

/// Kontrol Bridge - keyboard focus follows the armed track
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Session file describing the simulated host's tracks
    #[arg(short, long, default_value = "session.yaml")]
    session: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Log outgoing frames instead of opening MIDI ports
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.list_ports {
        return discovery::print_ports();
    }

    // The log file comes from the config, so logging starts after loading it
    let loaded = BridgeConfig::load_optional(&args.config).await?;
    let config_found = loaded.is_some();
    let config = loaded.unwrap_or_default();
    let _log_guard = init_logging(&args.log_level, config.logging.file.as_deref())?;

    info!("Starting Kontrol Bridge v{}...", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!("Configuration file: {}", args.config);
    } else {
        info!("Config file {} not found, using defaults", args.config);
    }

    let (mut session_watcher, session) = SessionWatcher::new(args.session.clone()).await?;
    info!(
        "Session {} loaded with {} track(s) (exclusive arm: {}), hot-reload enabled",
        args.session,
        session.song.tracks.len(),
        session.exclusive_arm
    );
    let host = Arc::new(SimulatedHost::new(session.song).with_exclusive_arm(session.exclusive_arm));

    let sink = open_sink(&config, args.dry_run)?;
    let (mut bridge, mut events) = Bridge::new(host.clone(), sink, &config);
    bridge.start().context("Failed to start bridge")?;

    let _input = match (&config.midi.input_port, args.dry_run) {
        (Some(pattern), false) => Some(HardwareInput::connect(pattern, bridge.sender())?),
        _ => None,
    };

    let repl = cli::ReplContext::new(host.clone(), bridge.sender(), &config.native_plugin);
    let mut repl_done = cli::spawn_repl(repl)?;

    info!("Ready");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events.recv() => bridge.handle(event),

            Some(session) = session_watcher.next_session() => {
                info!("📝 Session file changed, reloading {} track(s)", session.song.tracks.len());
                host.set_exclusive_arm(session.exclusive_arm);
                host.replace_song(session.song);
            }

            _ = &mut repl_done => {
                info!("REPL closed");
                break;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    bridge.disconnect();
    info!("Kontrol Bridge shutdown complete");
    Ok(())
}

fn open_sink(config: &BridgeConfig, dry_run: bool) -> Result<Arc<dyn MidiSink>> {
    if dry_run {
        info!("Dry run: outgoing MIDI is logged only");
        return Ok(Arc::new(ConsoleSink));
    }

    match &config.midi.output_port {
        Some(pattern) => {
            let output = HardwareOutput::connect(pattern)?;
            info!("{} {}", "Keyboard output:".green(), output.name());
            Ok(Arc::new(output))
        }
        None => {
            warn!("No midi.output_port configured, logging outgoing MIDI instead");
            Ok(Arc::new(ConsoleSink))
        }
    }
}

fn init_logging(level: &str, file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file_layer, guard) = match file {
        Some(path) => {
            let path = Path::new(path);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}
