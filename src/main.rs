//! DhvaniIO - Receiver daemon for the microphone-array sensor board
//!
//! Connects to the board over serial, decodes detection packets, stores
//! them, and echoes device output. Ctrl-C asks the board to stop its loop,
//! then shuts the session down cleanly.

use crossbeam_channel::RecvTimeoutError;
use dhvani_io::config::AppConfig;
use dhvani_io::display::ConsoleSink;
use dhvani_io::error::Result;
use dhvani_io::supervisor::ConnectionSupervisor;
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG_PATH: &str = "dhvani.toml";

struct CliArgs {
    config_path: Option<String>,
    port_override: Option<String>,
}

/// Parse command line arguments.
///
/// Supports:
/// - `dhvani-io <port>` (positional, overrides the configured serial port)
/// - `dhvani-io --config <path>` (flag-based)
/// - `dhvani-io -c <path>` (short flag)
fn parse_args() -> CliArgs {
    let args: Vec<String> = env::args().collect();
    let mut parsed = CliArgs {
        config_path: None,
        port_override: None,
    };

    let mut i = 1;
    while i < args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            parsed.config_path = Some(args[i + 1].clone());
            i += 2;
        } else if !args[i].starts_with('-') && parsed.port_override.is_none() {
            parsed.port_override = Some(args[i].clone());
            i += 1;
        } else {
            i += 1;
        }
    }

    parsed
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = match &args.config_path {
        // Explicit path must load
        Some(path) => AppConfig::from_file(path)?,
        // Default path is optional; fall back to board defaults
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::from_file(DEFAULT_CONFIG_PATH)?
        }
        None => AppConfig::maix_defaults(),
    };

    if let Some(port) = &args.port_override {
        config.hardware.port = port.clone();
    }

    Ok(config)
}

fn main() -> Result<()> {
    let args = parse_args();
    let config = load_config(&args)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("DhvaniIO starting...");
    log::info!(
        "Sensor port: {} at {} baud",
        config.hardware.port,
        config.hardware.baud_rate
    );
    if config.storage.enabled {
        log::info!("Storing detections under {}", config.storage.directory);
    } else {
        log::info!("Persistence disabled (display only)");
    }

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| dhvani_io::Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let (mut supervisor, events) = ConnectionSupervisor::connect(&config)?;
    let sink = ConsoleSink::new();

    log::info!("Listening for detections. Press Ctrl-C to stop.");

    let mut last_stats = Instant::now();
    let mut link_alive = true;

    while running.load(Ordering::Relaxed) && link_alive {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => sink.handle(&event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // Reader thread ended; disconnect() below surfaces why
                link_alive = false;
            }
        }

        if last_stats.elapsed().as_secs() >= 10 {
            log::info!("Session stats: {}", supervisor.stats());
            last_stats = Instant::now();
        }
    }

    // Ask the board to stop its detection loop. Best effort: the wire
    // format has no acknowledgement for this.
    if link_alive {
        if let Err(e) = supervisor.send_interrupt() {
            log::warn!("Failed to send stop signal to device: {}", e);
        }
    }

    let result = supervisor.disconnect();
    log::info!("Final stats: {}", supervisor.stats());
    log::info!("DhvaniIO stopped");
    result
}
