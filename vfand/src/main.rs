//! vfan bridge daemon
//!
//! Mirrors the PWM files of the virtual fan hwmon driver to a fan
//! microcontroller over serial, and the RPM it reports back into the
//! driver's `fanN_input` files. Runs until SIGINT/SIGTERM, reconnecting
//! whenever the board or the driver goes away.

mod bridge;
mod hardware;
mod shutdown;
mod sweep;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hardware::{ConnectionManager, SystemHardware};
use std::path::PathBuf;
use std::time::Duration;
use sweep::SweepOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vfan_core::{resolve_config_path, StaticConfig};

/// vfan bridge daemon
#[derive(Parser, Debug)]
#[command(name = "vfand")]
#[command(version, about = "Bridge between hwmon fan files and a serial fan controller", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log every line exchanged with the device
    #[arg(long)]
    debug_uart: bool,

    /// Validate the configuration, print it, and exit
    #[arg(long)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ramp duty 0 → 255 → 0 repeatedly to exercise the fans
    Sweep {
        /// PWM increment per step (1-255)
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..))]
        step: u8,

        /// Delay between steps in milliseconds
        #[arg(long, default_value_t = 30)]
        interval_ms: u64,

        /// Only drive this channel (default: every configured channel)
        #[arg(long)]
        fan: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.verbose);

    // CLI flag > VFAND_CONFIG > default
    let config_path = resolve_config_path(args.config);
    info!("Configuration file: {}", config_path.display());

    let config = StaticConfig::load_or_default(&config_path)
        .with_context(|| format!("Invalid configuration {}", config_path.display()))?;

    if args.check_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signals = shutdown::cancel_on_signal(shutdown.clone());
    let hardware = SystemHardware::new(&config, args.debug_uart);

    match args.command {
        None => {
            info!("vfan bridge starting...");
            let mut manager = ConnectionManager::new(hardware, &config);
            manager.run(shutdown.clone()).await;
            info!("Bridge stopped after {} generation(s)", manager.generations());
        }
        Some(Command::Sweep {
            step,
            interval_ms,
            fan,
        }) => {
            let options = SweepOptions {
                fans: fan.map_or_else(|| config.hwmon.channels.clone(), |f| vec![f]),
                step,
                interval: Duration::from_millis(interval_ms),
            };
            sweep::run_sweep(&hardware, &options, &shutdown).await?;
        }
    }

    shutdown.cancel();
    signals.await?;
    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
