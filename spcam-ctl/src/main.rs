//! spcam-ctl entry point.
//!
//! ```text
//! spcam-ctl                      Connect using spcam-ctl.toml
//! spcam-ctl --port /dev/ttyACM0  Override the serial device
//! spcam-ctl --preview live.jpg   Keep live.jpg updated with the newest frame
//! spcam-ctl --config <path>      Load a custom config TOML
//! spcam-ctl --gen-config         Print the default config
//! spcam-ctl --gen-config <path>  Write the default config to a file
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use spcam_core::CameraController;
use spcam_ctl::config::{ConfigSource, CtlConfig};
use spcam_ctl::console::Console;
use spcam_ctl::preview::run_preview_writer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "spcam-ctl", about = "Serial camera recording console")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "spcam-ctl.toml")]
    config: PathBuf,

    /// Serial device, overriding `serial.port`.
    #[arg(short, long)]
    port: Option<String>,

    /// File to keep updated with the newest live frame.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Write the default configuration to PATH, or print it, and exit.
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    gen_config: Option<Option<PathBuf>>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.gen_config {
        Some(Some(path)) => {
            CtlConfig::write_default(&path)?;
            println!("Default config written to {}", path.display());
            return Ok(());
        }
        Some(None) => {
            print!("{}", toml::to_string_pretty(&CtlConfig::default())?);
            return Ok(());
        }
        None => {}
    }

    let (mut config, source) = CtlConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &source {
        ConfigSource::File => info!("loaded config from {}", cli.config.display()),
        ConfigSource::Missing => info!("no config at {}; using defaults", cli.config.display()),
        ConfigSource::Invalid(e) => {
            warn!("invalid config {}: {e}; using defaults", cli.config.display());
        }
    }

    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(preview) = cli.preview {
        config.preview.file = preview.display().to_string();
    }

    info!("spcam-ctl v{}", env!("CARGO_PKG_VERSION"));
    info!("serial port: {}", config.serial.port);
    info!("videos: {}", config.storage.video_dir.display());
    info!("photos: {}", config.storage.photo_dir.display());

    let (mut controller, events) = CameraController::new(config.to_controller_config());
    if let Err(e) = controller.connect(&config.transport()).await {
        error!("failed to connect to {}: {e}", config.serial.port);
        eprintln!("Failed to connect to device. Exiting.");
        std::process::exit(1);
    }

    let preview_task = config.preview_file().map(|path| {
        info!("live preview: {}", path.display());
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_preview_writer(
            controller.preview(),
            path,
            Arc::clone(&running),
        ));
        (running, task)
    });

    let result = Console::new(controller, events).run().await;

    if let Some((running, task)) = preview_task {
        running.store(false, Ordering::SeqCst);
        let _ = task.await;
    }

    result?;
    Ok(())
}
