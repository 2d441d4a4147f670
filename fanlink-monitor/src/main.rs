//! fanlink monitor — entry point.
//!
//! ```text
//! fanlink-monitor                      Connect to every configured fan and print events
//! fanlink-monitor --json               Print events as JSON lines
//! fanlink-monitor --probe              Check each fan answers, then exit
//! fanlink-monitor --config <path>      Load a custom config TOML
//! fanlink-monitor --gen-config         Write an example config to stdout
//! fanlink-monitor --gen-config <path>  Write an example config to a file
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fanlink_monitor::config::MonitorConfig;
use fanlink_monitor::service::{MonitorService, OutputFormat};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "fanlink-monitor", about = "Live monitor for networked ceiling fans")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "fanlink-monitor.toml")]
    config: PathBuf,

    /// Write the example configuration to PATH, or stdout, and exit.
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    gen_config: Option<Option<PathBuf>>,

    /// Probe each configured fan once and exit.
    #[arg(long)]
    probe: bool,

    /// Print events as JSON lines instead of text.
    #[arg(long)]
    json: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.gen_config {
        Some(Some(path)) => {
            MonitorConfig::write_default(&path)?;
            println!("example config written to {}", path.display());
            return Ok(());
        }
        Some(None) => {
            let text = toml::to_string_pretty(&MonitorConfig::example())?;
            println!("{text}");
            return Ok(());
        }
        None => {}
    }

    let config = MonitorConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("fanlink-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("fan port: {}", config.connection.port);
    info!("devices: {}", config.devices.len());

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let service = MonitorService::new(config, format);

    if cli.probe {
        let reachable = service.probe_all().await;
        info!("{reachable} fan(s) reachable");
        return Ok(());
    }

    let stop = service.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
