//! Demo runner: wires the bundled plugins into a core and logs every intent.
//!
//! ```text
//! RUST_LOG=info nav-synapse --interval-ms 250 --duration-ms 2000
//! ```

use anyhow::{anyhow, Context as _};
use clap::Parser;
use nav_synapse::core::event::types::{INTENT_BACK, INTENT_NAVIGATE_LEFT, INTENT_NAVIGATE_RIGHT, INTENT_SELECT};
use nav_synapse::plugins::{self, mock_gesture};
use nav_synapse::runtime::{shutdown_signal, CoreConfig, NavCore};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nav-synapse", version, about = "Run the navigation event core with bundled plugins")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plugins to load, in registration order
    #[arg(short, long = "plugin", default_values_t = plugins::BUILTIN.iter().map(|s| s.to_string()).collect::<Vec<_>>())]
    plugins: Vec<String>,

    /// Overrides the mock-gesture interval
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Stop after this long instead of waiting for Ctrl-C
    #[arg(long)]
    duration_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CoreConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CoreConfig::default(),
    };
    if let Some(ms) = args.interval_ms {
        config = config.with_plugin_option(mock_gesture::NAME, "interval_ms", ms);
    }

    let selected = args
        .plugins
        .iter()
        .map(|name| plugins::create(name).ok_or_else(|| anyhow!("unknown plugin `{}`", name)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut core = NavCore::build().with_config(config).add_plugins(selected).build()?;

    let report = core.init().await?;
    if !report.is_success() {
        warn!(%report, "continuing with a partial plugin set");
    }

    let bus = core.event_bus()?;
    for intent in [INTENT_NAVIGATE_LEFT, INTENT_NAVIGATE_RIGHT, INTENT_SELECT, INTENT_BACK] {
        bus.on(intent, |event| {
            info!(intent = %event.event_type, payload = %event.payload, "intent");
            Ok(())
        });
    }

    let duration = args.duration_ms.map(Duration::from_millis);
    let report = core
        .run_until(async move {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => {
                    if let Err(e) = shutdown_signal().await {
                        error!(error = %e, "signal handling failed, shutting down");
                    }
                }
            }
        })
        .await?;

    info!(%report, "shut down");
    Ok(())
}
