//! Sensor Monitor
//!
//! Headless front end for the sensor connection supervisor: connects to the
//! configured heart-rate strap, prints its readings and notifications, and
//! hands recorded tracks to the companion dashboard.

mod dashboard;
mod monitor;
mod settings;

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use monitor::MonitorOptions;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "sensor-monitor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to the sensor and print readings until interrupted
    Monitor {
        /// Sensor address (defaults to the configured one)
        #[arg(long)]
        address: Option<String>,
        /// Use a simulated strap instead of the Bluetooth radio
        #[arg(long)]
        simulate: bool,
        /// Readings older than this many milliseconds are reported stale
        #[arg(long)]
        freshness_ms: Option<u64>,
        /// Milliseconds between reading reports
        #[arg(long, default_value_t = 1000)]
        report_ms: u64,
    },
    /// Print the dashboard request for the given track ids
    Dashboard {
        /// Track ids to show
        #[arg(required = true, allow_negative_numbers = true)]
        ids: Vec<i64>,
    },
    /// Show the active settings
    Settings {
        /// Write the active settings to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sensor_monitor=info,sensor_link=info,sensor_protocol=info,sensor_sim=info,track_dashboard=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load();

    match cli.command.unwrap_or(Command::Monitor {
        address: None,
        simulate: false,
        freshness_ms: None,
        report_ms: 1000,
    }) {
        Command::Monitor {
            address,
            simulate,
            freshness_ms,
            report_ms,
        } => {
            tracing::info!("Starting sensor monitor");
            let options = MonitorOptions {
                address,
                simulate,
                freshness_ms,
                report_interval: Duration::from_millis(report_ms),
            };
            monitor::run(&settings, options).await
        }
        Command::Dashboard { ids } => dashboard::run(&settings.dashboard, &ids),
        Command::Settings { save } => show_settings(&settings, save),
    }
}

fn show_settings(settings: &Settings, save: bool) -> anyhow::Result<()> {
    match Settings::settings_path() {
        Some(path) => println!("Settings file: {}", path.display()),
        None => println!("Settings file: <unavailable>"),
    }
    println!("{}", serde_json::to_string_pretty(settings)?);

    let ports = sensor_link::available_rfcomm_ports();
    if ports.is_empty() {
        println!("No RFCOMM ports found");
    } else {
        println!("RFCOMM ports: {}", ports.join(", "));
    }

    if save {
        let path = settings.save()?;
        println!("Saved {}", path.display());
    }
    Ok(())
}
