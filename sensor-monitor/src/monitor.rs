//! Live sensor monitoring
//!
//! Starts the supervisor actor for the configured sensor, prints
//! notifications as they arrive and reports the latest reading once per
//! interval until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sensor_link::{
    spawn_supervisor, ConnectionSupervisor, DeviceAddress, LinkError, MonotonicClock, Notification,
    PlatformRadio, RadioAdapter, RfcommAdapter, SensorReading,
};
use sensor_sim::{SimulatedRadio, VirtualHxmConfig};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::settings::Settings;

const COMMAND_CAPACITY: usize = 32;

/// Options from the `monitor` subcommand
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    /// Overrides the configured device address
    pub address: Option<String>,
    /// Use virtual straps instead of the Bluetooth radio
    pub simulate: bool,
    /// Overrides the configured freshness window
    pub freshness_ms: Option<u64>,
    /// How often to print the latest reading
    pub report_interval: Duration,
}

/// Run until ctrl-c
pub async fn run(settings: &Settings, options: MonitorOptions) -> anyhow::Result<()> {
    let mut config = settings.supervisor_config();
    if let Some(ms) = options.freshness_ms {
        config.freshness_window = Duration::from_millis(ms);
    }
    let freshness_window = config.freshness_window;

    let mut address = options
        .address
        .clone()
        .map(DeviceAddress::new)
        .unwrap_or_else(|| settings.device_address.clone());

    let radio = if options.simulate {
        let straps = simulated_straps(settings);
        if address.is_none_sentinel() {
            address = DeviceAddress::new(straps[0].address.as_str());
            info!("Simulating; using virtual strap at {}", address);
        }
        let simulated = SimulatedRadio::with_devices(straps)
            .context("failed to set up simulated radio")?;
        PlatformRadio::with_adapter(Arc::new(simulated))
    } else {
        let bindings = settings.rfcomm_bindings.clone();
        let baud_rate = settings.baud_rate;
        PlatformRadio::spawn(move || {
            let adapter = RfcommAdapter::new(bindings.clone(), baud_rate);
            Some(Arc::new(adapter) as Arc<dyn RadioAdapter>)
        })
    };
    let radio = radio.context("failed to start radio owner thread")?;

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let supervisor =
        ConnectionSupervisor::new(radio, Arc::new(MonotonicClock::new()), config, notify_tx)
            .await;
    let (handle, task) = spawn_supervisor(supervisor, COMMAND_CAPACITY);

    if let Err(e) = handle.start(address.clone()).await {
        print_pending(&mut notify_rx);
        if let Some(hint) = start_hint(&e) {
            eprintln!("{}", hint);
        }
        handle.shutdown().await;
        let _ = task.await;
        return Err(anyhow::Error::new(e).context(format!("could not connect to sensor {}", address)));
    }

    let mut report = interval(options.report_interval.max(Duration::from_millis(100)));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Interrupted, disconnecting");
                break;
            }

            notification = notify_rx.recv() => {
                let Some(notification) = notification else { break; };
                println!("{}", notification);
            }

            _ = report.tick() => {
                let reading = handle.latest_reading().await?;
                let fresh = handle.is_reading_fresh(freshness_window).await?;
                println!("{}", describe(reading.as_ref(), fresh));
            }
        }
    }

    handle.shutdown().await;
    task.await.context("supervisor task failed")?;
    print_pending(&mut notify_rx);
    Ok(())
}

fn simulated_straps(settings: &Settings) -> Vec<VirtualHxmConfig> {
    if settings.simulated_devices.is_empty() {
        vec![VirtualHxmConfig::default()]
    } else {
        settings.simulated_devices.clone()
    }
}

/// Advice for failures the user fixes in settings rather than at the device
fn start_hint(error: &LinkError) -> Option<&'static str> {
    if !error.is_configuration() {
        return None;
    }
    Some(match error {
        LinkError::NoDeviceConfigured => {
            "No sensor configured: set device_address in the settings file, pass --address, or use --simulate"
        }
        _ => "Bluetooth is unavailable: check that a controller is present and powered on, or use --simulate",
    })
}

fn print_pending(rx: &mut mpsc::UnboundedReceiver<Notification>) {
    while let Ok(notification) = rx.try_recv() {
        println!("{}", notification);
    }
}

/// One-line summary of the latest reading
pub fn describe(reading: Option<&SensorReading>, fresh: bool) -> String {
    let Some(reading) = reading else {
        return "no reading".to_string();
    };

    let sample = reading.sample();
    let line = format!(
        "{} bpm | {:.1} km/h | {:.1} m | {} strides | battery {}%",
        sample.heart_rate_bpm,
        sample.speed_kmh(),
        sample.distance_m,
        sample.strides,
        sample.battery_percent
    );
    if fresh {
        line
    } else {
        format!("{} (stale)", line)
    }
}
