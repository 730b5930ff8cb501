//! Virtual strap actor task
//!
//! Owns a [`VirtualHxm`] and writes its frames to an async stream on a fixed
//! interval. The task uses a select! loop to:
//! - Emit one frame per tick
//! - Apply control commands (heart rate, speed, simulated drop-out)
//! - Exit when the reader goes away or on shutdown

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::device::VirtualHxm;

/// Commands that can be sent to a virtual strap task
#[derive(Debug, Clone)]
pub enum VirtualDeviceCommand {
    /// Change the resting heart rate
    SetHeartRate(u8),
    /// Change the running speed (m/s)
    SetSpeed(f32),
    /// Close the link as if the strap went out of range
    DropLink,
}

/// How the task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceExit {
    /// The reading side closed the link
    ReaderClosed,
    /// A `DropLink` command closed the link
    Dropped,
    /// Every controller was dropped
    ControllerGone,
}

/// Run the virtual strap task
///
/// Frames are written until the stream fails (the connection was closed on
/// the other end) or the strap is told to drop the link. The stream is
/// dropped, and therefore closed, when the task returns.
pub async fn run_virtual_device_task<S>(
    mut stream: S,
    mut device: VirtualHxm,
    mut cmd_rx: mpsc::Receiver<VirtualDeviceCommand>,
) -> io::Result<DeviceExit>
where
    S: AsyncWrite + Unpin,
{
    let period = device.frame_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so frames start after one period
    ticker.tick().await;

    info!(
        "Starting virtual strap {} ({:?} per frame)",
        device.label(),
        period
    );

    let exit = loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = device.next_frame(period);
                if let Err(e) = write_frame(&mut stream, &frame).await {
                    debug!("Virtual strap {} stream closed: {}", device.label(), e);
                    break DeviceExit::ReaderClosed;
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualDeviceCommand::SetHeartRate(bpm)) => {
                        debug!("Virtual strap {} heart rate -> {}", device.label(), bpm);
                        device.set_heart_rate(bpm);
                    }
                    Some(VirtualDeviceCommand::SetSpeed(mps)) => {
                        debug!("Virtual strap {} speed -> {}", device.label(), mps);
                        device.set_speed(mps);
                    }
                    Some(VirtualDeviceCommand::DropLink) => {
                        info!("Virtual strap {} dropping link", device.label());
                        break DeviceExit::Dropped;
                    }
                    None => break DeviceExit::ControllerGone,
                }
            }
        }
    };

    let _ = stream.shutdown().await;
    info!(
        "Virtual strap {} stopped after {} frames",
        device.label(),
        device.frames_sent()
    );
    Ok(exit)
}

async fn write_frame<S>(stream: &mut S, frame: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(frame).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::VirtualHxmConfig;
    use sensor_protocol::{HxmFramer, FRAME_LEN};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn fast_device() -> VirtualHxm {
        VirtualHxm::from_config(VirtualHxmConfig {
            frame_interval_ms: 5,
            heart_rate_variation: 0,
            ..VirtualHxmConfig::default()
        })
    }

    #[tokio::test]
    async fn test_strap_streams_frames() {
        let (mut reader, writer) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_virtual_device_task(writer, fast_device(), cmd_rx));

        let mut buf = [0u8; FRAME_LEN * 2];
        reader.read_exact(&mut buf).await.unwrap();

        let mut framer = HxmFramer::new();
        framer.push_bytes(&buf);
        let first = framer.next_frame().unwrap().unwrap();
        let second = framer.next_frame().unwrap().unwrap();
        assert_eq!(first.heart_rate_bpm, 72);
        assert_eq!(second.heart_rate_bpm, 72);

        cmd_tx.send(VirtualDeviceCommand::DropLink).await.unwrap();
        let exit = task.await.unwrap().unwrap();
        assert_eq!(exit, DeviceExit::Dropped);
    }

    #[tokio::test]
    async fn test_strap_stops_when_reader_closes() {
        let (reader, writer) = tokio::io::duplex(64);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_virtual_device_task(writer, fast_device(), cmd_rx));

        drop(reader);

        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(exit, DeviceExit::ReaderClosed);
    }

    #[tokio::test]
    async fn test_heart_rate_command() {
        let (mut reader, writer) = tokio::io::duplex(4096);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_virtual_device_task(writer, fast_device(), cmd_rx));

        cmd_tx
            .send(VirtualDeviceCommand::SetHeartRate(140))
            .await
            .unwrap();

        let mut framer = HxmFramer::new();
        let mut buf = [0u8; FRAME_LEN];
        let mut saw_new_rate = false;
        for _ in 0..10 {
            reader.read_exact(&mut buf).await.unwrap();
            framer.push_bytes(&buf);
            if let Some(Ok(sample)) = framer.next_frame() {
                if sample.heart_rate_bpm == 140 {
                    saw_new_rate = true;
                    break;
                }
            }
        }
        assert!(saw_new_rate);

        drop(cmd_tx);
        assert_eq!(task.await.unwrap().unwrap(), DeviceExit::ControllerGone);
    }
}
