//! Supervisor Actor
//!
//! Runs a [`ConnectionSupervisor`] inside its own task so other tasks can
//! control it through a channel. The actor serialises commands with the
//! supervisor's event consumption in one `select!` loop, so the supervisor
//! keeps a single control context.
//!
//! # Example
//!
//! ```rust,ignore
//! use sensor_link::{spawn_supervisor, DeviceAddress};
//!
//! let (handle, task) = spawn_supervisor(supervisor, 32);
//! handle.start(DeviceAddress::new("00:07:80:12:34:56")).await?;
//! if handle.is_reading_fresh(std::time::Duration::from_secs(5)).await? {
//!     // ...
//! }
//! handle.shutdown().await;
//! task.await?;
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::address::DeviceAddress;
use crate::error::LinkError;
use crate::state::{ConnectionState, SensorReading};
use crate::supervisor::ConnectionSupervisor;

/// Commands sent to the supervisor actor
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Connect to a device, replacing the current connection
    Start {
        /// Device to connect to
        address: DeviceAddress,
        /// Outcome of the start request
        response: oneshot::Sender<Result<(), LinkError>>,
    },

    /// Stop the current connection
    Stop {
        /// Signalled once the worker has been joined
        response: oneshot::Sender<()>,
    },

    /// Query whether the radio is usable
    IsEnabled {
        /// Channel to send back the answer
        response: oneshot::Sender<bool>,
    },

    /// Query the latest reading
    LatestReading {
        /// Channel to send back a copy of the reading
        response: oneshot::Sender<Option<SensorReading>>,
    },

    /// Query freshness of the latest reading
    IsReadingFresh {
        /// Maximum acceptable age
        max_age: Duration,
        /// Channel to send back the answer
        response: oneshot::Sender<bool>,
    },

    /// Query the connection state
    State {
        /// Channel to send back the state
        response: oneshot::Sender<ConnectionState>,
    },

    /// Stop the connection and exit the actor
    Shutdown,
}

/// Run the supervisor actor until shut down or all handles are dropped
///
/// The connection is stopped before returning.
pub async fn run_supervisor_actor(
    mut supervisor: ConnectionSupervisor,
    mut cmd_rx: mpsc::Receiver<SupervisorCommand>,
) {
    info!("Supervisor actor started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    SupervisorCommand::Start { address, response } => {
                        let result = supervisor.start(address).await;
                        let _ = response.send(result);
                    }
                    SupervisorCommand::Stop { response } => {
                        supervisor.stop().await;
                        let _ = response.send(());
                    }
                    SupervisorCommand::IsEnabled { response } => {
                        let _ = response.send(supervisor.is_enabled());
                    }
                    SupervisorCommand::LatestReading { response } => {
                        let _ = response.send(supervisor.latest_reading().cloned());
                    }
                    SupervisorCommand::IsReadingFresh { max_age, response } => {
                        let _ = response.send(supervisor.is_reading_fresh(max_age));
                    }
                    SupervisorCommand::State { response } => {
                        let _ = response.send(supervisor.state());
                    }
                    SupervisorCommand::Shutdown => {
                        info!("Supervisor actor shutting down");
                        break;
                    }
                }
            }

            event = supervisor.next_event() => {
                debug!("Applied {} event", event.kind());
            }
        }
    }

    supervisor.stop().await;
    info!("Supervisor actor stopped");
}

/// Cloneable handle to a running supervisor actor
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    cmd_tx: mpsc::Sender<SupervisorCommand>,
}

impl SupervisorHandle {
    /// Wrap an existing command sender
    pub fn new(cmd_tx: mpsc::Sender<SupervisorCommand>) -> Self {
        Self { cmd_tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SupervisorCommand,
    ) -> Result<T, LinkError> {
        let (response, reply) = oneshot::channel();
        self.cmd_tx
            .send(make(response))
            .await
            .map_err(|_| LinkError::SupervisorClosed)?;
        reply.await.map_err(|_| LinkError::SupervisorClosed)
    }

    /// Connect to `address`
    pub async fn start(&self, address: DeviceAddress) -> Result<(), LinkError> {
        self.request(|response| SupervisorCommand::Start { address, response })
            .await?
    }

    /// Stop the current connection and wait until it is gone
    pub async fn stop(&self) -> Result<(), LinkError> {
        self.request(|response| SupervisorCommand::Stop { response })
            .await
    }

    /// Whether the radio is usable
    pub async fn is_enabled(&self) -> Result<bool, LinkError> {
        self.request(|response| SupervisorCommand::IsEnabled { response })
            .await
    }

    /// Copy of the latest reading
    pub async fn latest_reading(&self) -> Result<Option<SensorReading>, LinkError> {
        self.request(|response| SupervisorCommand::LatestReading { response })
            .await
    }

    /// Whether the latest reading is at most `max_age` old
    pub async fn is_reading_fresh(&self, max_age: Duration) -> Result<bool, LinkError> {
        self.request(|response| SupervisorCommand::IsReadingFresh { max_age, response })
            .await
    }

    /// Current connection state
    pub async fn state(&self) -> Result<ConnectionState, LinkError> {
        self.request(|response| SupervisorCommand::State { response })
            .await
    }

    /// Ask the actor to stop the connection and exit
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SupervisorCommand::Shutdown).await;
    }
}

/// Spawn the actor for `supervisor` on the current runtime
pub fn spawn_supervisor(
    supervisor: ConnectionSupervisor,
    capacity: usize,
) -> (SupervisorHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run_supervisor_actor(supervisor, cmd_rx));
    (SupervisorHandle::new(cmd_tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::radio::PlatformRadio;
    use crate::supervisor::SupervisorConfig;
    use std::sync::Arc;

    async fn spawn_unavailable() -> (SupervisorHandle, JoinHandle<()>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let supervisor = ConnectionSupervisor::new(
            PlatformRadio::unavailable().unwrap(),
            Arc::new(ManualClock::new()),
            SupervisorConfig::default(),
            tx,
        )
        .await;
        spawn_supervisor(supervisor, 8)
    }

    #[tokio::test]
    async fn test_queries_through_handle() {
        let (handle, task) = spawn_unavailable().await;

        assert_eq!(handle.state().await.unwrap(), ConnectionState::Idle);
        assert!(!handle.is_enabled().await.unwrap());
        assert!(handle.latest_reading().await.unwrap().is_none());
        assert!(!handle
            .is_reading_fresh(Duration::from_secs(5))
            .await
            .unwrap());
        assert_eq!(
            handle.start(DeviceAddress::none()).await,
            Err(LinkError::NoDeviceConfigured)
        );
        handle.stop().await.unwrap();

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let (handle, task) = spawn_unavailable().await;
        handle.shutdown().await;
        task.await.unwrap();

        assert_eq!(handle.state().await, Err(LinkError::SupervisorClosed));
        assert_eq!(
            handle.start(DeviceAddress::new("00:11:22:33:44:55")).await,
            Err(LinkError::SupervisorClosed)
        );
    }
}
