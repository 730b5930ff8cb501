//! Connection supervisor
//!
//! The single owner of connection state. It starts and stops workers, applies
//! their events in emission order and answers state queries. All mutation goes
//! through `&mut self`, so whichever task owns the supervisor is its control
//! context; see [`crate::actor`] for sharing it between tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::clock::Clock;
use crate::error::LinkError;
use crate::events::{Generation, LifecycleEvent, Notification, WorkerFault, WorkerMessage};
use crate::radio::{PlatformRadio, RadioAdapter, DEFAULT_RESOLVE_TIMEOUT};
use crate::state::{ConnectionState, SensorReading, MAX_READING_AGE};
use crate::worker::{DeviceConnectionWorker, WorkerConfig};

const OBSERVER_CAPACITY: usize = 256;

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Window used by [`ConnectionSupervisor::is_reading_valid`]
    pub freshness_window: Duration,
    /// Passed to every worker
    pub worker: WorkerConfig,
    /// Bound on waiting for the radio owner thread
    pub resolve_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            freshness_window: MAX_READING_AGE,
            worker: WorkerConfig::default(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

/// Supervises the one connection to the configured sensor
pub struct ConnectionSupervisor {
    radio: PlatformRadio,
    adapter: Option<Arc<dyn RadioAdapter>>,
    clock: Arc<dyn Clock>,
    config: SupervisorConfig,
    state: ConnectionState,
    latest: Option<SensorReading>,
    /// Worker that may still emit events
    worker: Option<DeviceConnectionWorker>,
    /// Worker that reported `Disconnected` but has not been joined yet
    retired: Option<DeviceConnectionWorker>,
    generation: Generation,
    events_rx: Option<mpsc::UnboundedReceiver<WorkerMessage>>,
    notifications: mpsc::UnboundedSender<Notification>,
    observers: broadcast::Sender<LifecycleEvent>,
}

impl ConnectionSupervisor {
    /// Create a supervisor and obtain the radio adapter
    ///
    /// Resolution waits at most `config.resolve_timeout`. A missing adapter is
    /// not an error here: `is_enabled` reports false and every `start` looks
    /// for the adapter again until one is found.
    pub async fn new(
        radio: PlatformRadio,
        clock: Arc<dyn Clock>,
        config: SupervisorConfig,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let radio = radio.with_resolve_timeout(config.resolve_timeout);
        let adapter = radio.resolve_async().await;
        if adapter.is_none() {
            warn!("Starting supervisor without a radio adapter");
        }
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);

        Self {
            radio,
            adapter,
            clock,
            config,
            state: ConnectionState::Idle,
            latest: None,
            worker: None,
            retired: None,
            generation: Generation::default(),
            events_rx: None,
            notifications,
            observers,
        }
    }

    /// Connect to the device at `address`, replacing any current connection
    ///
    /// The previous worker is fully stopped and joined before the new one is
    /// spawned. On error no worker is started and no lifecycle event follows.
    pub async fn start(&mut self, address: DeviceAddress) -> Result<(), LinkError> {
        if address.is_none_sentinel() {
            warn!("No sensor configured, not connecting");
            return Err(LinkError::NoDeviceConfigured);
        }

        if self.adapter.is_none() {
            self.adapter = self.radio.resolve_async().await;
        }
        let adapter = match &self.adapter {
            Some(adapter) if adapter.is_enabled() => Arc::clone(adapter),
            _ => {
                warn!("Radio is unavailable or disabled, not connecting to {}", address);
                return Err(LinkError::RadioDisabled);
            }
        };

        let device = match adapter.lookup_device(&address) {
            Ok(device) => device,
            Err(source) => {
                warn!("Cannot resolve sensor {}: {}", address, source);
                self.notify(Notification::DeviceUnknown {
                    address: address.clone(),
                });
                return Err(LinkError::Resolution { address, source });
            }
        };

        self.stop().await;

        self.generation = self.generation.next();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_rx = Some(events_rx);

        info!(
            "Starting connection to {} (generation {})",
            device.label(),
            self.generation.as_u64()
        );
        self.worker = Some(DeviceConnectionWorker::connect(
            device,
            self.generation,
            Arc::clone(&self.clock),
            self.config.worker.clone(),
            events_tx,
        ));
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Terminate the current connection, if any
    ///
    /// Waits for the worker to exit and applies whatever it emitted on the
    /// way out, then sets the state to `Idle`. Without a live worker this
    /// changes nothing.
    pub async fn stop(&mut self) {
        if let Some(mut retired) = self.retired.take() {
            retired.join().await;
        }

        let Some(mut worker) = self.worker.take() else {
            return;
        };

        info!(
            "Stopping connection to {} (generation {})",
            worker.label(),
            worker.generation().as_u64()
        );
        worker.disconnect().await;

        let trailing = self.drain_events();
        debug!("Applied {} trailing events from stopped worker", trailing.len());

        self.events_rx = None;
        self.state = ConnectionState::Idle;
    }

    /// Whether the radio adapter is present and switched on
    pub fn is_enabled(&self) -> bool {
        self.adapter
            .as_ref()
            .is_some_and(|adapter| adapter.is_enabled())
    }

    /// Most recent successfully decoded reading
    pub fn latest_reading(&self) -> Option<&SensorReading> {
        self.latest.as_ref()
    }

    /// Whether a reading exists and is at most `max_age` old now
    pub fn is_reading_fresh(&self, max_age: Duration) -> bool {
        let now = self.clock.now();
        self.latest
            .as_ref()
            .is_some_and(|reading| reading.is_recent(now, max_age))
    }

    /// [`is_reading_fresh`](Self::is_reading_fresh) with the configured window
    pub fn is_reading_valid(&self) -> bool {
        self.is_reading_fresh(self.config.freshness_window)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the most recently started worker
    pub fn generation(&self) -> u64 {
        self.generation.as_u64()
    }

    /// Configuration the supervisor runs with
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Receive a copy of every applied event
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.observers.subscribe()
    }

    /// Wait for the next event and apply it
    ///
    /// Cancel safe. Pends forever while no worker can produce events.
    pub async fn next_event(&mut self) -> LifecycleEvent {
        loop {
            let received = match self.events_rx.as_mut() {
                Some(rx) => rx.recv().await,
                None => std::future::pending::<Option<WorkerMessage>>().await,
            };

            match received {
                Some(msg) => {
                    if let Some(event) = self.apply(msg) {
                        return event;
                    }
                }
                None => self.events_rx = None,
            }
        }
    }

    /// Apply every event already queued, without waiting
    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        let mut applied = Vec::new();
        loop {
            let received = match self.events_rx.as_mut() {
                Some(rx) => rx.try_recv(),
                None => break,
            };

            match received {
                Ok(msg) => applied.extend(self.apply(msg)),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.events_rx = None;
                    break;
                }
            }
        }
        applied
    }

    fn apply(&mut self, msg: WorkerMessage) -> Option<LifecycleEvent> {
        if msg.generation != self.generation {
            warn!(
                "Discarding {} event from generation {} (current {}), clearing reading",
                msg.event.kind(),
                msg.generation.as_u64(),
                self.generation.as_u64()
            );
            self.latest = None;
            return None;
        }

        match &msg.event {
            LifecycleEvent::Connecting => {
                self.state = ConnectionState::Connecting;
            }
            LifecycleEvent::Connected { label } => {
                info!("Sensor {} connected", label);
                self.state = ConnectionState::Connected;
                self.notify(Notification::Connected {
                    label: label.clone(),
                });
            }
            LifecycleEvent::DataReceived { reading } => {
                debug!(
                    "Reading: {} bpm, {:.2} m/s",
                    reading.sample().heart_rate_bpm,
                    reading.sample().speed_mps
                );
                self.latest = Some(reading.clone());
            }
            LifecycleEvent::Disconnected { label } => {
                info!("Sensor {} disconnected", label);
                self.state = ConnectionState::Disconnected;
                self.notify(Notification::Disconnected {
                    label: label.clone(),
                });
                if let Some(worker) = self.worker.take() {
                    self.retired = Some(worker);
                }
            }
            LifecycleEvent::Error { cause } => {
                warn!("Sensor error: {}", cause);
                if matches!(cause, WorkerFault::Decode(_)) {
                    self.latest = None;
                }
                // The worker follows up with Disconnected, which notifies
                if cause.is_unrecoverable() {
                    self.state = ConnectionState::Disconnected;
                }
            }
        }

        // Nobody listening is fine
        let _ = self.observers.send(msg.event.clone());
        Some(msg.event)
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("Notification receiver dropped");
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("has_reading", &self.latest.is_some())
            .field("has_worker", &self.worker.is_some())
            .finish()
    }
}
