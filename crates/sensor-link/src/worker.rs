//! Device connection worker
//!
//! One worker owns one connection attempt and its read loop. It runs in its
//! own task, keeps all blocking I/O away from the supervisor, and reports
//! exclusively through [`WorkerMessage`]s.
//!
//! The only cancellation primitive is closing the transport: `disconnect`
//! signals the task, which drops the transport and exits, and then joins it.

use std::sync::Arc;
use std::time::Duration;

use sensor_protocol::HxmFramer;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::events::{Generation, LifecycleEvent, WorkerFault, WorkerMessage};
use crate::radio::{BoxTransport, DeviceHandle};
use crate::state::SensorReading;

/// Default time without any byte after which the link counts as lost
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

const READ_BUFFER_LEN: usize = 256;

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Silence threshold after which the connection is dropped (`None` waits forever)
    pub read_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

/// Handle to a running connection task
#[derive(Debug)]
pub struct DeviceConnectionWorker {
    generation: Generation,
    label: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DeviceConnectionWorker {
    /// Spawn the connection task for `device`
    ///
    /// The task emits `Connecting` immediately, then either `Connected` and
    /// data, or `Error` followed by `Disconnected`.
    pub fn connect(
        device: DeviceHandle,
        generation: Generation,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
        events: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let label = device.label().to_string();

        let connection = Connection {
            device,
            generation,
            clock,
            config,
            events,
        };
        let task = tokio::spawn(connection.run(shutdown_rx));

        Self {
            generation,
            label,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Generation this worker tags its events with
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Label of the device this worker connects to
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the task has already exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Close the connection and wait for the task to exit
    ///
    /// No events are emitted after this returns. Calling it again is a no-op.
    pub async fn disconnect(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            // The task may already have exited on its own
            let _ = shutdown_tx.send(());
        }
        self.join().await;
    }

    /// Wait for the task to exit without signalling it
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(
                    "Connection task for {} (generation {}) failed: {}",
                    self.label,
                    self.generation.as_u64(),
                    e
                );
            }
        }
    }
}

/// State moved into the connection task
struct Connection {
    device: DeviceHandle,
    generation: Generation,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    events: mpsc::UnboundedSender<WorkerMessage>,
}

impl Connection {
    fn emit(&self, event: LifecycleEvent) {
        // A closed channel means the supervisor is gone; nothing left to tell
        let _ = self.events.send(WorkerMessage {
            generation: self.generation,
            event,
        });
    }

    fn label(&self) -> String {
        self.device.label().to_string()
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        info!(
            "Connecting to {} at {} (generation {})",
            self.device.label(),
            self.device.address(),
            self.generation.as_u64()
        );
        self.emit(LifecycleEvent::Connecting);

        let connector = self.device.connector();
        let mut open = tokio::task::spawn_blocking(move || connector.open());

        let opened = tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Connection to {} cancelled while opening", self.device.label());
                // The device must be released before the next worker opens it
                if let Ok(Ok(transport)) = open.await {
                    drop(transport);
                    debug!("Closed late transport for {}", self.device.label());
                }
                return;
            }
            result = &mut open => result,
        };

        let transport = match opened {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                self.fail_open(e.to_string());
                return;
            }
            Err(e) => {
                self.fail_open(format!("open task failed: {}", e));
                return;
            }
        };

        info!("Connected to {}", self.device.label());
        self.emit(LifecycleEvent::Connected {
            label: self.label(),
        });

        self.read_loop(transport, shutdown_rx).await;

        self.emit(LifecycleEvent::Disconnected {
            label: self.label(),
        });
    }

    fn fail_open(&self, reason: String) {
        error!("Failed to open {}: {}", self.device.label(), reason);
        self.emit(LifecycleEvent::Error {
            cause: WorkerFault::OpenFailed {
                label: self.label(),
                reason,
            },
        });
        self.emit(LifecycleEvent::Disconnected {
            label: self.label(),
        });
    }

    /// Read until the transport fails or shutdown is requested
    ///
    /// The transport is dropped (closed) when this returns.
    async fn read_loop(&self, mut transport: BoxTransport, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut framer = HxmFramer::new();
        let mut buffer = vec![0u8; READ_BUFFER_LEN];

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown requested for {}", self.device.label());
                    break;
                }

                result = read_with_timeout(&mut transport, &mut buffer, self.config.read_timeout) => {
                    match result {
                        Ok(0) => {
                            info!("Connection to {} closed by peer", self.device.label());
                            break;
                        }
                        Ok(n) => {
                            debug!("Read {} bytes from {}: {:02X?}", n, self.device.label(), &buffer[..n]);
                            framer.push_bytes(&buffer[..n]);
                            self.drain_frames(&mut framer);
                        }
                        Err(ReadFailure::TimedOut(after)) => {
                            warn!("No data from {} for {:?}, dropping connection", self.device.label(), after);
                            break;
                        }
                        Err(ReadFailure::Io(e)) => {
                            warn!("Read error on {}: {}", self.device.label(), e);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn drain_frames(&self, framer: &mut HxmFramer) {
        while let Some(frame) = framer.next_frame() {
            match frame {
                Ok(sample) => {
                    let reading = SensorReading::new(sample, self.clock.now());
                    self.emit(LifecycleEvent::DataReceived { reading });
                }
                Err(e) => {
                    warn!("Dropping malformed frame from {}: {}", self.device.label(), e);
                    self.emit(LifecycleEvent::Error {
                        cause: WorkerFault::Decode(e),
                    });
                }
            }
        }
    }
}

enum ReadFailure {
    TimedOut(Duration),
    Io(std::io::Error),
}

async fn read_with_timeout(
    transport: &mut BoxTransport,
    buffer: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, ReadFailure> {
    match timeout {
        Some(after) => match tokio::time::timeout(after, transport.read(buffer)).await {
            Ok(result) => result.map_err(ReadFailure::Io),
            Err(_) => Err(ReadFailure::TimedOut(after)),
        },
        None => transport.read(buffer).await.map_err(ReadFailure::Io),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::DeviceAddress;
    use crate::clock::ManualClock;
    use crate::radio::DeviceConnector;
    use sensor_protocol::{encode, SensorSample};
    use std::io;
    use std::sync::Mutex;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    /// Hands out one pre-made duplex end
    struct OneShotConnector {
        stream: Mutex<Option<DuplexStream>>,
    }

    impl DeviceConnector for OneShotConnector {
        fn open(&self) -> io::Result<BoxTransport> {
            match self.stream.lock().unwrap().take() {
                Some(s) => Ok(Box::new(s)),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "already opened")),
            }
        }
    }

    struct FailingConnector;

    impl DeviceConnector for FailingConnector {
        fn open(&self) -> io::Result<BoxTransport> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "host is down"))
        }
    }

    fn device(connector: Arc<dyn DeviceConnector>) -> DeviceHandle {
        DeviceHandle::new(DeviceAddress::new("00:07:80:00:00:01"), "HXM012345", connector)
    }

    fn spawn_with(
        connector: Arc<dyn DeviceConnector>,
        clock: Arc<dyn Clock>,
    ) -> (DeviceConnectionWorker, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = DeviceConnectionWorker::connect(
            device(connector),
            Generation(7),
            clock,
            WorkerConfig::default(),
            tx,
        );
        (worker, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> LifecycleEvent {
        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");
        assert_eq!(msg.generation, Generation(7));
        msg.event
    }

    #[tokio::test]
    async fn test_connect_read_and_disconnect() {
        let (mut peer, stream) = tokio::io::duplex(1024);
        let connector = Arc::new(OneShotConnector {
            stream: Mutex::new(Some(stream)),
        });
        let clock = Arc::new(ManualClock::new());
        clock.set(Duration::from_millis(1234));
        let (mut worker, mut rx) = spawn_with(connector, clock);

        assert_eq!(next_event(&mut rx).await, LifecycleEvent::Connecting);
        assert_eq!(
            next_event(&mut rx).await,
            LifecycleEvent::Connected {
                label: "HXM012345".to_string()
            }
        );

        let sample = SensorSample {
            heart_rate_bpm: 88,
            ..SensorSample::default()
        };
        peer.write_all(&encode(&sample)).await.unwrap();

        match next_event(&mut rx).await {
            LifecycleEvent::DataReceived { reading } => {
                assert_eq!(reading.sample().heart_rate_bpm, 88);
                assert_eq!(reading.captured_at(), Duration::from_millis(1234));
            }
            other => panic!("expected data, got {:?}", other),
        }

        worker.disconnect().await;
        assert!(worker.is_finished());
        assert_eq!(
            next_event(&mut rx).await,
            LifecycleEvent::Disconnected {
                label: "HXM012345".to_string()
            }
        );
        // Task has exited and dropped its sender
        assert!(rx.recv().await.is_none());

        // Second disconnect is a no-op
        worker.disconnect().await;
    }

    #[tokio::test]
    async fn test_decode_error_is_not_fatal() {
        let (mut peer, stream) = tokio::io::duplex(1024);
        let connector = Arc::new(OneShotConnector {
            stream: Mutex::new(Some(stream)),
        });
        let (mut worker, mut rx) = spawn_with(connector, Arc::new(ManualClock::new()));

        assert_eq!(next_event(&mut rx).await, LifecycleEvent::Connecting);
        assert!(matches!(next_event(&mut rx).await, LifecycleEvent::Connected { .. }));

        let mut bad = encode(&SensorSample::default());
        bad[58] ^= 0x5A;
        peer.write_all(&bad).await.unwrap();
        peer.write_all(&encode(&SensorSample::default())).await.unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            LifecycleEvent::Error {
                cause: WorkerFault::Decode(_)
            }
        ));
        assert!(matches!(
            next_event(&mut rx).await,
            LifecycleEvent::DataReceived { .. }
        ));

        worker.disconnect().await;
    }

    #[tokio::test]
    async fn test_peer_close_ends_loop() {
        let (peer, stream) = tokio::io::duplex(1024);
        let connector = Arc::new(OneShotConnector {
            stream: Mutex::new(Some(stream)),
        });
        let (mut worker, mut rx) = spawn_with(connector, Arc::new(ManualClock::new()));

        assert_eq!(next_event(&mut rx).await, LifecycleEvent::Connecting);
        assert!(matches!(next_event(&mut rx).await, LifecycleEvent::Connected { .. }));

        drop(peer);

        assert!(matches!(
            next_event(&mut rx).await,
            LifecycleEvent::Disconnected { .. }
        ));
        worker.join().await;
        assert!(worker.is_finished());
    }

    #[tokio::test]
    async fn test_open_failure() {
        let (mut worker, mut rx) = spawn_with(Arc::new(FailingConnector), Arc::new(ManualClock::new()));

        assert_eq!(next_event(&mut rx).await, LifecycleEvent::Connecting);
        match next_event(&mut rx).await {
            LifecycleEvent::Error { cause } => {
                assert!(cause.is_unrecoverable());
                assert!(cause.to_string().contains("host is down"));
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(matches!(
            next_event(&mut rx).await,
            LifecycleEvent::Disconnected { .. }
        ));

        worker.disconnect().await;
    }

    #[tokio::test]
    async fn test_read_timeout_drops_connection() {
        let (_peer, stream) = tokio::io::duplex(1024);
        let connector = Arc::new(OneShotConnector {
            stream: Mutex::new(Some(stream)),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut worker = DeviceConnectionWorker::connect(
            device(connector),
            Generation(7),
            Arc::new(ManualClock::new()),
            WorkerConfig {
                read_timeout: Some(Duration::from_millis(30)),
            },
            tx,
        );

        assert_eq!(next_event(&mut rx).await, LifecycleEvent::Connecting);
        assert!(matches!(next_event(&mut rx).await, LifecycleEvent::Connected { .. }));
        assert!(matches!(
            next_event(&mut rx).await,
            LifecycleEvent::Disconnected { .. }
        ));

        worker.disconnect().await;
    }
}
