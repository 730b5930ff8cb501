//! Platform radio handle
//!
//! Some hosts only allow the radio adapter to be created from one designated
//! thread. [`PlatformRadio`] owns such a thread: the adapter factory only ever
//! runs there, and other threads obtain the adapter through a bounded
//! request/response handoff that gives up after `resolve_timeout`.

use std::fmt;
use std::io;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::error::ResolutionError;

/// Default bound on waiting for the owner thread
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Byte stream from a connected device
pub type BoxTransport = Box<dyn AsyncRead + Send + Unpin>;

/// Opens the physical connection to one device
///
/// `open` may block; workers call it on the blocking pool. Dropping the
/// returned transport closes the connection.
pub trait DeviceConnector: Send + Sync {
    /// Open the connection
    fn open(&self) -> io::Result<BoxTransport>;
}

/// A resolved remote device
#[derive(Clone)]
pub struct DeviceHandle {
    address: DeviceAddress,
    label: String,
    connector: Arc<dyn DeviceConnector>,
}

impl DeviceHandle {
    /// Create a handle
    pub fn new(
        address: DeviceAddress,
        label: impl Into<String>,
        connector: Arc<dyn DeviceConnector>,
    ) -> Self {
        Self {
            address,
            label: label.into(),
            connector,
        }
    }

    /// Address the handle was resolved from
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Human-readable label for notifications
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Connector used to open the device
    pub fn connector(&self) -> Arc<dyn DeviceConnector> {
        Arc::clone(&self.connector)
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("address", &self.address)
            .field("label", &self.label)
            .field("connector", &"<connector>")
            .finish()
    }
}

/// Host radio adapter
pub trait RadioAdapter: Send + Sync {
    /// Whether the radio is switched on
    fn is_enabled(&self) -> bool;

    /// Resolve an address to a device
    fn lookup_device(&self, address: &DeviceAddress) -> Result<DeviceHandle, ResolutionError>;
}

/// Factory producing the adapter; `None` when the host has no radio
pub type AdapterFactory = Box<dyn FnMut() -> Option<Arc<dyn RadioAdapter>> + Send>;

type Job = Box<dyn FnOnce() + Send>;

struct Shared {
    factory: Mutex<AdapterFactory>,
    adapter: OnceLock<Arc<dyn RadioAdapter>>,
}

impl Shared {
    /// Must only run on the owner thread
    ///
    /// A found adapter is kept for good. A missing one is not remembered, so
    /// the factory runs again on the next resolution.
    fn resolve_here(&self) -> Option<Arc<dyn RadioAdapter>> {
        if let Some(adapter) = self.adapter.get() {
            return Some(Arc::clone(adapter));
        }

        let mut factory = self.factory.lock().unwrap_or_else(PoisonError::into_inner);
        match factory() {
            Some(adapter) => Some(Arc::clone(self.adapter.get_or_init(|| adapter))),
            None => {
                warn!("No radio adapter found");
                None
            }
        }
    }
}

/// Injected handle to the host radio
///
/// Cheap to clone; all clones share one owner thread, which exits when the
/// last clone is dropped.
#[derive(Clone)]
pub struct PlatformRadio {
    shared: Arc<Shared>,
    owner: ThreadId,
    jobs: std_mpsc::Sender<Job>,
    resolve_timeout: Duration,
}

impl PlatformRadio {
    /// Spawn the owner thread for an adapter built by `factory`
    pub fn spawn<F>(factory: F) -> io::Result<Self>
    where
        F: FnMut() -> Option<Arc<dyn RadioAdapter>> + Send + 'static,
    {
        let factory: AdapterFactory = Box::new(factory);
        let (jobs, job_rx) = std_mpsc::channel::<Job>();
        let owner = thread::Builder::new()
            .name("radio-owner".to_string())
            .spawn(move || {
                debug!("Radio owner thread started");
                for job in job_rx {
                    job();
                }
                debug!("Radio owner thread stopped");
            })?;

        Ok(Self {
            shared: Arc::new(Shared {
                factory: Mutex::new(factory),
                adapter: OnceLock::new(),
            }),
            owner: owner.thread().id(),
            jobs,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        })
    }

    /// Spawn an owner thread around an already constructed adapter
    pub fn with_adapter(adapter: Arc<dyn RadioAdapter>) -> io::Result<Self> {
        Self::spawn(move || Some(Arc::clone(&adapter)))
    }

    /// Spawn an owner thread for a host without a radio
    pub fn unavailable() -> io::Result<Self> {
        Self::spawn(|| None)
    }

    /// Change the bound on cross-thread resolution
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Whether the calling thread is the owner thread
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run `job` on the owner thread
    ///
    /// Returns `false` if the owner thread is gone.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.jobs.send(Box::new(job)).is_ok()
    }

    /// Obtain the adapter, blocking for at most `resolve_timeout`
    ///
    /// On the owner thread the factory runs directly. From anywhere else the
    /// request is handed to the owner thread; `None` means the handoff timed
    /// out or the host has no adapter.
    pub fn resolve(&self) -> Option<Arc<dyn RadioAdapter>> {
        if let Some(adapter) = self.shared.adapter.get() {
            return Some(Arc::clone(adapter));
        }

        if self.is_owner_thread() {
            return self.shared.resolve_here();
        }

        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        let shared = Arc::clone(&self.shared);
        let posted = self.execute(move || {
            let _ = reply_tx.send(shared.resolve_here());
        });
        if !posted {
            warn!("Radio owner thread is gone");
            return None;
        }

        match reply_rx.recv_timeout(self.resolve_timeout) {
            Ok(adapter) => {
                if adapter.is_some() {
                    info!("Radio adapter resolved");
                }
                adapter
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "Timed out after {:?} waiting for the radio adapter",
                    self.resolve_timeout
                );
                None
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                warn!("Radio owner thread dropped the adapter request");
                None
            }
        }
    }

    /// [`resolve`](Self::resolve) on tokio's blocking pool
    pub async fn resolve_async(&self) -> Option<Arc<dyn RadioAdapter>> {
        if let Some(adapter) = self.shared.adapter.get() {
            return Some(Arc::clone(adapter));
        }

        let radio = self.clone();
        match tokio::task::spawn_blocking(move || radio.resolve()).await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("Radio resolution task failed: {}", e);
                None
            }
        }
    }

    /// Whether the radio is present and switched on
    pub fn is_enabled(&self) -> bool {
        self.resolve().is_some_and(|adapter| adapter.is_enabled())
    }

    /// Resolve an address through the adapter
    pub fn lookup_device(&self, address: &DeviceAddress) -> Result<DeviceHandle, ResolutionError> {
        self.resolve()
            .ok_or(ResolutionError::NoAdapter)?
            .lookup_device(address)
    }
}

impl fmt::Debug for PlatformRadio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformRadio")
            .field("owner", &self.owner)
            .field("resolved", &self.shared.adapter.get().is_some())
            .field("resolve_timeout", &self.resolve_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticAdapter {
        enabled: bool,
    }

    impl RadioAdapter for StaticAdapter {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn lookup_device(
            &self,
            address: &DeviceAddress,
        ) -> Result<DeviceHandle, ResolutionError> {
            Err(ResolutionError::UnknownDevice(address.to_string()))
        }
    }

    #[test]
    fn test_factory_runs_on_owner_thread_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_thread = Arc::new(Mutex::new(None));

        let calls_in = Arc::clone(&calls);
        let seen_in = Arc::clone(&seen_thread);
        let radio = PlatformRadio::spawn(move || {
            calls_in.fetch_add(1, Ordering::SeqCst);
            *seen_in.lock().unwrap() = thread::current().name().map(str::to_string);
            Some(Arc::new(StaticAdapter { enabled: true }) as Arc<dyn RadioAdapter>)
        })
        .unwrap();

        assert!(!radio.is_owner_thread());
        assert!(radio.resolve().is_some());
        assert!(radio.resolve().is_some());
        assert!(radio.is_enabled());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen_thread.lock().unwrap().as_deref(), Some("radio-owner"));
    }

    #[test]
    fn test_missing_adapter_is_looked_up_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = Arc::clone(&calls);
        let radio = PlatformRadio::spawn(move || {
            // The controller only shows up on the second probe
            if calls_in.fetch_add(1, Ordering::SeqCst) == 0 {
                None
            } else {
                Some(Arc::new(StaticAdapter { enabled: true }) as Arc<dyn RadioAdapter>)
            }
        })
        .unwrap();

        assert!(radio.resolve().is_none());
        assert!(radio.resolve().is_some());
        assert!(radio.resolve().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_directly_on_owner_thread() {
        let radio =
            PlatformRadio::with_adapter(Arc::new(StaticAdapter { enabled: false })).unwrap();
        let (tx, rx) = std_mpsc::channel();

        let inner = radio.clone();
        assert!(radio.execute(move || {
            let on_owner = inner.is_owner_thread();
            let resolved = inner.resolve().is_some();
            tx.send((on_owner, resolved)).unwrap();
        }));

        let (on_owner, resolved) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(on_owner);
        assert!(resolved);
        assert!(!radio.is_enabled());
    }

    #[test]
    fn test_resolve_times_out() {
        let radio = PlatformRadio::spawn(|| {
            thread::sleep(Duration::from_millis(500));
            Some(Arc::new(StaticAdapter { enabled: true }) as Arc<dyn RadioAdapter>)
        })
        .unwrap()
        .with_resolve_timeout(Duration::from_millis(20));

        assert!(radio.resolve().is_none());
    }

    #[test]
    fn test_no_adapter() {
        let radio = PlatformRadio::unavailable().unwrap();

        assert!(radio.resolve().is_none());
        assert!(!radio.is_enabled());
        assert_eq!(
            radio.lookup_device(&DeviceAddress::new("00:11:22:33:44:55")).unwrap_err(),
            ResolutionError::NoAdapter
        );
    }

    #[tokio::test]
    async fn test_resolve_async() {
        let radio =
            PlatformRadio::with_adapter(Arc::new(StaticAdapter { enabled: true })).unwrap();
        assert!(radio.resolve_async().await.is_some());
    }
}
