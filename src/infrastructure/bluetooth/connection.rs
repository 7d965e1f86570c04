//! BLE Connection Module
//!
//! Owns the physical link to the lamp: connect with retry, characteristic
//! resolution, notification subscription, serialized writes and both kinds
//! of disconnect.
//!
//! Two locks, never merged:
//! - the connect lock collapses concurrent connect attempts into one;
//! - the operation lock spans "ensure connected, then write" so only one
//!   frame is ever on the wire.

use crate::domain::models::{ConnectionStatus, LinkEvent};
use crate::error::DriverError;
use crate::infrastructure::bluetooth::notification::SideEffect;
use crate::infrastructure::bluetooth::protocol::{READ_CHAR_UUID, WRITE_CHAR_UUID};
use crate::infrastructure::bluetooth::state::DeviceStateStore;
use crate::infrastructure::bluetooth::transport::{
    BluetoothHost, GattLink, LinkEventSender, TaggedLinkEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connect attempts before giving up
    pub max_connect_attempts: u32,
    /// Delay between connect attempts
    pub connect_retry_delay: Duration,
    /// Let the stack reuse cached GATT services on the first attempt
    pub use_services_cache: bool,
    /// Accepted UUIDs for the command characteristic
    pub write_char_uuids: Vec<String>,
    /// Accepted UUIDs for the status characteristic
    pub read_char_uuids: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 2,
            connect_retry_delay: Duration::from_millis(250),
            use_services_cache: true,
            write_char_uuids: vec![WRITE_CHAR_UUID.to_string()],
            read_char_uuids: vec![READ_CHAR_UUID.to_string()],
        }
    }
}

/// A fully resolved connection
struct DeviceLink<L> {
    link: Arc<L>,
    write_uuid: String,
    read_uuid: String,
}

struct LinkSlot<L> {
    current: Option<DeviceLink<L>>,
    /// Bumped on every connect and driver-initiated disconnect; events
    /// stamped with an older value belong to a dead link.
    generation: u64,
    connecting: bool,
}

pub struct ConnectionManager<H: BluetoothHost> {
    host: Arc<H>,
    address: String,
    config: ConnectionConfig,
    store: Arc<DeviceStateStore>,
    slot: Mutex<LinkSlot<H::Link>>,
    connect_lock: tokio::sync::Mutex<()>,
    operation_lock: tokio::sync::Mutex<()>,
    expected_disconnect: AtomicBool,
    events_tx: mpsc::UnboundedSender<TaggedLinkEvent>,
}

impl<H: BluetoothHost> ConnectionManager<H> {
    /// Create the manager and start its link event pump.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        host: Arc<H>,
        address: impl Into<String>,
        config: ConnectionConfig,
        store: Arc<DeviceStateStore>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            host,
            address: address.into(),
            config,
            store,
            slot: Mutex::new(LinkSlot {
                current: None,
                generation: 0,
                connecting: false,
            }),
            connect_lock: tokio::sync::Mutex::new(()),
            operation_lock: tokio::sync::Mutex::new(()),
            expected_disconnect: AtomicBool::new(false),
            events_tx,
        });
        tokio::spawn(run_event_pump(Arc::downgrade(&manager), events_rx));
        manager
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// True when a resolved link reports itself connected
    pub fn is_connected(&self) -> bool {
        self.slot()
            .current
            .as_ref()
            .map(|c| c.link.is_connected())
            .unwrap_or(false)
    }

    pub fn status(&self) -> ConnectionStatus {
        let slot = self.slot();
        match slot.current.as_ref() {
            Some(c) if c.link.is_connected() => ConnectionStatus::Connected,
            _ if slot.connecting => ConnectionStatus::Connecting,
            _ => ConnectionStatus::Disconnected,
        }
    }

    /// Availability follows radio coverage, not the link
    pub fn available(&self) -> bool {
        self.host.connectable_scanner_count() > 0
    }

    /// Connect if needed. Failures are logged and reported as `false`.
    pub async fn ensure_connected(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let _guard = self.connect_lock.lock().await;
        // Someone else may have connected while we waited
        if self.is_connected() {
            return true;
        }

        match self.connect().await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to connect to {}: {}", self.address, e);
                self.slot().connecting = false;
                false
            }
        }
    }

    async fn connect(&self) -> Result<(), DriverError> {
        let (generation, had_link) = {
            let mut slot = self.slot();
            let had_link = slot.current.take().is_some();
            slot.generation += 1;
            slot.connecting = true;
            (slot.generation, had_link)
        };

        // The link dropped but its event is still queued; the new generation
        // will discard it, so account for the loss here
        if had_link && !self.expected_disconnect.load(Ordering::SeqCst) {
            self.report_link_lost();
        }

        let device = self.host.resolve_device(&self.address).ok_or_else(|| {
            DriverError::DeviceNotFound(self.address.clone())
        })?;

        debug!("Connecting to {}", self.address);
        let link = self.connect_with_retry(&device, generation).await?;

        let Some((write_uuid, read_uuid)) = self.resolve_characteristics(link.as_ref()) else {
            teardown(link.as_ref()).await;
            return Err(DriverError::CharacteristicsMissing);
        };

        info!("Connected to {}, starting notifications", self.address);
        if let Err(e) = link.subscribe(&read_uuid).await {
            teardown(link.as_ref()).await;
            return Err(DriverError::SubscribeFailed(e.to_string()));
        }

        let superseded = {
            let mut slot = self.slot();
            if slot.generation == generation {
                slot.current = Some(DeviceLink {
                    link: link.clone(),
                    write_uuid,
                    read_uuid,
                });
                slot.connecting = false;
                false
            } else {
                true
            }
        };

        if superseded {
            // disconnect() ran while we were connecting
            teardown(link.as_ref()).await;
            return Err(DriverError::ConnectionFailed {
                attempts: 1,
                reason: "disconnect requested while connecting".to_string(),
            });
        }

        Ok(())
    }

    async fn connect_with_retry(
        &self,
        device: &H::Device,
        generation: u64,
    ) -> Result<Arc<H::Link>, DriverError> {
        let attempts = self.config.max_connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let events = LinkEventSender::new(generation, self.events_tx.clone());
            // A failed attempt may be caused by a stale service cache
            let use_cache = self.config.use_services_cache && attempt == 1;

            match self.host.connect(device, events, use_cache).await {
                Ok(link) => return Ok(Arc::new(link)),
                Err(e) => {
                    warn!(
                        "Connection attempt {}/{} to {} failed: {}",
                        attempt, attempts, self.address, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.connect_retry_delay).await;
                    }
                }
            }
        }

        Err(DriverError::ConnectionFailed {
            attempts,
            reason: last_error,
        })
    }

    /// Pick the write-capable and notify-capable characteristics we know
    fn resolve_characteristics(&self, link: &H::Link) -> Option<(String, String)> {
        let mut write_uuid = None;
        let mut read_uuid = None;

        for c in link.characteristics() {
            if c.can_write && self.config.write_char_uuids.iter().any(|u| c.matches(u)) {
                debug!("Found write characteristic {}", c.uuid);
                write_uuid = Some(c.uuid.clone());
            }
            if c.can_notify && self.config.read_char_uuids.iter().any(|u| c.matches(u)) {
                debug!("Found notify characteristic {}", c.uuid);
                read_uuid = Some(c.uuid);
            }
        }

        Some((write_uuid?, read_uuid?))
    }

    /// Write one frame. Connects first if necessary; never retries.
    pub async fn write(&self, frame: &[u8]) -> bool {
        let _operation = self.operation_lock.lock().await;
        if !self.ensure_connected().await {
            return false;
        }

        let target = self
            .slot()
            .current
            .as_ref()
            .map(|c| (c.link.clone(), c.write_uuid.clone()));
        let Some((link, write_uuid)) = target else {
            warn!("Link to {} lost before write", self.address);
            return false;
        };

        debug!("Writing: {:02X?}", frame);
        match link.write(&write_uuid, frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", DriverError::WriteFailed(e.to_string()));
                false
            }
        }
    }

    /// Driver-initiated teardown. Safe to call at any time, any number of times.
    pub async fn disconnect(&self) {
        debug!("Disconnecting from {}", self.address);
        self.expected_disconnect.store(true, Ordering::SeqCst);

        let current = {
            let mut slot = self.slot();
            slot.generation += 1;
            slot.connecting = false;
            slot.current.take()
        };

        if let Some(current) = current {
            if current.link.is_connected() {
                if let Err(e) = current.link.disconnect().await {
                    debug!("Error while disconnecting from {}: {}", self.address, e);
                }
            }
        }

        self.expected_disconnect.store(false, Ordering::SeqCst);
    }

    /// Link loss reported by the transport
    pub fn handle_link_lost(&self, generation: u64) {
        let lost = {
            let mut slot = self.slot();
            if slot.generation != generation {
                debug!("Ignoring disconnect of superseded link {}", generation);
                return;
            }
            slot.connecting = false;
            slot.current.take()
        };

        // Never fully resolved: a failed connect attempt, nothing to undo
        let Some(lost) = lost else {
            return;
        };
        debug!(
            "Disconnected from {} (write {}, notify {})",
            self.address, lost.write_uuid, lost.read_uuid
        );

        if !self.expected_disconnect.load(Ordering::SeqCst) {
            self.report_link_lost();
        }
    }

    /// Cached state is stale after an unexpected loss: reset and tell the host
    fn report_link_lost(&self) {
        warn!("{}: {}", self.address, DriverError::UnexpectedDisconnect);
        self.store.reset_off();
        if let Some(callback) = self.store.update_callback() {
            self.host.schedule_callback(Box::new(move || callback()));
        }
    }

    /// Apply a status notification and run its side effects
    pub async fn handle_notification(&self, generation: u64, frame: &[u8]) {
        if self.slot().generation != generation {
            debug!("Ignoring notification from superseded link {}", generation);
            return;
        }

        for effect in self.store.apply_notification(frame) {
            match effect {
                SideEffect::NotifyUpdate => self.store.fire_update(),
                SideEffect::ExpectedDisconnect => {
                    self.expected_disconnect.store(true, Ordering::SeqCst);
                    self.disconnect().await;
                }
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, LinkSlot<H::Link>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn teardown<L: GattLink>(link: &L) {
    if let Err(e) = link.disconnect().await {
        debug!("Error tearing down link: {}", e);
    }
}

/// Consume link events until the manager is dropped
async fn run_event_pump<H: BluetoothHost>(
    manager: Weak<ConnectionManager<H>>,
    mut events: mpsc::UnboundedReceiver<TaggedLinkEvent>,
) {
    while let Some(TaggedLinkEvent { generation, event }) = events.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        match event {
            LinkEvent::Notification(data) => manager.handle_notification(generation, &data).await,
            LinkEvent::Disconnected => manager.handle_link_lost(generation),
        }
    }
    debug!("Link event pump stopped");
}
