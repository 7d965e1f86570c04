//! Transport seams
//!
//! The driver never talks to a bluetooth stack directly. A [`BluetoothHost`]
//! resolves addresses and opens links, a [`GattLink`] is one live connection.
//! Links report notifications and link loss through a [`LinkEventSender`],
//! from whatever thread the stack calls back on.

use crate::domain::models::LinkEvent;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A characteristic found on the connected peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: String,
    pub can_write: bool,
    pub can_notify: bool,
}

impl CharacteristicInfo {
    pub fn matches(&self, uuid: &str) -> bool {
        self.uuid.eq_ignore_ascii_case(uuid)
    }
}

/// Link event stamped with the generation of the link that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedLinkEvent {
    pub generation: u64,
    pub event: LinkEvent,
}

/// Handed to a link on connect; safe to use from any thread
#[derive(Debug, Clone)]
pub struct LinkEventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedLinkEvent>,
}

impl LinkEventSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedLinkEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notification(&self, data: Vec<u8>) {
        self.send(LinkEvent::Notification(data));
    }

    pub fn disconnected(&self) {
        self.send(LinkEvent::Disconnected);
    }

    fn send(&self, event: LinkEvent) {
        // The driver may already be gone; nothing left to inform then
        let _ = self.tx.send(TaggedLinkEvent {
            generation: self.generation,
            event,
        });
    }
}

/// One live connection to the peripheral
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Characteristics of every resolved service
    fn characteristics(&self) -> Vec<CharacteristicInfo>;

    /// Enable notifications; values arrive through the link's event sender
    async fn subscribe(&self, uuid: &str) -> Result<()>;

    async fn write(&self, uuid: &str, data: &[u8]) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Platform bluetooth services the driver consumes
#[async_trait]
pub trait BluetoothHost: Send + Sync + 'static {
    type Device: Send + Sync;
    type Link: GattLink;

    /// Look up a currently connectable device
    fn resolve_device(&self, address: &str) -> Option<Self::Device>;

    /// Number of scanners able to reach connectable devices
    fn connectable_scanner_count(&self) -> usize;

    /// Run `callback` on the host's own scheduling context
    fn schedule_callback(&self, callback: Box<dyn FnOnce() + Send>);

    /// One connection attempt. Retries are the caller's business.
    async fn connect(
        &self,
        device: &Self::Device,
        events: LinkEventSender,
        use_services_cache: bool,
    ) -> Result<Self::Link>;
}
