//! Scripted in-memory transport for tests

use crate::infrastructure::bluetooth::protocol::{READ_CHAR_UUID, WRITE_CHAR_UUID};
use crate::infrastructure::bluetooth::transport::{
    BluetoothHost, CharacteristicInfo, GattLink, LinkEventSender,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

pub struct FakeShared {
    pub device_present: AtomicBool,
    pub scanner_count: AtomicUsize,
    /// Number of upcoming connect attempts that fail
    pub failing_connects: AtomicU32,
    pub connect_calls: AtomicU32,
    pub subscribe_fails: AtomicBool,
    pub characteristics: Mutex<Vec<CharacteristicInfo>>,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub fail_writes: AtomicBool,
    /// Writes park until `release_write` or link loss
    pub hold_writes: AtomicBool,
    pub write_started: Notify,
    release: Notify,
    pub scheduled_callbacks: AtomicUsize,
    pub link_disconnects: AtomicU32,
    current: Mutex<Option<(LinkEventSender, Arc<watch::Sender<bool>>)>>,
}

impl FakeShared {
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub fn release_write(&self) {
        self.release.notify_one();
    }

    /// Push a status frame from the current link
    pub fn notify(&self, frame: Vec<u8>) {
        if let Some((events, _)) = self.current.lock().unwrap().as_ref() {
            events.notification(frame);
        }
    }

    /// Peripheral-side link loss
    pub fn drop_link(&self) {
        if let Some((events, connected)) = self.current.lock().unwrap().as_ref() {
            connected.send_replace(false);
            events.disconnected();
        }
    }
}

#[derive(Clone)]
pub struct FakeHost {
    pub shared: Arc<FakeShared>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FakeShared {
                device_present: AtomicBool::new(true),
                scanner_count: AtomicUsize::new(1),
                failing_connects: AtomicU32::new(0),
                connect_calls: AtomicU32::new(0),
                subscribe_fails: AtomicBool::new(false),
                characteristics: Mutex::new(vec![
                    CharacteristicInfo {
                        uuid: "00002a00-0000-1000-8000-00805f9b34fb".to_string(),
                        can_write: false,
                        can_notify: false,
                    },
                    CharacteristicInfo {
                        uuid: WRITE_CHAR_UUID.to_uppercase(),
                        can_write: true,
                        can_notify: false,
                    },
                    CharacteristicInfo {
                        uuid: READ_CHAR_UUID.to_string(),
                        can_write: false,
                        can_notify: true,
                    },
                ]),
                writes: Mutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
                hold_writes: AtomicBool::new(false),
                write_started: Notify::new(),
                release: Notify::new(),
                scheduled_callbacks: AtomicUsize::new(0),
                link_disconnects: AtomicU32::new(0),
                current: Mutex::new(None),
            }),
        }
    }
}

pub struct FakeLink {
    shared: Arc<FakeShared>,
    connected: Arc<watch::Sender<bool>>,
    events: LinkEventSender,
}

#[async_trait]
impl GattLink for FakeLink {
    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn characteristics(&self) -> Vec<CharacteristicInfo> {
        self.shared.characteristics.lock().unwrap().clone()
    }

    async fn subscribe(&self, _uuid: &str) -> Result<()> {
        if self.shared.subscribe_fails.load(Ordering::SeqCst) {
            bail!("CCCD write rejected");
        }
        Ok(())
    }

    async fn write(&self, _uuid: &str, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            bail!("not connected");
        }
        if self.shared.hold_writes.load(Ordering::SeqCst) {
            let mut connected = self.connected.subscribe();
            self.shared.write_started.notify_one();
            tokio::select! {
                _ = connected.wait_for(|c| !*c) => bail!("link closed during write"),
                _ = self.shared.release.notified() => {}
            }
        }
        if self.shared.fail_writes.load(Ordering::SeqCst) || !self.is_connected() {
            bail!("write rejected");
        }
        self.shared.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.link_disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.send_replace(false);
        self.events.disconnected();
        Ok(())
    }
}

#[async_trait]
impl BluetoothHost for FakeHost {
    type Device = String;
    type Link = FakeLink;

    fn resolve_device(&self, address: &str) -> Option<String> {
        self.shared
            .device_present
            .load(Ordering::SeqCst)
            .then(|| address.to_string())
    }

    fn connectable_scanner_count(&self) -> usize {
        self.shared.scanner_count.load(Ordering::SeqCst)
    }

    fn schedule_callback(&self, callback: Box<dyn FnOnce() + Send>) {
        self.shared.scheduled_callbacks.fetch_add(1, Ordering::SeqCst);
        callback();
    }

    async fn connect(
        &self,
        _device: &String,
        events: LinkEventSender,
        _use_services_cache: bool,
    ) -> Result<FakeLink> {
        self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.shared.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.shared.failing_connects.store(failing - 1, Ordering::SeqCst);
            bail!("peripheral did not answer");
        }

        let connected = Arc::new(watch::channel(true).0);
        *self.shared.current.lock().unwrap() = Some((events.clone(), connected.clone()));
        Ok(FakeLink {
            shared: self.shared.clone(),
            connected,
            events,
        })
    }
}
