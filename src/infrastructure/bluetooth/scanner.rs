//! BLE Scanner Module
//!
//! Watches advertisements and remembers every connectable TL100 it hears.

use crate::domain::device::{is_supported_device_name, ScannedDevice};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

type SeenDevices = Arc<Mutex<HashMap<u64, ScannedDevice>>>;

pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
    seen: SeenDevices,
}

impl BleScanner {
    pub fn new() -> Self {
        Self {
            watcher: None,
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start (or restart) active scanning
    pub fn start(&mut self) -> Result<()> {
        self.stop()?;
        info!("Starting BLE scan for TL100 lamps");

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let seen = self.seen.clone();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    if !args.IsConnectable().unwrap_or(true) {
                        return Ok(());
                    }
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    if !is_supported_device_name(&name) {
                        return Ok(());
                    }

                    let device = ScannedDevice {
                        name,
                        address: args.BluetoothAddress()?,
                        signal_strength: args.RawSignalStrengthInDBm()?,
                    };
                    if let Ok(mut seen) = seen.lock() {
                        if !seen.contains_key(&device.address) {
                            debug!("Found {} at {}", device.name, device.mac());
                        }
                        seen.insert(device.address, device);
                    }
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan...");
            watcher.Stop()?;
        }
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.watcher.is_some()
    }

    /// Devices heard so far, strongest signal first
    pub fn devices(&self) -> Vec<ScannedDevice> {
        let mut devices: Vec<ScannedDevice> = self
            .seen
            .lock()
            .map(|seen| seen.values().cloned().collect())
            .unwrap_or_default();
        devices.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
        devices
    }

    pub fn find(&self, address: u64) -> Option<ScannedDevice> {
        self.seen.lock().ok()?.get(&address).cloned()
    }
}

impl Default for BleScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
