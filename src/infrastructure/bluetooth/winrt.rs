//! WinRT bluetooth host
//!
//! Discovery comes from the advertisement scanner. Links wrap a
//! `BluetoothLEDevice` and the GATT characteristics resolved on it.

use crate::domain::device::{mac_to_u64, ScannedDevice};
use crate::infrastructure::bluetooth::scanner::BleScanner;
use crate::infrastructure::bluetooth::transport::{
    BluetoothHost, CharacteristicInfo, GattLink, LinkEventSender,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCharacteristicProperties,
    GattClientCharacteristicConfigurationDescriptorValue, GattCommunicationStatus,
    GattDeviceService, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothCacheMode, BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};

const DISCOVERY_POLL: Duration = Duration::from_millis(250);

pub struct WinRtHost {
    scanner: Mutex<BleScanner>,
    runtime: Handle,
}

impl WinRtHost {
    /// Callbacks are scheduled onto `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            scanner: Mutex::new(BleScanner::new()),
            runtime,
        }
    }

    pub fn start_scan(&self) -> Result<()> {
        self.scanner
            .lock()
            .map_err(|_| anyhow!("scanner lock poisoned"))?
            .start()
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.scanner
            .lock()
            .map_err(|_| anyhow!("scanner lock poisoned"))?
            .stop()
    }

    pub fn discovered(&self) -> Vec<ScannedDevice> {
        self.scanner
            .lock()
            .map(|scanner| scanner.devices())
            .unwrap_or_default()
    }

    /// Poll the scan results until `address` shows up or `timeout` passes
    pub async fn wait_for_device(&self, address: &str, timeout: Duration) -> Option<ScannedDevice> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(device) = self.resolve_device(address) {
                return Some(device);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(DISCOVERY_POLL).await;
        }
    }
}

#[async_trait]
impl BluetoothHost for WinRtHost {
    type Device = ScannedDevice;
    type Link = WinRtLink;

    fn resolve_device(&self, address: &str) -> Option<ScannedDevice> {
        let address = mac_to_u64(address).ok()?;
        self.scanner.lock().ok()?.find(address)
    }

    fn connectable_scanner_count(&self) -> usize {
        match self.scanner.lock() {
            Ok(scanner) if scanner.is_scanning() => 1,
            _ => 0,
        }
    }

    fn schedule_callback(&self, callback: Box<dyn FnOnce() + Send>) {
        self.runtime.spawn(async move { callback() });
    }

    async fn connect(
        &self,
        device: &ScannedDevice,
        events: LinkEventSender,
        use_services_cache: bool,
    ) -> Result<WinRtLink> {
        WinRtLink::open(device.address, events, use_services_cache).await
    }
}

pub struct WinRtLink {
    device: BluetoothLEDevice,
    characteristics: Vec<(CharacteristicInfo, GattCharacteristic)>,
    events: LinkEventSender,
}

impl WinRtLink {
    async fn open(address: u64, events: LinkEventSender, use_services_cache: bool) -> Result<Self> {
        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;
        info!("Opened {:?} (link {})", device.Name()?, events.generation());

        let cache_mode = if use_services_cache {
            BluetoothCacheMode::Cached
        } else {
            BluetoothCacheMode::Uncached
        };

        let services: Vec<GattDeviceService> = {
            let result = device.GetGattServicesWithCacheModeAsync(cache_mode)?.await?;
            if result.Status()? != GattCommunicationStatus::Success {
                bail!("Failed to get GATT services: {:?}", result.Status()?);
            }
            let list = result.Services()?;
            (0..list.Size()?)
                .map(|i| list.GetAt(i))
                .collect::<windows::core::Result<_>>()?
        };

        let mut characteristics = Vec::new();
        for service in &services {
            let result = service
                .GetCharacteristicsWithCacheModeAsync(cache_mode)?
                .await?;
            if result.Status()? != GattCommunicationStatus::Success {
                debug!("Skipping service {:?}: {:?}", service.Uuid()?, result.Status()?);
                continue;
            }
            let list = result.Characteristics()?;
            for i in 0..list.Size()? {
                let characteristic = list.GetAt(i)?;
                characteristics.push((describe(&characteristic)?, characteristic));
            }
        }
        debug!("Resolved {} characteristics", characteristics.len());

        let sender = events.clone();
        let status_handler =
            TypedEventHandler::new(move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                if let Some(dev) = dev.as_ref() {
                    if dev.ConnectionStatus()? == BluetoothConnectionStatus::Disconnected {
                        sender.disconnected();
                    }
                }
                Ok(())
            });
        device.ConnectionStatusChanged(&status_handler)?;

        Ok(Self {
            device,
            characteristics,
            events,
        })
    }

    fn find(&self, uuid: &str) -> Result<&GattCharacteristic> {
        self.characteristics
            .iter()
            .find(|(info, _)| info.matches(uuid))
            .map(|(_, characteristic)| characteristic)
            .ok_or_else(|| anyhow!("characteristic {} not found", uuid))
    }
}

#[async_trait]
impl GattLink for WinRtLink {
    fn is_connected(&self) -> bool {
        self.device
            .ConnectionStatus()
            .map(|status| status == BluetoothConnectionStatus::Connected)
            .unwrap_or(false)
    }

    fn characteristics(&self) -> Vec<CharacteristicInfo> {
        self.characteristics
            .iter()
            .map(|(info, _)| info.clone())
            .collect()
    }

    async fn subscribe(&self, uuid: &str) -> Result<()> {
        let characteristic = self.find(uuid)?.clone();

        {
            let sender = self.events.clone();
            let data_handler = TypedEventHandler::new(
                move |_: windows::core::Ref<GattCharacteristic>,
                      args: windows::core::Ref<GattValueChangedEventArgs>| {
                    if let Some(args) = args.as_ref() {
                        if let Ok(value) = args.CharacteristicValue() {
                            match read_buffer(&value) {
                                Ok(bytes) => sender.notification(bytes),
                                Err(e) => warn!("Unreadable notification: {}", e),
                            }
                        }
                    }
                    Ok(())
                },
            );
            characteristic.ValueChanged(&data_handler)?;
        }

        let status = characteristic
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::Notify,
            )?
            .await?;
        if status != GattCommunicationStatus::Success {
            bail!("Notification subscription returned status: {:?}", status);
        }
        Ok(())
    }

    async fn write(&self, uuid: &str, data: &[u8]) -> Result<()> {
        let characteristic = self.find(uuid)?.clone();
        let operation = {
            let writer = DataWriter::new()?;
            writer.WriteBytes(data)?;
            let buffer = writer.DetachBuffer()?;
            characteristic.WriteValueAsync(&buffer)?
        };
        let status = operation.await?;
        if status != GattCommunicationStatus::Success {
            bail!("Write returned status: {:?}", status);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        for (_, characteristic) in &self.characteristics {
            if let Ok(service) = characteristic.Service() {
                let _ = service.Close();
            }
        }
        self.device.Close()?;
        Ok(())
    }
}

fn describe(characteristic: &GattCharacteristic) -> Result<CharacteristicInfo> {
    let properties = characteristic.CharacteristicProperties()?;
    Ok(CharacteristicInfo {
        uuid: format!("{:?}", characteristic.Uuid()?),
        can_write: properties.contains(GattCharacteristicProperties::Write)
            || properties.contains(GattCharacteristicProperties::WriteWithoutResponse),
        can_notify: properties.contains(GattCharacteristicProperties::Notify),
    })
}

fn read_buffer(buffer: &IBuffer) -> Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let mut bytes = vec![0u8; reader.UnconsumedBufferLength()? as usize];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}
