//! Light Driver
//!
//! Public surface of the lamp. Each operation turns an intent into ordered,
//! paced packet writes and ends with a status refresh; the answer arrives
//! later as notifications.

use crate::domain::effects::EffectCatalog;
use crate::domain::light::{LightAttributes, TurnOnRequest};
use crate::domain::models::{ColorMode, ConnectionStatus, DeviceState, Rgb};
use crate::infrastructure::bluetooth::connection::{ConnectionConfig, ConnectionManager};
use crate::infrastructure::bluetooth::protocol::{level_to_percent, LightCommand};
use crate::infrastructure::bluetooth::state::DeviceStateStore;
use crate::infrastructure::bluetooth::transport::BluetoothHost;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Delays that give the lamp time to process a command
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Between the white and color status queries
    pub status_gap: Duration,
    /// After color, color brightness and power off commands
    pub command_settle: Duration,
    /// After power on, before the status refresh
    pub power_settle: Duration,
    /// Between the steps replaying effect and color after a color power on
    pub restore_step: Duration,
    /// After a white brightness command
    pub white_settle: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            status_gap: Duration::from_millis(200),
            command_settle: Duration::from_millis(100),
            power_settle: Duration::from_millis(200),
            restore_step: Duration::from_millis(200),
            white_settle: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    pub connection: ConnectionConfig,
    pub pacing: Pacing,
    pub catalog: EffectCatalog,
}

const IDENTIFY_SETTLE: Duration = Duration::from_millis(1000);
const IDENTIFY_TOGGLE: Duration = Duration::from_millis(1500);
const IDENTIFY_TAIL: Duration = Duration::from_millis(500);

pub struct LightDriver<H: BluetoothHost> {
    name: String,
    connection: Arc<ConnectionManager<H>>,
    store: Arc<DeviceStateStore>,
    pacing: Pacing,
}

impl<H: BluetoothHost> LightDriver<H> {
    /// Create a driver for one lamp. Does not connect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        host: Arc<H>,
        address: impl Into<String>,
        name: impl Into<String>,
        config: DriverConfig,
    ) -> Self {
        let store = Arc::new(DeviceStateStore::new(config.catalog));
        let connection = ConnectionManager::new(host, address, config.connection, store.clone());
        Self {
            name: name.into(),
            connection,
            store,
            pacing: config.pacing,
        }
    }

    pub fn address(&self) -> &str {
        self.connection.address()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Called after every authoritative state change
    pub fn set_update_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.store.set_update_callback(Arc::new(callback));
    }

    /// Follow every state change, optimistic ones included
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.store.subscribe()
    }

    pub fn state(&self) -> DeviceState {
        self.store.snapshot()
    }

    pub fn is_on(&self) -> bool {
        self.store.snapshot().is_on()
    }

    pub fn rgb_color(&self) -> Rgb {
        self.store.snapshot().rgb
    }

    pub fn white_brightness(&self) -> u8 {
        self.store.snapshot().white_brightness
    }

    pub fn color_brightness(&self) -> u8 {
        self.store.snapshot().color_brightness
    }

    pub fn effect(&self) -> &'static str {
        self.store.snapshot().effect
    }

    pub fn color_mode(&self) -> ColorMode {
        self.store.snapshot().mode
    }

    pub fn supported_effects(&self) -> &'static [&'static str] {
        self.store.catalog().names()
    }

    /// True when some scanner can reach connectable devices
    pub fn available(&self) -> bool {
        self.connection.available()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn attributes(&self) -> LightAttributes {
        LightAttributes::from_state(&self.state(), self.store.catalog(), self.available())
    }

    pub async fn turn_on(&self) -> bool {
        let before = self.state();
        let mode = before.mode;
        debug!("Turning on (mode: {:?})", mode);
        self.store.modify(|s| s.set_mode_on(mode, true));

        if !self.send(LightCommand::PowerOn(mode)).await {
            return false;
        }

        // A color power-on comes up blank; replay what was shown before
        if mode == ColorMode::Rgb && !before.color_on && !self.restore_color().await {
            return false;
        }

        self.pause(self.pacing.power_settle).await;
        self.request_status().await
    }

    async fn restore_color(&self) -> bool {
        let state = self.state();
        let effect_index = self.store.catalog().index_of(state.effect);

        self.pause(self.pacing.restore_step).await;
        if !self.send(LightCommand::SetEffect(effect_index)).await {
            return false;
        }
        self.pause(self.pacing.restore_step).await;
        if !self.send(LightCommand::SetColor(state.rgb)).await {
            return false;
        }
        if state.color_brightness > 0 {
            let percent = level_to_percent(state.color_brightness);
            return self
                .send(LightCommand::SetBrightness(ColorMode::Rgb, percent))
                .await;
        }
        true
    }

    /// Switch both engines off, whichever was on
    pub async fn turn_off(&self) -> bool {
        debug!("Turning off");
        self.store.modify(DeviceState::mark_all_off);

        if !self.send(LightCommand::PowerOff(ColorMode::White)).await {
            return false;
        }
        if !self.send(LightCommand::PowerOff(ColorMode::Rgb)).await {
            return false;
        }
        self.pause(self.pacing.command_settle).await;
        self.request_status().await
    }

    pub async fn set_color(&self, rgb: Rgb) -> bool {
        debug!("Setting color: {:?}", rgb);
        self.store.modify(|s| {
            s.mode = ColorMode::Rgb;
            s.rgb = rgb;
        });

        if !self.ensure_mode_on(ColorMode::Rgb).await {
            return false;
        }
        if !self.send(LightCommand::SetColor(rgb)).await {
            return false;
        }
        self.pause(self.pacing.command_settle).await;
        self.request_status().await
    }

    /// Color engine brightness, 0-255
    pub async fn set_color_brightness(&self, level: u8) -> bool {
        debug!("Setting color brightness: {}", level);
        self.set_brightness(ColorMode::Rgb, level, self.pacing.command_settle)
            .await
    }

    /// White engine brightness, 0-255
    pub async fn set_white(&self, level: u8) -> bool {
        debug!("Setting white intensity: {}", level);
        self.set_brightness(ColorMode::White, level, self.pacing.white_settle)
            .await
    }

    async fn set_brightness(&self, mode: ColorMode, level: u8, settle: Duration) -> bool {
        self.store.modify(|s| {
            s.mode = mode;
            s.set_brightness(mode, level);
        });

        if !self.ensure_mode_on(mode).await {
            return false;
        }
        let percent = level_to_percent(level);
        if !self.send(LightCommand::SetBrightness(mode, percent)).await {
            return false;
        }
        self.pause(settle).await;
        self.request_status().await
    }

    /// Unknown names select the catalog's "no effect" entry
    pub async fn set_effect(&self, name: &str) -> bool {
        debug!("Setting effect: {}", name);
        let catalog = self.store.catalog();
        let index = catalog.index_of(name);
        let effect = catalog.name_at(index);
        self.store.modify(|s| {
            s.mode = ColorMode::Rgb;
            s.effect = effect;
        });

        if !self.ensure_mode_on(ColorMode::Rgb).await {
            return false;
        }
        if !self.send(LightCommand::SetEffect(index)).await {
            return false;
        }
        self.request_status().await
    }

    /// Host-style turn on: brightness for the current mode, then color, then effect
    pub async fn turn_on_with(&self, request: TurnOnRequest) -> bool {
        debug!("Turn on with {:?}", request);
        if request.is_empty() {
            return self.turn_on().await;
        }

        if let Some(level) = request.brightness {
            let ok = match self.color_mode() {
                ColorMode::White => self.set_white(level).await,
                ColorMode::Rgb => self.set_color_brightness(level).await,
            };
            if !ok {
                return false;
            }
        }
        if let Some(rgb) = request.rgb {
            if !self.set_color(rgb).await {
                return false;
            }
        }
        if let Some(effect) = request.effect {
            if !self.set_effect(&effect).await {
                return false;
            }
        }
        true
    }

    /// Refresh state from the device. Fails without side effects when the
    /// lamp cannot be reached.
    pub async fn update(&self) -> bool {
        if !self.connection.ensure_connected().await {
            warn!("Cannot update {}: not connected", self.name);
            return false;
        }
        debug!("Requesting status update");
        self.request_status().await
    }

    /// Blink the lamp so a user can tell which device this is. Always leaves
    /// the link disconnected.
    pub async fn identify(&self) -> bool {
        info!("Identifying {} ({})", self.name, self.address());
        let reached = self.update().await;
        if reached {
            tokio::time::sleep(IDENTIFY_SETTLE).await;
            if self.is_on() {
                self.turn_off().await;
                tokio::time::sleep(IDENTIFY_TOGGLE).await;
                self.turn_on().await;
            } else {
                self.turn_on().await;
                tokio::time::sleep(IDENTIFY_TOGGLE).await;
                self.turn_off().await;
            }
            tokio::time::sleep(IDENTIFY_TAIL).await;
        }
        self.disconnect().await;
        reached
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Ask for both status notifications
    pub async fn request_status(&self) -> bool {
        if !self.send(LightCommand::RequestStatus(ColorMode::White)).await {
            return false;
        }
        self.pause(self.pacing.status_gap).await;
        self.send(LightCommand::RequestStatus(ColorMode::Rgb)).await
    }

    async fn ensure_mode_on(&self, mode: ColorMode) -> bool {
        if self.state().is_mode_on(mode) {
            return true;
        }
        self.turn_on().await
    }

    async fn send(&self, command: LightCommand) -> bool {
        let packet = command.to_packet();
        self.connection.write(packet.as_bytes()).await
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
