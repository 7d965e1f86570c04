use crate::domain::effects::EffectCatalog;
use serde::{Deserialize, Serialize};

/// Which of the two light engines a command or status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMode {
    #[default]
    White,
    Rgb,
}

impl ColorMode {
    /// Sub-tag used by the power and brightness commands
    pub fn wire_tag(self) -> u8 {
        match self {
            Self::White => 0x01,
            Self::Rgb => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale so the largest channel becomes 255. Black stays black.
    pub fn scaled_to_max(self) -> Rgb {
        let max = self.r.max(self.g).max(self.b);
        if max == 0 {
            return self;
        }
        let scale = |c: u8| ((c as u32 * 255 + max as u32 / 2) / max as u32).min(255) as u8;
        Rgb::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

/// Last known state of the lamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub mode: ColorMode,
    pub white_on: bool,
    pub color_on: bool,
    pub rgb: Rgb,
    pub white_brightness: u8,
    pub color_brightness: u8,
    pub effect: &'static str,
}

impl DeviceState {
    pub fn new(catalog: &EffectCatalog) -> Self {
        Self {
            mode: ColorMode::White,
            white_on: false,
            color_on: false,
            rgb: Rgb::WHITE,
            white_brightness: 255,
            color_brightness: 255,
            effect: catalog.name_at(0),
        }
    }

    pub fn is_on(&self) -> bool {
        self.white_on || self.color_on
    }

    /// On flag of the given engine
    pub fn is_mode_on(&self, mode: ColorMode) -> bool {
        match mode {
            ColorMode::White => self.white_on,
            ColorMode::Rgb => self.color_on,
        }
    }

    pub fn set_mode_on(&mut self, mode: ColorMode, on: bool) {
        match mode {
            ColorMode::White => self.white_on = on,
            ColorMode::Rgb => self.color_on = on,
        }
    }

    /// Brightness of the given engine
    pub fn brightness(&self, mode: ColorMode) -> u8 {
        match mode {
            ColorMode::White => self.white_brightness,
            ColorMode::Rgb => self.color_brightness,
        }
    }

    pub fn set_brightness(&mut self, mode: ColorMode, level: u8) {
        match mode {
            ColorMode::White => self.white_brightness = level,
            ColorMode::Rgb => self.color_brightness = level,
        }
    }

    pub fn mark_all_off(&mut self) {
        self.white_on = false;
        self.color_on = false;
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(&EffectCatalog::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Events pushed by the transport from its own execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Notification(Vec<u8>),
    Disconnected,
}
