//! What a host light entity shows and asks for
use crate::domain::effects::EffectCatalog;
use crate::domain::models::{ColorMode, DeviceState, Rgb};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightAttributes {
    pub is_on: bool,
    /// Brightness of the active engine, 1-255
    pub brightness: u8,
    /// Color scaled to full intensity; brightness is reported separately
    pub rgb: Rgb,
    pub effect: &'static str,
    pub effect_list: &'static [&'static str],
    pub color_mode: ColorMode,
    pub available: bool,
}

impl LightAttributes {
    pub fn from_state(state: &DeviceState, catalog: &EffectCatalog, available: bool) -> Self {
        let brightness = match state.brightness(state.mode) {
            0 => 255,
            level => level,
        };
        // Effects only run on the color engine
        let effect = match state.mode {
            ColorMode::White => catalog.name_at(0),
            ColorMode::Rgb => state.effect,
        };

        Self {
            is_on: state.is_on(),
            brightness,
            rgb: state.rgb.scaled_to_max(),
            effect,
            effect_list: catalog.names(),
            color_mode: state.mode,
            available,
        }
    }
}

/// Parameters of a host "turn on" call; all empty means plain power on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOnRequest {
    pub brightness: Option<u8>,
    pub rgb: Option<Rgb>,
    pub effect: Option<String>,
}

impl TurnOnRequest {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none() && self.rgb.is_none() && self.effect.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_mode_reports_white_brightness_and_no_effect() {
        let mut state = DeviceState::default();
        state.white_on = true;
        state.white_brightness = 90;
        state.color_brightness = 10;
        state.effect = "Pulse";

        let attrs = LightAttributes::from_state(&state, &EffectCatalog::default(), true);
        assert!(attrs.is_on);
        assert_eq!(attrs.brightness, 90);
        assert_eq!(attrs.effect, "Off");
        assert_eq!(attrs.effect_list.len(), 11);
    }

    #[test]
    fn test_rgb_mode_scales_color() {
        let mut state = DeviceState::default();
        state.mode = ColorMode::Rgb;
        state.color_on = true;
        state.rgb = Rgb::new(0, 64, 128);
        state.color_brightness = 0;
        state.effect = "Wave";

        let attrs = LightAttributes::from_state(&state, &EffectCatalog::default(), false);
        assert_eq!(attrs.rgb, Rgb::new(0, 128, 255));
        assert_eq!(attrs.brightness, 255);
        assert_eq!(attrs.effect, "Wave");
        assert!(!attrs.available);
    }

    #[test]
    fn test_empty_request() {
        assert!(TurnOnRequest::default().is_empty());
        let request = TurnOnRequest {
            brightness: Some(10),
            ..Default::default()
        };
        assert!(!request.is_empty());
    }
}
