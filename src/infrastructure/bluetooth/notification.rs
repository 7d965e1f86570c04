//! Status notification decoding
//!
//! The lamp never answers a write directly. Status arrives as notifications
//! whose byte 8 (the reply tag) selects the layout:
//!
//! ```text
//! tag 1   white status : [9] on flag, [10] brightness percent
//! tag 2   color status : [9] on flag, [10] brightness percent,
//!                        [13..16] R G B (len >= 16), [16] effect index (len > 16)
//! tag 255 device off
//! tag 0   device shutting down
//! ```

use crate::domain::effects::EffectCatalog;
use crate::domain::models::{ColorMode, DeviceState, Rgb};
use crate::infrastructure::bluetooth::protocol::{percent_to_level, REPLY_TAG_OFFSET};
use tracing::{debug, trace};

const TAG_SHUTTING_DOWN: u8 = 0;
const TAG_WHITE_STATUS: u8 = 1;
const TAG_COLOR_STATUS: u8 = 2;
const TAG_DEVICE_OFF: u8 = 255;

/// Shortest frame carrying a reply tag
pub const MIN_STATUS_LEN: usize = REPLY_TAG_OFFSET + 1;

/// Shortest white status frame (on flag present)
const MIN_WHITE_STATUS_LEN: usize = 10;

/// Shortest color status frame (on flag and brightness present)
const MIN_COLOR_STATUS_LEN: usize = 11;

/// Follow-up work the driver performs after applying a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Fire the external update callback
    NotifyUpdate,
    /// Device announced shutdown: disconnect, flagged as expected
    ExpectedDisconnect,
}

/// Decode `frame` against `current` and return the new state plus the
/// side effects to run. Unknown or truncated frames leave the state as is.
pub fn interpret(
    current: &DeviceState,
    frame: &[u8],
    catalog: &EffectCatalog,
) -> (DeviceState, Vec<SideEffect>) {
    trace!("Notification: {:02X?}", frame);
    let mut state = current.clone();

    if frame.len() < MIN_STATUS_LEN {
        return (state, Vec::new());
    }

    let tag = frame[REPLY_TAG_OFFSET];
    debug!("Reply tag: {}", tag);

    match tag {
        TAG_WHITE_STATUS if frame.len() >= MIN_WHITE_STATUS_LEN => {
            state.white_on = frame[9] == 1;
            if state.white_on {
                if let Some(&percent) = frame.get(10) {
                    state.white_brightness = brightness_from_percent(percent);
                }
                state.mode = ColorMode::White;
            }
            debug!(
                "White status - on: {}, brightness: {}",
                state.white_on, state.white_brightness
            );
            (state, Vec::new())
        }
        TAG_COLOR_STATUS if frame.len() >= MIN_COLOR_STATUS_LEN => {
            state.color_on = frame[9] == 1;
            if state.color_on {
                state.mode = ColorMode::Rgb;
                if frame.len() > 16 {
                    state.effect = catalog.name_at(frame[16]);
                }
            }
            state.color_brightness = brightness_from_percent(frame[10]);
            if frame.len() >= 16 {
                state.rgb = Rgb::new(frame[13], frame[14], frame[15]);
            }
            debug!(
                "Color status - on: {}, brightness: {}, rgb: {:?}, effect: {}",
                state.color_on, state.color_brightness, state.rgb, state.effect
            );
            (state, vec![SideEffect::NotifyUpdate])
        }
        TAG_DEVICE_OFF => {
            state.mark_all_off();
            debug!("Device off");
            (state, vec![SideEffect::NotifyUpdate])
        }
        TAG_SHUTTING_DOWN => {
            debug!("Device shutting down");
            (state, vec![SideEffect::ExpectedDisconnect])
        }
        _ => (state, Vec::new()),
    }
}

/// A reported 0% means "unknown" and reads as full brightness
fn brightness_from_percent(percent: u8) -> u8 {
    if percent == 0 {
        255
    } else {
        percent_to_level(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xFE, 0xEF, 0x0A, 0x00, 0xAB, 0xAA, 0x00, 0x00, tag];
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_white_status_on() {
        let state = DeviceState::default();
        let (next, effects) = interpret(&state, &frame(1, &[1, 50]), &EffectCatalog::default());
        assert!(next.white_on);
        assert!(next.is_on());
        assert!((127..=128).contains(&next.white_brightness));
        assert_eq!(next.mode, ColorMode::White);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_white_zero_percent_defaults_to_full() {
        let mut state = DeviceState::default();
        state.white_brightness = 10;
        let (next, _) = interpret(&state, &frame(1, &[1, 0]), &EffectCatalog::default());
        assert_eq!(next.white_brightness, 255);
    }

    #[test]
    fn test_white_off_keeps_brightness_and_mode() {
        let mut state = DeviceState::default();
        state.mode = ColorMode::Rgb;
        state.white_on = true;
        state.white_brightness = 40;
        let (next, _) = interpret(&state, &frame(1, &[0, 80]), &EffectCatalog::default());
        assert!(!next.white_on);
        assert_eq!(next.white_brightness, 40);
        assert_eq!(next.mode, ColorMode::Rgb);
    }

    #[test]
    fn test_color_status_full_snapshot() {
        let state = DeviceState::default();
        // [9]=on [10]=100% [11..13]=reserved [13..16]=rgb [16]=effect
        let bytes = frame(2, &[1, 100, 0, 0, 10, 20, 30, 2]);
        let (next, effects) = interpret(&state, &bytes, &EffectCatalog::default());
        assert!(next.color_on);
        assert_eq!(next.mode, ColorMode::Rgb);
        assert_eq!(next.color_brightness, 255);
        assert_eq!(next.rgb, Rgb::new(10, 20, 30));
        assert_eq!(next.effect, "Rainbow");
        assert_eq!(effects, vec![SideEffect::NotifyUpdate]);
    }

    #[test]
    fn test_color_status_without_effect_byte() {
        let mut state = DeviceState::default();
        state.effect = "Chill";
        let bytes = frame(2, &[1, 20, 0, 0, 1, 2, 3]);
        assert_eq!(bytes.len(), 16);
        let (next, _) = interpret(&state, &bytes, &EffectCatalog::default());
        assert_eq!(next.rgb, Rgb::new(1, 2, 3));
        assert_eq!(next.effect, "Chill");
        assert_eq!(next.color_brightness, 51);
    }

    #[test]
    fn test_color_effect_index_clamps() {
        let bytes = frame(2, &[1, 100, 0, 0, 0, 0, 0, 200]);
        let (next, _) = interpret(&DeviceState::default(), &bytes, &EffectCatalog::default());
        assert_eq!(next.effect, "Summer");
    }

    #[test]
    fn test_device_off() {
        let mut state = DeviceState::default();
        state.white_on = true;
        state.color_on = true;
        let (next, effects) = interpret(&state, &frame(255, &[]), &EffectCatalog::default());
        assert!(!next.is_on());
        assert!(!next.white_on);
        assert!(!next.color_on);
        assert_eq!(effects, vec![SideEffect::NotifyUpdate]);
    }

    #[test]
    fn test_shutdown_requests_expected_disconnect() {
        let state = DeviceState::default();
        let (next, effects) = interpret(&state, &frame(0, &[]), &EffectCatalog::default());
        assert_eq!(next, state);
        assert_eq!(effects, vec![SideEffect::ExpectedDisconnect]);
    }

    #[test]
    fn test_short_and_unknown_frames_are_ignored() {
        let mut state = DeviceState::default();
        state.white_on = true;
        let catalog = EffectCatalog::default();

        let (next, effects) = interpret(&state, &[0xFE, 0xEF, 0x0A, 0, 0, 0, 0, 0], &catalog);
        assert_eq!(next, state);
        assert!(effects.is_empty());

        let (next, effects) = interpret(&state, &frame(7, &[1, 1]), &catalog);
        assert_eq!(next, state);
        assert!(effects.is_empty());

        let (next, effects) = interpret(&state, &frame(2, &[1]), &catalog);
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_short_white_status_still_reports_power() {
        let mut state = DeviceState::default();
        state.white_on = true;
        state.white_brightness = 40;
        let catalog = EffectCatalog::default();

        let (next, _) = interpret(&state, &frame(1, &[0]), &catalog);
        assert!(!next.white_on);
        assert_eq!(next.white_brightness, 40);

        // On without a brightness byte keeps the cached level
        let (next, _) = interpret(&next, &frame(1, &[1]), &catalog);
        assert!(next.white_on);
        assert_eq!(next.white_brightness, 40);
        assert_eq!(next.mode, ColorMode::White);
    }
}
