//! Beurer TL100 Protocol
//!
//! Frame layout, command payloads and the brightness scale used on the wire.
//!
//! # Frame Structure
//!
//! ```text
//! [0xFE][0xEF][0x0A][len+7][0xAB][0xAA][len+2][payload ...][checksum][0x55][0x0D][0x0A]
//! checksum = (len+2) ^ payload[0] ^ ... ^ payload[len-1]
//! ```

use crate::domain::models::{ColorMode, Rgb};
use crate::error::{DriverError, Result};

/// Write characteristic of the TL100 vendor service
pub const WRITE_CHAR_UUID: &str = "8b00ace7-eb0b-49b0-bbe9-9aee0a26e1a3";

/// Notify characteristic carrying status frames
pub const READ_CHAR_UUID: &str = "0734594a-a8e7-4b1a-a6b1-cd5243059a57";

const HEADER: [u8; 2] = [0xFE, 0xEF];
const PROTOCOL_TAG: u8 = 0x0A;
const PAYLOAD_SYNC: [u8; 2] = [0xAB, 0xAA];
const TRAILER: [u8; 3] = [0x55, 0x0D, 0x0A];

/// Bytes around the payload: 7 header bytes, checksum, 3 trailer bytes
pub const FRAME_OVERHEAD: usize = 11;

/// Offset of the reply tag in a status notification
pub const REPLY_TAG_OFFSET: usize = 8;

/// Commands understood by the lamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCommand {
    /// Ask for a status notification of one engine
    RequestStatus(ColorMode),
    /// Brightness in percent (0-100)
    SetBrightness(ColorMode, u8),
    SetColor(Rgb),
    /// Effect index into the catalog
    SetEffect(u8),
    PowerOff(ColorMode),
    PowerOn(ColorMode),
}

impl LightCommand {
    /// Raw payload bytes for this command
    pub fn payload(&self) -> Vec<u8> {
        match *self {
            Self::RequestStatus(mode) => vec![0x30, mode.wire_tag()],
            Self::SetBrightness(mode, percent) => vec![0x31, mode.wire_tag(), percent.min(100)],
            Self::SetColor(Rgb { r, g, b }) => vec![0x32, r, g, b],
            Self::SetEffect(index) => vec![0x34, index],
            Self::PowerOff(mode) => vec![0x35, mode.wire_tag()],
            Self::PowerOn(mode) => vec![0x37, mode.wire_tag()],
        }
    }

    pub fn to_packet(&self) -> Packet {
        Packet::build(&self.payload())
    }
}

/// One framed message, built fresh for every send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet(Vec<u8>);

impl Packet {
    /// Wrap a command payload in the wire frame
    pub fn build(payload: &[u8]) -> Self {
        let len = payload.len() as u8;
        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&HEADER);
        frame.push(PROTOCOL_TAG);
        frame.push(len.wrapping_add(7));
        frame.extend_from_slice(&PAYLOAD_SYNC);
        frame.push(len.wrapping_add(2));
        frame.extend_from_slice(payload);
        frame.push(checksum(len.wrapping_add(2), payload));
        frame.extend_from_slice(&TRAILER);
        Self(frame)
    }

    /// Parse and validate a complete frame
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(DriverError::MalformedFrame(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..2] != HEADER || bytes[2] != PROTOCOL_TAG || bytes[4..6] != PAYLOAD_SYNC {
            return Err(DriverError::MalformedFrame("bad header".to_string()));
        }
        if bytes[bytes.len() - 3..] != TRAILER {
            return Err(DriverError::MalformedFrame("bad trailer".to_string()));
        }

        let payload_len = bytes.len() - FRAME_OVERHEAD;
        if bytes[3] as usize != payload_len + 7 || bytes[6] as usize != payload_len + 2 {
            return Err(DriverError::MalformedFrame(format!(
                "length bytes disagree with payload of {} bytes",
                payload_len
            )));
        }

        let packet = Self(bytes.to_vec());
        let expected = checksum(bytes[6], packet.payload());
        if packet.encoded_checksum() != expected {
            return Err(DriverError::MalformedFrame(format!(
                "checksum {:#04X} != {:#04X}",
                packet.encoded_checksum(),
                expected
            )));
        }
        Ok(packet)
    }

    pub fn payload(&self) -> &[u8] {
        &self.0[7..self.0.len() - 4]
    }

    /// Checksum byte carried in the frame
    pub fn encoded_checksum(&self) -> u8 {
        self.0[self.0.len() - 4]
    }

    /// Checksum recomputed from the length byte and payload
    pub fn computed_checksum(&self) -> u8 {
        checksum(self.0[6], self.payload())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// XOR-fold of the length byte and every payload byte
pub fn checksum(length_byte: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(length_byte, |acc, b| acc ^ b)
}

/// Device percent (0-100) to a 0-255 level, rounding half up
pub fn percent_to_level(percent: u8) -> u8 {
    let percent = percent.min(100) as u32;
    ((percent * 255 + 50) / 100) as u8
}

/// 0-255 level to the device's 0-100 percent scale, rounding to nearest
pub fn level_to_percent(level: u8) -> u8 {
    ((level as u32 * 100 + 127) / 255) as u8
}
