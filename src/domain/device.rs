use crate::error::{DriverError, Result};
use serde::Serialize;

/// Advertised name prefix of supported lamps
pub const DEVICE_NAME_PREFIX: &str = "tl100";

/// A supported lamp seen in an advertisement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedDevice {
    pub name: String,
    pub address: u64,
    pub signal_strength: i16,
}

impl ScannedDevice {
    pub fn mac(&self) -> String {
        u64_to_mac(self.address)
    }
}

/// Normalize a MAC address to lowercase colon form (`aa:bb:cc:dd:ee:ff`)
pub fn format_mac(address: &str) -> Result<String> {
    let hex: String = address
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DriverError::InvalidAddress(address.to_string()));
    }

    let hex = hex.to_ascii_lowercase();
    let octets: Vec<&str> = (0..6).map(|i| &hex[i * 2..i * 2 + 2]).collect();
    Ok(octets.join(":"))
}

/// 48-bit integer form used by the Windows bluetooth stack
pub fn mac_to_u64(address: &str) -> Result<u64> {
    let normalized = format_mac(address)?;
    u64::from_str_radix(&normalized.replace(':', ""), 16)
        .map_err(|_| DriverError::InvalidAddress(address.to_string()))
}

pub fn u64_to_mac(address: u64) -> String {
    (0..6)
        .rev()
        .map(|i| format!("{:02x}", (address >> (i * 8)) & 0xFF))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn is_supported_device_name(name: &str) -> bool {
    name.get(..DEVICE_NAME_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DEVICE_NAME_PREFIX))
}

/// Fallback display name, e.g. `Beurer TL100 EE:FF`
pub fn default_device_name(address: &str) -> String {
    let tail: String = address
        .chars()
        .rev()
        .take(5)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("Beurer TL100 {}", tail)
}
