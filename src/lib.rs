//! Driver for Beurer TL100 BLE lamps

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::effects::EffectCatalog;
pub use domain::light::{LightAttributes, TurnOnRequest};
pub use domain::models::{ColorMode, ConnectionStatus, DeviceState, Rgb};
pub use error::{DriverError, Result};
pub use infrastructure::bluetooth::{DriverConfig, LightDriver};
