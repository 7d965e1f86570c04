use crate::domain::device::format_mac;
use crate::infrastructure::bluetooth::connection::ConnectionConfig;
use crate::infrastructure::bluetooth::protocol::{READ_CHAR_UUID, WRITE_CHAR_UUID};
use crate::infrastructure::bluetooth::service::{DriverConfig, Pacing};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "beurer_light".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub use_services_cache: bool,
    #[serde(default = "default_write_uuids")]
    pub write_char_uuids: Vec<String>,
    #[serde(default = "default_read_uuids")]
    pub read_char_uuids: Vec<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_connect_attempts: default_max_connect_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            use_services_cache: default_true(),
            write_char_uuids: default_write_uuids(),
            read_char_uuids: default_read_uuids(),
        }
    }
}

fn default_max_connect_attempts() -> u32 {
    2
}
fn default_connect_retry_delay_ms() -> u64 {
    250
}
fn default_write_uuids() -> Vec<String> {
    vec![WRITE_CHAR_UUID.to_string()]
}
fn default_read_uuids() -> Vec<String> {
    vec![READ_CHAR_UUID.to_string()]
}

/// Command pacing in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingSettings {
    #[serde(default = "default_200")]
    pub status_gap: u64,
    #[serde(default = "default_100")]
    pub command_settle: u64,
    #[serde(default = "default_200")]
    pub power_settle: u64,
    #[serde(default = "default_200")]
    pub restore_step: u64,
    #[serde(default = "default_200")]
    pub white_settle: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            status_gap: default_200(),
            command_settle: default_100(),
            power_settle: default_200(),
            restore_step: default_200(),
            white_settle: default_200(),
        }
    }
}

fn default_100() -> u64 {
    100
}
fn default_200() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub device_address: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub known_addresses: Vec<String>,

    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub pacing: PacingSettings,

    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: None,
            device_name: None,
            known_addresses: Vec::new(),
            connection: ConnectionSettings::default(),
            pacing: PacingSettings::default(),
            scan_timeout_secs: default_scan_timeout_secs(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_scan_timeout_secs() -> u64 {
    10
}

impl Settings {
    /// Runtime configuration for the driver
    pub fn driver_config(&self) -> DriverConfig {
        let c = &self.connection;
        let p = &self.pacing;
        DriverConfig {
            connection: ConnectionConfig {
                max_connect_attempts: c.max_connect_attempts,
                connect_retry_delay: Duration::from_millis(c.connect_retry_delay_ms),
                use_services_cache: c.use_services_cache,
                write_char_uuids: c.write_char_uuids.clone(),
                read_char_uuids: c.read_char_uuids.clone(),
            },
            pacing: Pacing {
                status_gap: Duration::from_millis(p.status_gap),
                command_settle: Duration::from_millis(p.command_settle),
                power_settle: Duration::from_millis(p.power_settle),
                restore_step: Duration::from_millis(p.restore_step),
                white_settle: Duration::from_millis(p.white_settle),
            },
            ..Default::default()
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load(settings_path))
    }

    /// Load from `settings_path`, falling back to defaults when the file is
    /// missing or unreadable
    pub fn load(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BeurerLight");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.settings_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)
            .with_context(|| format!("Could not write {}", self.settings_path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Remember a device that answered, and make it the default one
    pub fn remember_device(&mut self, address: &str, name: Option<&str>) -> anyhow::Result<()> {
        let address = format_mac(address)?;
        if !self.settings.known_addresses.contains(&address) {
            self.settings.known_addresses.push(address.clone());
        }
        self.settings.device_address = Some(address);
        if let Some(name) = name {
            self.settings.device_name = Some(name.to_string());
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("beurer_light_{}_{}", tag, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "device_address": "aa:bb:cc:dd:ee:ff", "pacing": { "status_gap": 50 } }"#)
                .unwrap();
        assert_eq!(settings.device_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(settings.pacing.status_gap, 50);
        assert_eq!(settings.pacing.command_settle, 100);
        assert_eq!(settings.connection.max_connect_attempts, 2);
        assert_eq!(settings.scan_timeout_secs, 10);
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn test_driver_config_projection() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        let config = settings.driver_config();
        assert_eq!(config.connection.max_connect_attempts, 2);
        assert_eq!(config.connection.write_char_uuids, vec![WRITE_CHAR_UUID.to_string()]);
        assert_eq!(config.pacing.status_gap, Duration::from_millis(200));
        assert_eq!(config.pacing.command_settle, Duration::from_millis(100));
        assert_eq!(config.catalog.len(), 11);
    }

    #[test]
    fn test_remember_device_round_trips_through_disk() {
        let path = temp_settings_path("remember");
        let mut service = SettingsService::load(path.clone());
        service
            .remember_device("AA-BB-CC-DD-EE-FF", Some("Bedroom"))
            .unwrap();
        service.remember_device("aa:bb:cc:dd:ee:ff", None).unwrap();

        let reloaded = SettingsService::load(path.clone());
        assert_eq!(reloaded.get().known_addresses, vec!["aa:bb:cc:dd:ee:ff"]);
        assert_eq!(reloaded.get().device_name.as_deref(), Some("Bedroom"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_remember_device_rejects_bad_address() {
        let mut service = SettingsService::load(temp_settings_path("bad"));
        assert!(service.remember_device("not-a-mac", None).is_err());
        assert!(service.get().known_addresses.is_empty());
    }
}
