use anyhow::Result;
use beurer_light::domain::effects::EffectCatalog;
use beurer_light::domain::settings::SettingsService;
use beurer_light::infrastructure::logging::init_logger;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "beurer-light")]
#[command(about = "Control a Beurer TL100 lamp over Bluetooth LE")]
#[command(version)]
struct Args {
    /// Lamp MAC address; defaults to the last lamp that answered
    #[arg(short, long)]
    address: Option<String>,

    /// Display name used in logs
    #[arg(short, long)]
    name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the lamp state
    Status,
    /// Power on, restoring the last mode
    On,
    Off,
    /// Switch to color mode with this color
    Color { r: u8, g: u8, b: u8 },
    /// Brightness of the active mode (0-255)
    Brightness { level: u8 },
    /// Switch to white mode at this brightness (0-255)
    White { level: u8 },
    /// Start a named effect
    Effect { name: String },
    /// List effect names
    Effects,
    /// Blink the lamp
    Identify,
    /// List lamps in range
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = SettingsService::new()?;
    let _log_guard = init_logger(&settings.get().log_settings, args.log_level.as_deref())?;
    info!("Settings loaded from {}", settings.path().display());

    if let Command::Effects = args.command {
        for name in EffectCatalog::default().names() {
            println!("{}", name);
        }
        return Ok(());
    }

    run(args, &mut settings).await
}

#[cfg(not(windows))]
async fn run(_args: Args, _settings: &mut SettingsService) -> Result<()> {
    anyhow::bail!("Bluetooth access is only available on Windows")
}

#[cfg(windows)]
async fn run(args: Args, settings: &mut SettingsService) -> Result<()> {
    use anyhow::Context;
    use beurer_light::domain::device::{default_device_name, format_mac};
    use beurer_light::infrastructure::bluetooth::winrt::WinRtHost;
    use beurer_light::{DriverError, LightDriver};
    use std::sync::Arc;
    use tracing::debug;

    let host = Arc::new(WinRtHost::new(tokio::runtime::Handle::current()));
    host.start_scan()?;
    let scan_timeout = settings.get().scan_timeout();

    if let Command::Scan = args.command {
        tokio::time::sleep(scan_timeout).await;
        host.stop_scan()?;
        for device in host.discovered() {
            println!("{}  {:<16} {} dBm", device.mac(), device.name, device.signal_strength);
        }
        return Ok(());
    }

    let address = args
        .address
        .clone()
        .or_else(|| settings.get().device_address.clone())
        .context("No lamp address given and none remembered; run `scan` first")?;
    let address = format_mac(&address)?;

    info!("Waiting for {} to advertise...", address);
    host.wait_for_device(&address, scan_timeout)
        .await
        .ok_or_else(|| DriverError::DeviceNotFound(address.clone()))?;

    let name = args
        .name
        .clone()
        .or_else(|| settings.get().device_name.clone())
        .unwrap_or_else(|| default_device_name(&address));
    let driver = LightDriver::new(host.clone(), address.clone(), name, settings.get().driver_config());
    driver.set_update_callback(|| debug!("Lamp state updated"));

    let mut states = driver.subscribe();
    let accepted = execute(&driver, &args.command).await;

    if accepted {
        // Skip the optimistic update; wait for the lamp's own status
        states.borrow_and_update();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), states.changed()).await;
        println!("{}", serde_json::to_string_pretty(&driver.attributes())?);
        settings.remember_device(&address, args.name.as_deref())?;
    }

    driver.disconnect().await;
    host.stop_scan()?;

    if !accepted {
        anyhow::bail!("{} did not accept the command", driver.name());
    }
    Ok(())
}

#[cfg(windows)]
async fn execute<H>(driver: &beurer_light::LightDriver<H>, command: &Command) -> bool
where
    H: beurer_light::infrastructure::bluetooth::transport::BluetoothHost,
{
    use beurer_light::{Rgb, TurnOnRequest};

    match command {
        Command::Status => driver.update().await,
        Command::On => driver.turn_on().await,
        Command::Off => driver.turn_off().await,
        Command::Color { r, g, b } => driver.set_color(Rgb::new(*r, *g, *b)).await,
        Command::Brightness { level } => {
            driver
                .turn_on_with(TurnOnRequest {
                    brightness: Some(*level),
                    ..Default::default()
                })
                .await
        }
        Command::White { level } => driver.set_white(*level).await,
        Command::Effect { name } => driver.set_effect(name).await,
        Command::Identify => driver.identify().await,
        Command::Effects | Command::Scan => true,
    }
}
