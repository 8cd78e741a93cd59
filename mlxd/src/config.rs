// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The daemon configuration file.
//!
//! Every field has a default, so an empty (or missing) file gives the same behavior as the
//! stock setup: `/dev/i2c-1`, 4Hz, and frames written to `/var/run/mlx90621.sock` every 100ms.

use std::convert::TryFrom;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use mlx90621::{AcquisitionSettings, AmbientFallback, BusAddresses, RefreshRate};

use crate::cli::Cli;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bus: BusConfig,
    pub sensor: SensorConfig,
    pub acquisition: AcquisitionConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// The I²C bus device.
    pub device: PathBuf,
    pub eeprom_address: u8,
    pub device_address: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        let addresses = BusAddresses::default();
        Self {
            device: PathBuf::from("/dev/i2c-1"),
            eeprom_address: addresses.eeprom,
            device_address: addresses.device,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    /// Refresh rate in Hz. Has to be one of the rates the sensor supports (0.5 through 512).
    pub refresh_rate: f32,

    /// Use this emissivity instead of the one in the EEPROM.
    pub emissivity: Option<f32>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 4.0,
            emissivity: None,
        }
    }
}

/// The ambient fallback policy, as spelled in the configuration file.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Fallback {
    #[default]
    UseLastComputed,
    KeepLastGood,
    Refuse,
}

impl From<Fallback> for AmbientFallback {
    fn from(fallback: Fallback) -> Self {
        match fallback {
            Fallback::UseLastComputed => AmbientFallback::UseLastComputed,
            Fallback::KeepLastGood => AmbientFallback::KeepLastGood,
            Fallback::Refuse => AmbientFallback::Refuse,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    pub frame_interval_ms: u32,
    pub startup_delay_ms: u32,
    /// Upper bound (℃) for a believable ambient temperature.
    pub ambient_limit: f32,
    pub ambient_retries: u32,
    pub ambient_retry_pause_ms: u32,
    pub ambient_fallback: Fallback,
    pub brown_out_pause_ms: u32,
    /// Give up on a sensor that stays browned out after this many attempts. Unset waits forever.
    pub brown_out_max_attempts: Option<u32>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let settings = AcquisitionSettings::default();
        Self {
            frame_interval_ms: settings.frame_interval,
            startup_delay_ms: settings.startup_delay,
            ambient_limit: settings.ambient_limit,
            ambient_retries: settings.ambient_retries,
            ambient_retry_pause_ms: settings.ambient_retry_pause,
            ambient_fallback: Fallback::default(),
            brown_out_pause_ms: settings.brown_out_pause,
            brown_out_max_attempts: settings.brown_out_max_attempts,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// The named pipe frames are written to.
    pub fifo: PathBuf,

    /// How often to check for a reader when nothing has the pipe open.
    pub reader_poll_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fifo: PathBuf::from("/var/run/mlx90621.sock"),
            reader_poll_ms: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directives, same syntax as `RUST_LOG`. Unset defers to `RUST_LOG`, then `info`.
    pub level: Option<String>,
}

pub fn load_toml(s: &str) -> Result<Config> {
    toml::from_str::<Config>(s).context("invalid configuration")
}

impl Config {
    /// Read and parse a configuration file. This does not validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        load_toml(&contents).with_context(|| format!("in {}", path.display()))
    }

    /// Layer the command line flags on top.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(bus) = &cli.bus {
            self.bus.device = bus.clone();
        }
        if let Some(fifo) = &cli.fifo {
            self.output.fifo = fifo.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = Some(level.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Bus
        if self.bus.eeprom_address == self.bus.device_address {
            bail!(
                "bus.eeprom_address and bus.device_address must differ (both {:#04x})",
                self.bus.device_address
            );
        }
        if self.bus.eeprom_address > 0x7F || self.bus.device_address > 0x7F {
            bail!("bus addresses must be 7-bit");
        }

        // Sensor
        self.refresh_rate()?;
        if let Some(emissivity) = self.sensor.emissivity {
            if !(emissivity > 0.0 && emissivity <= 1.0) {
                bail!("sensor.emissivity must be in (0.0, 1.0]");
            }
        }

        // Acquisition
        if self.acquisition.frame_interval_ms == 0 {
            bail!("acquisition.frame_interval_ms must be >= 1");
        }
        if !(self.acquisition.ambient_limit.is_finite() && self.acquisition.ambient_limit > 0.0) {
            bail!("acquisition.ambient_limit must be a positive number");
        }

        // Output
        if self.output.fifo.as_os_str().is_empty() {
            bail!("output.fifo must not be empty");
        }
        if self.output.reader_poll_ms == 0 {
            bail!("output.reader_poll_ms must be >= 1");
        }
        Ok(())
    }

    pub fn refresh_rate(&self) -> Result<RefreshRate> {
        RefreshRate::try_from(self.sensor.refresh_rate)
            .with_context(|| format!("sensor.refresh_rate {}Hz", self.sensor.refresh_rate))
    }

    pub fn addresses(&self) -> BusAddresses {
        BusAddresses::new(self.bus.eeprom_address, self.bus.device_address)
    }

    pub fn acquisition_settings(&self) -> Result<AcquisitionSettings> {
        let acquisition = &self.acquisition;
        Ok(AcquisitionSettings {
            refresh_rate: self.refresh_rate()?,
            startup_delay: acquisition.startup_delay_ms,
            ambient_limit: acquisition.ambient_limit,
            ambient_retries: acquisition.ambient_retries,
            ambient_retry_pause: acquisition.ambient_retry_pause_ms,
            ambient_fallback: acquisition.ambient_fallback.into(),
            brown_out_pause: acquisition.brown_out_pause_ms,
            brown_out_max_attempts: acquisition.brown_out_max_attempts,
            frame_interval: acquisition.frame_interval_ms,
        })
    }

    pub fn reader_poll(&self) -> Duration {
        Duration::from_millis(self.output.reader_poll_ms)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn empty_is_default() {
        let config = load_toml("").unwrap();
        assert_eq!(config, Config::default());
        config.validate().unwrap();
        assert_eq!(config.bus.device, PathBuf::from("/dev/i2c-1"));
        assert_eq!(config.output.fifo, PathBuf::from("/var/run/mlx90621.sock"));
        assert_eq!(config.addresses(), BusAddresses::default());
        assert_eq!(
            config.acquisition_settings().unwrap(),
            AcquisitionSettings::default()
        );
    }

    #[test]
    fn from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[bus]
device = "/dev/i2c-3"

[sensor]
refresh_rate = 16
emissivity = 0.95

[acquisition]
frame_interval_ms = 250
ambient_fallback = "keep-last-good"
brown_out_max_attempts = 5

[output]
fifo = "/tmp/mlx90621.fifo"

[logging]
level = "mlx90621=debug"
"#
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bus.device, PathBuf::from("/dev/i2c-3"));
        assert_eq!(config.refresh_rate().unwrap(), RefreshRate::Sixteen);
        assert_eq!(config.sensor.emissivity, Some(0.95));
        assert_eq!(config.logging.level.as_deref(), Some("mlx90621=debug"));
        let settings = config.acquisition_settings().unwrap();
        assert_eq!(settings.frame_interval, 250);
        assert_eq!(settings.ambient_fallback, AmbientFallback::KeepLastGood);
        assert_eq!(settings.brown_out_max_attempts, Some(5));
        // Untouched fields keep their defaults.
        assert_eq!(settings.ambient_retries, 2);
        assert_eq!(config.bus.eeprom_address, 0x50);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("absent.toml"));
    }

    #[test]
    fn unknown_field() {
        assert!(load_toml("[sensor]\nframe_rate = 4").is_err());
    }

    #[test]
    fn cli_overrides() {
        let mut config = load_toml("[output]\nfifo = \"/tmp/a\"\n[logging]\nlevel = \"warn\"").unwrap();
        let cli = Cli {
            bus: Some(PathBuf::from("/dev/i2c-7")),
            fifo: Some(PathBuf::from("/tmp/b")),
            ..Default::default()
        };
        config.apply_cli(&cli);
        assert_eq!(config.bus.device, PathBuf::from("/dev/i2c-7"));
        assert_eq!(config.output.fifo, PathBuf::from("/tmp/b"));
        // Not given on the command line, so the file wins.
        assert_eq!(config.logging.level.as_deref(), Some("warn"));
    }

    #[test]
    fn rejects_zero_interval() {
        let config = load_toml("[acquisition]\nframe_interval_ms = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_ambient_limit() {
        for limit in ["0.0", "-5.0", "inf", "nan"] {
            let config = load_toml(&format!("[acquisition]\nambient_limit = {}", limit)).unwrap();
            assert!(config.validate().is_err(), "limit {}", limit);
        }
    }

    #[test]
    fn rejects_equal_addresses() {
        let config = load_toml("[bus]\neeprom_address = 96\ndevice_address = 96").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unsupported_refresh_rate() {
        let config = load_toml("[sensor]\nrefresh_rate = 3").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_emissivity() {
        let config = load_toml("[sensor]\nemissivity = 1.5").unwrap();
        assert!(config.validate().is_err());
    }
}
