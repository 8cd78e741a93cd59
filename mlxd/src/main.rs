// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! `mlxd` reads an MLX90621 over I²C and writes each frame to a named pipe, as 64 little-endian
//! `u16`s in tenths of a Kelvin.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use linux_embedded_hal::{Delay, I2cdev};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mlx90621::AcquisitionLoop;

mod cli;
mod config;
mod fifo;

use cli::Cli;
use config::Config;
use fifo::FifoSink;

/// Set up logging. An explicit level wins over `RUST_LOG`, and `info` is used if neither is set.
///
/// Records from the library go through the `log` facade, and are picked up by the subscriber.
fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level \"{}\"", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("{}", err))
        .context("unable to initialize logging")
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_cli(cli);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_bus(device: &Path) -> Result<I2cdev> {
    I2cdev::new(device).with_context(|| format!("unable to open I2C bus {}", device.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(config.logging.level.as_deref())?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        })
        .context("unable to install the SIGINT handler")?;
    }

    let mut sink = FifoSink::create(&config.output.fifo, config.reader_poll(), cancel.clone())
        .with_context(|| format!("unable to create pipe {}", config.output.fifo.display()))?;

    let bus = open_bus(&config.bus.device)?;
    info!(bus = %config.bus.device.display(), "Starting sensor");
    let mut acquisition = AcquisitionLoop::start(
        bus,
        config.addresses(),
        Delay,
        config.acquisition_settings()?,
    )
    .context("sensor initialization failed")?;
    if let Some(emissivity) = config.sensor.emissivity {
        if let Some(driver) = acquisition.driver_mut() {
            driver.override_emissivity(emissivity);
        }
    }

    let result = acquisition.run(&mut sink, &cancel);
    // Close the bus and remove the pipe whatever happened.
    drop(acquisition.into_inner());
    info!(path = %sink.path().display(), "Shutting down");
    drop(sink);
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!("Acquisition stopped: {}", err);
            Err(err).context("acquisition failed")
        }
    }
}
