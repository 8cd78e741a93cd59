// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Command line flags. Anything given here takes precedence over the configuration file.

use std::path::PathBuf;

use clap::Parser;

/// Read an MLX90621 thermopile array and stream temperature frames to a named pipe.
#[derive(Parser, Debug, Default)]
#[command(name = "mlxd", version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// I²C bus device the sensor is attached to
    #[arg(long, value_name = "DEVICE")]
    pub bus: Option<PathBuf>,

    /// Named pipe to write frames to
    #[arg(long, value_name = "PATH")]
    pub fifo: Option<PathBuf>,

    /// Log level or filter directives (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides() {
        let cli = Cli::parse_from([
            "mlxd",
            "--bus",
            "/dev/i2c-0",
            "--fifo",
            "/tmp/frames",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.bus, Some(PathBuf::from("/dev/i2c-0")));
        assert_eq!(cli.fifo, Some(PathBuf::from("/tmp/frames")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, None);
    }

    #[test]
    fn version_flag() {
        let err = Cli::try_parse_from(["mlxd", "-V"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        let err = Cli::try_parse_from(["mlxd", "-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
