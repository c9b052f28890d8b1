// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Command-line surface, mirroring `ticosd.c`'s `getopt_long` table one flag at a
//! time (including the two flag pairs that set a runtime config value and exit
//! immediately rather than starting the daemon).

use clap::Parser;
use std::path::PathBuf;
use ticosd_common::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "ticosd", about = "Ticos device telemetry daemon", disable_version_flag = true)]
pub struct Cli {
    #[arg(short = 'c', long = "config-file", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Enable data collection, then exit (matches `--enable-data-collection`).
    #[arg(short = 'e', long = "enable-data-collection")]
    pub enable_data_collection: bool,

    /// Disable data collection, then exit.
    #[arg(short = 'd', long = "disable-data-collection")]
    pub disable_data_collection: bool,

    /// Enable developer mode, then exit.
    #[arg(short = 'M', long = "enable-dev-mode")]
    pub enable_dev_mode: bool,

    /// Disable developer mode, then exit.
    #[arg(short = 'm', long = "disable-dev-mode")]
    pub disable_dev_mode: bool,

    /// Print the effective configuration and exit.
    #[arg(short = 's', long = "show-settings")]
    pub show_settings: bool,

    /// Print version information and exit.
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Fork into the background and run under a pidfile guard.
    #[arg(short = 'Z', long = "daemonize")]
    pub daemonize: bool,
}
