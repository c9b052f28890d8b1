// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Command-line surface, mirroring `ticosctl.c`'s static `cmds[]` table one
//! sub-command at a time.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ticosd_common::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "ticosctl", about = "Control utility for the ticosd telemetry daemon")]
pub struct Cli {
    #[arg(short = 'c', long = "config-file", global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enable data collection and ask the running daemon to restart.
    EnableDataCollection,
    /// Disable data collection and ask the running daemon to restart.
    DisableDataCollection,
    /// Enable developer mode and ask the running daemon to restart.
    EnableDevMode,
    /// Disable developer mode and ask the running daemon to restart.
    DisableDevMode,
    /// Register a reboot reason and reboot the device.
    Reboot {
        /// Reboot reason code; defaults to 0 (Unknown).
        #[arg(long)]
        reason: Option<i64>,
    },
    /// Flush collectd metrics to Ticos now.
    RequestMetrics,
    /// Flush ticosd's queue to Ticos now.
    Sync,
    /// Trigger a coredump and immediately report it to Ticos in dev mode.
    TriggerCoredump {
        /// Which fault to induce; defaults to segfault.
        #[arg(value_enum, default_value_t = CrashKind::Segfault)]
        kind: CrashKind,
    },
    /// Write device attribute(s) to ticosd, e.g. `foo=bar num=42`.
    WriteAttributes {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// Show ticosd's effective settings.
    ShowSettings,
    /// Show version information.
    Version,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum CrashKind {
    Segfault,
    DivideByZero,
}
