// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! `ticosctl`: a thin control CLI. Every subcommand either flips a runtime
//! config value (and asks the service manager to restart the daemon so it
//! takes effect), sends a signal to the running daemon's pidfile, or sends one
//! IPC datagram that the daemon's plugin table routes by prefix. This binary
//! owns no business logic of its own, matching spec.md §1: "only its IPC wire
//! format matters."

mod cli;

use anyhow::Context;
use cli::{Cli, Command, CrashKind};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::Path;
use ticosd_common::config::JsonFileConfig;
use ticosd_common::{identity, paths, ConfigView, DEFAULT_IPC_SOCKET_PATH, DEFAULT_PID_FILE};
use ticosd_ipc::{AttributesMessage, IpcSender, COLLECTD_TAG};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Command::EnableDataCollection => set_runtime_bool_and_restart(&cli, "enable_data_collection", true),
        Command::DisableDataCollection => set_runtime_bool_and_restart(&cli, "enable_data_collection", false),
        Command::EnableDevMode => set_runtime_bool_and_restart(&cli, "dev_mode", true),
        Command::DisableDevMode => set_runtime_bool_and_restart(&cli, "dev_mode", false),
        Command::Reboot { reason } => cmd_reboot(&cli, reason.unwrap_or(0)),
        Command::RequestMetrics => send_ipc(COLLECTD_TAG.to_vec()),
        Command::Sync => signal_daemon(Signal::SIGUSR1),
        Command::TriggerCoredump { kind } => cmd_trigger_coredump(kind),
        Command::WriteAttributes { pairs } => cmd_write_attributes(pairs),
        Command::ShowSettings => cmd_show_settings(&cli),
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

fn print_version() {
    println!("VERSION={}", env!("CARGO_PKG_VERSION"));
}

fn load_config(cli: &Cli) -> anyhow::Result<(JsonFileConfig, std::path::PathBuf)> {
    let data_dir = paths::peek_data_dir(&cli.config_file);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let config = JsonFileConfig::load(&cli.config_file, &data_dir)
        .with_context(|| format!("loading config file {}", cli.config_file.display()))?;
    Ok((config, data_dir))
}

/// Reads the daemon's pidfile and delivers `sig` to it, matching
/// `ticosctl.c`'s `prv_send_signal_to_ticosd` (read PID, `kill(pid, sig)`).
/// The daemon never runs without a process supervisor restarting it, so
/// asking it to stop (`SIGTERM`) is how a runtime config change gets picked
/// up -- the supervisor's restart policy does the rest.
fn signal_daemon(sig: Signal) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(DEFAULT_PID_FILE)
        .with_context(|| format!("reading pidfile {DEFAULT_PID_FILE} -- is ticosd running?"))?;
    let pid: i32 = contents.trim().parse().context("pidfile does not contain a valid PID")?;
    signal::kill(Pid::from_raw(pid), sig).context("failed to signal ticosd")?;
    Ok(())
}

fn set_runtime_bool_and_restart(cli: &Cli, key: &str, value: bool) -> anyhow::Result<()> {
    let (config, _data_dir) = load_config(cli)?;
    config.set_runtime_bool(key, value)?;
    println!("{key}={value}");
    match signal_daemon(Signal::SIGTERM) {
        Ok(()) => println!("restart requested"),
        Err(e) => println!("setting saved, but could not signal the running daemon to restart: {e}"),
    }
    Ok(())
}

fn send_ipc(datagram: Vec<u8>) -> anyhow::Result<()> {
    let sender = IpcSender::connect(Path::new(DEFAULT_IPC_SOCKET_PATH)).context("connecting to ticosd IPC socket")?;
    sender.send(&datagram).context("sending IPC datagram to ticosd")?;
    Ok(())
}

/// Writes the reboot reason as bare ASCII decimal (no trailing newline, matching
/// the original `fprintf(file, "%d", ...)`), then asks the kernel to reboot.
fn cmd_reboot(cli: &Cli, reason: i64) -> anyhow::Result<()> {
    let (_config, data_dir) = load_config(cli)?;
    let reason_path = data_dir.join("lastrebootreason");
    std::fs::write(&reason_path, reason.to_string()).context("writing reboot reason file")?;
    println!("reboot reason {reason} recorded, rebooting now");
    nix::sys::reboot::reboot(nix::sys::reboot::RebootMode::RB_AUTOBOOT).context("reboot(2) failed")?;
    Ok(())
}

/// Forks a child that immediately raises the requested fault, so the kernel's
/// `core_pattern` helper captures a real coredump for the ingest pipeline to
/// exercise end to end. The parent does not wait for the child; like the
/// original CLI it treats the crash as fire-and-forget.
fn cmd_trigger_coredump(kind: CrashKind) -> anyhow::Result<()> {
    match unsafe { nix::unistd::fork() }.context("fork failed")? {
        nix::unistd::ForkResult::Child => {
            let signal = match kind {
                CrashKind::Segfault => libc::SIGSEGV,
                CrashKind::DivideByZero => libc::SIGFPE,
            };
            unsafe {
                libc::raise(signal);
            }
            std::process::exit(1);
        }
        nix::unistd::ForkResult::Parent { child } => {
            println!("triggered {kind:?} in child pid {child}");
            Ok(())
        }
    }
}

/// Builds `{"key": "value" | number, ...}` from `K=V` pairs, matching
/// `ticosctl.c`'s `prv_cmd_write_attributes`: a value that parses as a number
/// is sent as one, everything else as a string.
fn cmd_write_attributes(pairs: Vec<String>) -> anyhow::Result<()> {
    let mut object = serde_json::Map::new();
    for pair in &pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("attribute {pair:?} is not in KEY=VALUE form"))?;
        let json_value = if let Ok(i) = value.parse::<i64>() {
            serde_json::Value::from(i)
        } else if let Ok(f) = value.parse::<f64>() {
            serde_json::Value::from(f)
        } else {
            serde_json::Value::from(value)
        };
        object.insert(key.to_owned(), json_value);
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("system clock before unix epoch")?
        .as_secs();
    let msg = AttributesMessage {
        timestamp,
        json: serde_json::to_vec(&serde_json::Value::Object(object))?,
    };
    send_ipc(msg.encode())
}

fn cmd_show_settings(cli: &Cli) -> anyhow::Result<()> {
    let (config, _data_dir) = load_config(cli)?;
    let (device, software) = identity::load(&config, env!("CARGO_PKG_VERSION"))?;

    print_version();
    println!("CONFIG_FILE={}", cli.config_file.display());
    println!("TICOS_DEVICE_ID={}", device.device_serial);
    println!("TICOS_HARDWARE_VERSION={}", device.hardware_version);
    println!("SOFTWARE_TYPE={}", software.software_type);
    println!("SOFTWARE_VERSION={}", software.software_version);
    println!(
        "ENABLE_DATA_COLLECTION={}",
        config.get_bool(None, "enable_data_collection").unwrap_or(false)
    );
    println!("ENABLE_DEV_MODE={}", config.get_bool(None, "dev_mode").unwrap_or(false));
    println!("BASE_URL={}", config.get_string(None, "base_url").unwrap_or_default());
    Ok(())
}
