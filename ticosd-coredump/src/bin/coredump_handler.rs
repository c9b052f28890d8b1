// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The out-of-process coredump handler the kernel's `core_pattern` launches once
//! per crash (spec.md §9's redesign: coredump transformation moved out of the
//! supervisor process entirely). Reads the raw coredump from stdin, transforms it
//! with `ticosd_coredump::transform`, writes the result under the data directory,
//! and notifies the daemon over the IPC socket so the `coredump` plugin can rate
//! limit and queue it. Grounded on `core_elf_transformer.c`'s procfs handler setup
//! and the `core_pattern` invocation contract in `meta-ticos`'s recipe (kernel
//! passes the crashing PID as argv[1], the dump itself arrives on stdin).

use std::time::{SystemTime, UNIX_EPOCH};
use ticosd_common::config::JsonFileConfig;
use ticosd_common::{identity, paths};
use ticosd_coredump::procmem::ProcFsMem;
use ticosd_coredump::transform;
use ticosd_elf::gzip::GzipWriteIo;
use ticosd_elf::reader::{CoreElfReader, StdReadIo};
use ticosd_elf::writer::{ElfWriteIo, FileWriteIo};
use ticosd_elf::CoredumpMetadata;
use ticosd_ipc::{CoreNotifyMessage, IpcSender};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let pid: u32 = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: ticosd-coredump-handler <pid>"))?
        .parse()?;

    let config_file = std::path::Path::new(paths::DEFAULT_CONFIG_FILE);
    let data_dir = paths::peek_data_dir(config_file);
    let config = JsonFileConfig::load(config_file, &data_dir)?;
    let (device, software) = identity::load(&config, env!("CARGO_PKG_VERSION"))?;
    let gzip_enabled = config
        .get_bool(Some("coredump_plugin"), "gzip_enabled")
        .unwrap_or(true);

    let captured_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as u32;
    let metadata = CoredumpMetadata {
        linux_sdk_version: &software.sdk_version,
        captured_time,
        device_serial: &device.device_serial,
        hardware_version: &device.hardware_version,
        software_type: &software.software_type,
        software_version: &software.software_version,
    };

    let extension = if gzip_enabled { "elf.gz" } else { "elf" };
    let filename = format!("core-{}.{extension}", uuid::Uuid::new_v4());
    let out_path = data_dir.join(filename);

    let file = std::fs::File::create(&out_path)?;
    let mut file_io = FileWriteIo(file);
    let proc_mem = ProcFsMem::open(pid)?;
    let reader = CoreElfReader::new(StdReadIo(std::io::stdin().lock()));

    // `transform` -> `CoreElfWriter::write` already calls `sync()` on whichever sink
    // it was given, finalizing the gzip stream if one is in play; syncing again here
    // would double-finalize and panic.
    let report = if gzip_enabled {
        let mut gzip_io = GzipWriteIo::new(&mut file_io);
        transform(reader, &mut gzip_io, &proc_mem, &metadata)?
    } else {
        transform(reader, &mut file_io, &proc_mem, &metadata)?
    };

    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }
    if report.warnings_dropped > 0 {
        tracing::warn!(dropped = report.warnings_dropped, "warning buffer overflowed");
    }

    let socket_path = std::path::Path::new(paths::DEFAULT_IPC_SOCKET_PATH);
    let sender = IpcSender::connect(socket_path)?;
    let notify = CoreNotifyMessage {
        gzipped: gzip_enabled,
        path: out_path.display().to_string(),
    };
    sender.send(&notify.encode())?;

    Ok(())
}
