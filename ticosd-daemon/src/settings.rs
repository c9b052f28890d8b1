// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! `--show-settings` / `--version` output. Grounded on `util/dump_settings.c`
//! (device id, hardware version, and the effective config dumped as
//! `KEY=value` lines) and `util/version.c` (`VERSION=`/`GIT COMMIT=` banner).
//! Printed straight to stdout with `println!`, matching the original's `printf`
//! calls -- this is user-facing CLI output, not a log line.

use std::path::Path;
use ticosd_common::{ConfigView, DeviceIdentity, SoftwareIdentity};

pub fn print_version() {
    println!("VERSION={}", env!("CARGO_PKG_VERSION"));
    println!("GIT COMMIT={}", option_env!("TICOSD_GIT_COMMIT").unwrap_or("unknown"));
}

pub fn print_settings(
    config_file: &Path,
    device: &DeviceIdentity,
    software: &SoftwareIdentity,
    config: &dyn ConfigView,
) {
    print_version();
    println!("CONFIG_FILE={}", config_file.display());
    println!("TICOS_DEVICE_ID={}", device.device_serial);
    println!("TICOS_HARDWARE_VERSION={}", device.hardware_version);
    println!("SOFTWARE_TYPE={}", software.software_type);
    println!("SOFTWARE_VERSION={}", software.software_version);
    println!(
        "ENABLE_DATA_COLLECTION={}",
        config.get_bool(None, "enable_data_collection").unwrap_or(false)
    );
    println!("ENABLE_DEV_MODE={}", config.get_bool(None, "dev_mode").unwrap_or(false));
    println!(
        "BASE_URL={}",
        config.get_string(None, "base_url").unwrap_or_default()
    );
    println!("PLUGINS=attributes,reboot,coredump");
}
