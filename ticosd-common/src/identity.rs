// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device and software identity, supplied once at startup and treated as immutable
//! for the lifetime of the process (spec.md §3).

use crate::config::ConfigView;
use crate::error::CommonError;

/// Discovered once by the (out-of-scope) device identity collaborator and handed to
/// every component that needs to stamp outbound data with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_serial: String,
    pub hardware_version: String,
}

/// Read from configuration at startup; unlike `DeviceIdentity` this can change
/// between daemon restarts (e.g. after an OTA update), but not within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareIdentity {
    pub software_type: String,
    pub software_version: String,
    pub sdk_version: String,
}

/// Shared by every binary that needs to stamp outbound data with identity:
/// the daemon at startup and the out-of-process coredump handler alike. Fatal if
/// `device_serial`/`hardware_version`/`software_version` are missing;
/// `software_type` defaults to `"main"`.
pub fn load(config: &dyn ConfigView, sdk_version: &str) -> Result<(DeviceIdentity, SoftwareIdentity), CommonError> {
    let device_serial = config
        .get_string(None, "device_serial")
        .ok_or_else(|| CommonError::MissingKey("device_serial".to_owned()))?;
    let hardware_version = config
        .get_string(None, "hardware_version")
        .ok_or_else(|| CommonError::MissingKey("hardware_version".to_owned()))?;
    let software_type = config.get_string(None, "software_type").unwrap_or_else(|| "main".to_owned());
    let software_version = config
        .get_string(None, "software_version")
        .ok_or_else(|| CommonError::MissingKey("software_version".to_owned()))?;

    Ok((
        DeviceIdentity {
            device_serial,
            hardware_version,
        },
        SoftwareIdentity {
            software_type,
            software_version,
            sdk_version: sdk_version.to_owned(),
        },
    ))
}
