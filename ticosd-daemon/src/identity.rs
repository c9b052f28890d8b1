// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Loads device and software identity from configuration at startup. Real device
//! identity discovery (querying hardware info, an `INFO_BINARY` subprocess in
//! `util/device_settings.c`) is an external collaborator per spec.md §1; this
//! reads the required fields straight out of the same config view everything
//! else does, which is enough to make the daemon buildable and testable
//! end-to-end without reimplementing that discovery mechanism.

use ticosd_common::{ConfigView, DeviceIdentity, SoftwareIdentity};

pub fn load(config: &dyn ConfigView) -> anyhow::Result<(DeviceIdentity, SoftwareIdentity)> {
    Ok(ticosd_common::identity::load(config, env!("CARGO_PKG_VERSION"))?)
}
