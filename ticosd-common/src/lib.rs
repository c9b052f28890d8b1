// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared types used across the ticosd workspace: device/software identity, the
//! read-only configuration view, and error types common to more than one crate.

pub mod config;
pub mod error;
pub mod identity;
pub mod paths;

pub use config::ConfigView;
pub use error::CommonError;
pub use identity::{DeviceIdentity, SoftwareIdentity};
pub use paths::{DEFAULT_CONFIG_FILE, DEFAULT_DATA_DIR, DEFAULT_IPC_SOCKET_PATH, DEFAULT_PID_FILE};
