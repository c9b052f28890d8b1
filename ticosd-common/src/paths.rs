// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Default filesystem locations shared by every binary in the workspace.
//! Grounded on `util/config.h`'s `CONFIG_FILE` and `util/ipc.h`'s
//! `TICOSD_IPC_SOCKET_PATH`; `DEFAULT_DATA_DIR` and `DEFAULT_PID_FILE` mirror
//! `ticosd.c`'s `PID_FILE` and its `data_dir` config default.

use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/ticosd.conf";
pub const DEFAULT_DATA_DIR: &str = "/var/lib/ticosd";
pub const DEFAULT_IPC_SOCKET_PATH: &str = "/tmp/ticos-ipc.sock";
pub const DEFAULT_PID_FILE: &str = "/var/run/ticosd.pid";

/// Peeks `data_dir` out of the raw config JSON without going through
/// `JsonFileConfig` (which needs the data directory to locate `runtime.conf`,
/// so it can't resolve its own input here). Falls back to `DEFAULT_DATA_DIR`
/// if the file is missing, malformed, or silent on the key. Shared by every
/// binary that must know where the queue/rate-limiter/pidfile state lives
/// before a `ConfigView` can be constructed: the daemon at startup, the
/// out-of-process coredump handler, and `ticosctl`.
pub fn peek_data_dir(config_file: &Path) -> PathBuf {
    let data_dir = std::fs::read(config_file)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
        .and_then(|value| value.get("data_dir").and_then(|v| v.as_str()).map(str::to_owned));
    PathBuf::from(data_dir.unwrap_or_else(|| DEFAULT_DATA_DIR.to_owned()))
}
