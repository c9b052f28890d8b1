// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The single-instance pidfile guard. Grounded on `prv_ticosd_daemonize_process`:
//! `O_CREAT|O_EXCL` so a second daemon can never silently overwrite the first
//! one's pidfile, and the file is only written (and later unlinked) when running
//! daemonized -- a foreground run just checks that the path is clear.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Reserves `path` exclusively and writes the current process's PID into it.
    /// Fails with `ErrorKind::AlreadyExists` if another instance's pidfile is
    /// still there.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(error = %e, path = %self.path.display(), "failed to remove pidfile");
        }
    }
}
