// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Forks into the background. Grounded on `prv_ticosd_daemonize_process`'s
//! `daemon(0, 1)` call: `nochdir = false` so the process moves off whatever
//! filesystem it was launched from, `noclose = true` so stdout/stderr stay open
//! and log lines remain visible through `journalctl`/a supervisor's log capture.

pub fn daemonize() -> nix::Result<()> {
    nix::unistd::daemon(false, true)
}

/// Best-effort: ask the kernel not to core-dump this process, matching
/// `prctl(PR_SET_DUMPABLE, 0, ...)` in `ticosd_main`. A coredump of the daemon
/// itself would be pointless noise competing with the very coredumps it exists to
/// ship off-device.
pub fn disable_self_coredump() {
    let rc = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0, 0, 0, 0) };
    if rc != 0 {
        tracing::warn!(errno = std::io::Error::last_os_error().raw_os_error(), "prctl(PR_SET_DUMPABLE) failed");
    }
}
