// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide termination state. Grounded on `ticosd.c`'s
//! `prv_ticosd_sig_handler`: `SIGUSR1` only needs to interrupt the supervisor's
//! sleep, `SIGTERM`/`SIGHUP`/`SIGINT` set a terminate flag and `shutdown(SHUT_RD)`
//! the IPC socket to unblock a thread parked in `recvmsg`. Per the redesign note in
//! spec.md §9 ("process-wide state ... funnel to a small atomic flag"), the
//! handler touches nothing but two statics -- no struct pointer, no mutex.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static TERMINATE: AtomicBool = AtomicBool::new(false);
static IPC_SOCKET_FD: AtomicI32 = AtomicI32::new(-1);

pub fn should_terminate() -> bool {
    TERMINATE.load(Ordering::SeqCst)
}

/// Called once the IPC listener is bound, so the terminate handler can reach its
/// file descriptor without any shared state beyond this atomic.
pub fn set_ipc_socket_fd(fd: RawFd) {
    IPC_SOCKET_FD.store(fd, Ordering::SeqCst);
}

extern "C" fn handle_terminate(_signum: libc::c_int) {
    TERMINATE.store(true, Ordering::SeqCst);
    let fd = IPC_SOCKET_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        unsafe {
            libc::shutdown(fd, libc::SHUT_RD);
        }
    }
}

/// `SIGUSR1`'s only job is to interrupt `interruptible_sleep`'s blocking `poll`
/// with `EINTR`; the handler itself has nothing to do.
extern "C" fn handle_wake(_signum: libc::c_int) {}

/// Installs handlers for `SIGTERM`/`SIGHUP`/`SIGINT` (terminate) and `SIGUSR1`
/// (wake). Must run before any thread blocks in `interruptible_sleep` or
/// `IpcListener::recv`.
pub fn install() -> nix::Result<()> {
    let terminate_action = SigAction::new(SigHandler::Handler(handle_terminate), SaFlags::empty(), SigSet::empty());
    let wake_action = SigAction::new(SigHandler::Handler(handle_wake), SaFlags::empty(), SigSet::empty());
    unsafe {
        signal::sigaction(Signal::SIGTERM, &terminate_action)?;
        signal::sigaction(Signal::SIGHUP, &terminate_action)?;
        signal::sigaction(Signal::SIGINT, &terminate_action)?;
        signal::sigaction(Signal::SIGUSR1, &wake_action)?;
    }
    Ok(())
}

/// Sleeps for `duration`, waking early (and returning) if a signal arrives.
/// `std::thread::sleep` retries transparently across `EINTR` on Linux, so it can't
/// be woken by `SIGUSR1`; an empty `poll()` call reports `EINTR` instead of
/// swallowing it, giving the drain loop an interruptible sleep primitive.
pub fn interruptible_sleep(duration: std::time::Duration) {
    let millis = duration.as_millis().min(i32::MAX as u128) as i32;
    if millis <= 0 {
        return;
    }
    let mut no_fds: [nix::poll::PollFd; 0] = [];
    let _ = nix::poll::poll(&mut no_fds, millis);
}
