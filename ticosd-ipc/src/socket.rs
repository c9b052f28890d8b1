// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The `AF_UNIX SOCK_DGRAM` socket ticosctl and the daemon communicate over.
//! Grounded on `ticosd.c`'s `prv_ipc_process_thread`: a stale socket file from a
//! previous run is unlinked before binding, and shutting down the read half wakes
//! a thread blocked in `recvmsg` so the daemon can exit cleanly on `SIGTERM`.

use crate::wire::MAX_DATAGRAM_SIZE;
use std::io;
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

/// The daemon's listening end. Binds at construction, removing any leftover
/// socket file from an unclean previous shutdown first.
pub struct IpcListener {
    socket: UnixDatagram,
}

impl IpcListener {
    pub fn bind(socket_path: &Path) -> io::Result<Self> {
        match std::fs::remove_file(socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let socket = UnixDatagram::bind(socket_path)?;
        Ok(Self { socket })
    }

    /// Blocks until a datagram arrives or the socket is shut down, in which case
    /// this returns `Ok(None)` so the caller's receive loop can exit.
    pub fn recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        match self.socket.recv(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Unblocks a thread parked in `recv`, without closing the socket outright
    /// (the file descriptor is still needed to unlink the path on shutdown).
    pub fn shutdown_read(&self) -> io::Result<()> {
        self.socket.shutdown(Shutdown::Read)
    }
}

impl AsRawFd for IpcListener {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

/// `ticosctl`'s sending end: a throwaway, unnamed client socket that sends one
/// datagram to the daemon's well-known path.
pub struct IpcSender {
    socket: UnixDatagram,
    server_path: PathBuf,
}

impl IpcSender {
    pub fn connect(server_path: &Path) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        Ok(Self {
            socket,
            server_path: server_path.to_path_buf(),
        })
    }

    pub fn send(&self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, &self.server_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_and_listener_exchange_a_datagram() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticosd.sock");

        let listener = IpcListener::bind(&path).unwrap();
        let sender = IpcSender::connect(&path).unwrap();
        sender.send(b"ATTRIBUTES\0hello").unwrap();

        let received = listener.recv().unwrap().unwrap();
        assert_eq!(received, b"ATTRIBUTES\0hello");
    }

    #[test]
    fn rebinding_removes_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticosd.sock");
        let _first = IpcListener::bind(&path).unwrap();
        // binding again at the same path must not fail with AddrInUse
        let _second = IpcListener::bind(&path).unwrap();
    }

    #[test]
    fn shutdown_read_unblocks_a_pending_recv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticosd.sock");
        let listener = IpcListener::bind(&path).unwrap();
        listener.shutdown_read().unwrap();
        let result = listener.recv().unwrap();
        assert!(result.is_none());
    }
}
