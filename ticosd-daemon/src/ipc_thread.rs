// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The IPC receiver thread. Grounded on `ticosd.c`'s `prv_ipc_process_thread`: one
//! thread blocked in a receive loop, routing every datagram through the plugin
//! table, until the socket's read half is shut down by the terminate signal
//! handler.

use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use ticosd_ipc::IpcListener;
use ticosd_plugins::PluginRegistry;

use crate::signals;

pub fn spawn(socket_path: &Path, registry: Arc<PluginRegistry>) -> anyhow::Result<JoinHandle<()>> {
    let listener = IpcListener::bind(socket_path)?;
    signals::set_ipc_socket_fd(listener.as_raw_fd());

    Ok(std::thread::spawn(move || loop {
        match listener.recv() {
            Ok(Some(datagram)) => {
                if !registry.dispatch_ipc(&datagram) {
                    tracing::warn!("no plugin matched IPC datagram, dropping");
                }
            }
            Ok(None) => {
                tracing::info!("IPC socket shut down, receiver thread exiting");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "IPC receive failed, dropping datagram");
            }
        }
    }))
}
