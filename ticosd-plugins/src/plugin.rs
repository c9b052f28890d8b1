// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The capability interface every plugin implements. Grounded on
//! `sTicosdPluginCallbackFns` in `util/plugins.h` (a struct of optional function
//! pointers: `plugin_destroy`, `plugin_ipc_msg_handler`, and an implicit reload
//! hook invoked on config change / `SIGHUP`); here it becomes a trait with default
//! no-op methods so a plugin only overrides what it actually uses.

/// A unit of ticosd functionality that can receive routed IPC datagrams, react to
/// a config reload, and clean up at shutdown. All methods have a default no-op
/// implementation, mirroring the original's "NULL function pointer means plugin
/// doesn't support this operation" convention.
pub trait Plugin: Send + Sync {
    /// Used only for logging (matches `g_plugins[i].name` in startup/shutdown
    /// messages).
    fn name(&self) -> &'static str;

    /// The ASCII tag this plugin's datagrams are prefixed with, if it handles IPC
    /// at all (`util/plugins.c`'s `ipc_name` field; plugins like `reboot` that
    /// don't process IPC leave this `None`).
    fn ipc_prefix(&self) -> Option<&'static [u8]> {
        None
    }

    /// Handles one datagram already known to match [`Plugin::ipc_prefix`]. Returns
    /// `false` on failure, which the dispatcher logs but does not treat as fatal.
    fn handle_ipc(&self, _datagram: &[u8]) -> bool {
        true
    }

    /// Called once per `SIGHUP`/config-reload, in table order. A failure is logged
    /// but does not abort the broadcast to the remaining plugins.
    fn reload(&self) -> bool {
        true
    }
}
