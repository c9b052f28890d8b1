// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The static plugin table: registration order, name-prefix IPC routing, and the
//! reload broadcast. Grounded on `util/plugins.c`'s `g_plugins[]` /
//! `ticosd_plugins_process_ipc` (first-prefix-match-wins linear scan) and
//! `ticosd_destroy_plugins` (reverse registration order, best-effort).

use crate::plugin::Plugin;

/// Holds every plugin the daemon loaded at startup, in registration order. The
/// order matters for [`PluginRegistry::reload_all`] (forward) and `Drop` (reverse,
/// since `Vec`'s own `Drop` already runs front-to-back -- we reverse explicitly to
/// match the original's shutdown order).
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { plugins: Vec::new() }
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Routes `datagram` to the first registered plugin whose `ipc_prefix`
    /// matches. Returns `false` (and the caller should log + drop the datagram)
    /// when nothing matches, matching `ticosd_plugins_process_ipc`'s return value.
    pub fn dispatch_ipc(&self, datagram: &[u8]) -> bool {
        for plugin in &self.plugins {
            let Some(prefix) = plugin.ipc_prefix() else {
                continue;
            };
            if datagram.starts_with(prefix) {
                if !plugin.handle_ipc(datagram) {
                    tracing::warn!(plugin = plugin.name(), "plugin failed to process IPC message");
                }
                return true;
            }
        }
        false
    }

    /// Calls every plugin's `reload` in registration order. A single plugin's
    /// failure is logged but does not abort the remaining reloads.
    pub fn reload_all(&self) {
        for plugin in &self.plugins {
            if !plugin.reload() {
                tracing::warn!(plugin = plugin.name(), "plugin failed to reload");
            }
        }
    }

    /// Shuts plugins down in reverse registration order, best-effort. Each
    /// plugin's own `Drop` impl is responsible for any teardown it needs; this
    /// just controls the order they're dropped in.
    pub fn shutdown(mut self) {
        while let Some(plugin) = self.plugins.pop() {
            drop(plugin);
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingPlugin {
        prefix: &'static [u8],
        calls: Arc<AtomicUsize>,
    }

    impl Plugin for CountingPlugin {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn ipc_prefix(&self) -> Option<&'static [u8]> {
            Some(self.prefix)
        }

        fn handle_ipc(&self, _datagram: &[u8]) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn routes_to_the_first_matching_prefix() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(CountingPlugin {
            prefix: b"ATTRIBUTES\0",
            calls: a_calls.clone(),
        }));
        registry.register(Box::new(CountingPlugin {
            prefix: b"CORE\0",
            calls: b_calls.clone(),
        }));

        assert!(registry.dispatch_ipc(b"CORE\0somepath"));
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmatched_prefix_returns_false() {
        let registry = PluginRegistry::new();
        assert!(!registry.dispatch_ipc(b"UNKNOWN\0"));
    }
}
