// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The on-wire shape of datagrams exchanged between `ticosctl` and the daemon's
//! IPC thread. Every datagram starts with an ASCII tag identifying which plugin it
//! is for (grounded on `g_plugins[]`'s `ipc_name` field in `util/plugins.c`); the
//! daemon dispatches by matching the longest registered tag that prefixes the
//! datagram, exactly as `ticosd_plugins_process_ipc`'s linear `strcmp` scan does.

/// Tag for datagrams destined for the attributes plugin, matching
/// `PLUGIN_ATTRIBUTES_IPC_NAME` in the original.
pub const ATTRIBUTES_TAG: &[u8] = b"ATTRIBUTES\0";
/// Tag for datagrams destined for the (optional, build-time-gated) collectd
/// bridge plugin.
pub const COLLECTD_TAG: &[u8] = b"COLLECTD\0";
/// Tag for datagrams carrying a coredump notification from the kernel-invoked
/// helper to the running daemon.
pub const CORE_TAG: &[u8] = b"CORE\0";

/// Maximum datagram size the daemon's IPC thread will read into, matching
/// `ipc_rx_buffer[1024]` in `ticosd.c`.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// A `write-attributes` request: a batch of key/value attributes captured at
/// `timestamp`, to be merged into the device's attribute set and queued for
/// upload. Grounded on `ticosctl.c`'s `prv_cmd_write_attributes`, which builds
/// this exact shape (`name` tag + `timestamp` + JSON body + NUL terminator,
/// `msg_size = sizeof(sTicosAttributesIPC) + strlen(stringified) + 1`) before
/// calling `ticosd_ipc_sendmsg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributesMessage {
    pub timestamp: u64,
    pub json: Vec<u8>,
}

impl AttributesMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ATTRIBUTES_TAG.len() + 8 + self.json.len() + 1);
        out.extend_from_slice(ATTRIBUTES_TAG);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.json);
        out.push(0);
        out
    }

    pub fn decode(datagram: &[u8]) -> Option<Self> {
        let rest = datagram.strip_prefix(ATTRIBUTES_TAG)?;
        if rest.len() < 8 + 1 {
            return None;
        }
        let timestamp = u64::from_le_bytes(rest[0..8].try_into().ok()?);
        let json = rest[8..].strip_suffix(&[0u8])?;
        Some(Self {
            timestamp,
            json: json.to_vec(),
        })
    }
}

/// A coredump-ready notification: the out-of-process transform helper sends one
/// of these once it has written a transformed core file under the data
/// directory, so the daemon's `coredump` plugin can rate-limit and enqueue it
/// without performing the transformation itself (spec.md §5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreNotifyMessage {
    pub gzipped: bool,
    pub path: String,
}

impl CoreNotifyMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CORE_TAG.len() + 1 + self.path.len());
        out.extend_from_slice(CORE_TAG);
        out.push(self.gzipped as u8);
        out.extend_from_slice(self.path.as_bytes());
        out
    }

    pub fn decode(datagram: &[u8]) -> Option<Self> {
        let rest = datagram.strip_prefix(CORE_TAG)?;
        let (&gzipped_byte, path_bytes) = rest.split_first()?;
        let path = std::str::from_utf8(path_bytes).ok()?.to_owned();
        Some(Self {
            gzipped: gzipped_byte != 0,
            path,
        })
    }
}

/// Finds the first registered tag that prefixes `datagram` and returns its index
/// into `tags`, matching the original's "first match wins, scanned in
/// registration order" plugin dispatch semantics.
pub fn match_tag<'a>(datagram: &[u8], tags: &[&'a [u8]]) -> Option<usize> {
    tags.iter().position(|tag| datagram.starts_with(tag))
}
