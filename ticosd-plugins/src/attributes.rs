// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Turns `write-attributes` IPC datagrams into queued `Attributes` records.
//! Grounded on `plugins/attributes/attributes.c`'s `prv_msg_handler`: decode the
//! wire message, build a tx-queue entry carrying the timestamp and JSON body
//! verbatim, hand it to `ticosd_txdata`.

use crate::plugin::Plugin;
use std::sync::{Arc, Mutex};
use ticosd_common::ConfigView;
use ticosd_ipc::{AttributesMessage, ATTRIBUTES_TAG};
use ticosd_queue::{FileQueue, RecordType, TxRecord};

/// Frames an `Attributes` queue payload as `[u64 LE timestamp][json bytes]`,
/// matching the `sTicosdTxDataAttributes` layout (`timestamp` field followed by a
/// flexible `json` array) in the original `ticosd.h`.
pub fn encode_attributes_payload(timestamp_epoch_s: u64, json_body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + json_body.len());
    payload.extend_from_slice(&timestamp_epoch_s.to_le_bytes());
    payload.extend_from_slice(json_body);
    payload
}

/// Splits an `Attributes` queue payload back into its timestamp and JSON body, for
/// the upload engine to consume.
pub fn decode_attributes_payload(payload: &[u8]) -> Option<(u64, &[u8])> {
    if payload.len() < 8 {
        return None;
    }
    let timestamp = u64::from_le_bytes(payload[0..8].try_into().ok()?);
    Some((timestamp, &payload[8..]))
}

pub struct AttributesPlugin {
    queue: Arc<Mutex<FileQueue>>,
    config: Arc<dyn ConfigView>,
}

impl AttributesPlugin {
    pub fn new(queue: Arc<Mutex<FileQueue>>, config: Arc<dyn ConfigView>) -> Self {
        Self { queue, config }
    }

    fn data_collection_enabled(&self) -> bool {
        self.config.get_bool(None, "enable_data_collection").unwrap_or(false)
    }
}

impl Plugin for AttributesPlugin {
    fn name(&self) -> &'static str {
        "attributes"
    }

    fn ipc_prefix(&self) -> Option<&'static [u8]> {
        Some(ATTRIBUTES_TAG)
    }

    fn handle_ipc(&self, datagram: &[u8]) -> bool {
        let Some(msg) = AttributesMessage::decode(datagram) else {
            tracing::warn!("malformed attributes IPC message, dropping");
            return false;
        };

        // ticosd_txdata: when data collection is disabled the write is a no-op
        // success, not a failure -- the caller (ticosctl) shouldn't see an error.
        if !self.data_collection_enabled() {
            return true;
        }

        let payload = encode_attributes_payload(msg.timestamp, &msg.json);
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        match queue.write(&TxRecord {
            record_type: RecordType::Attributes,
            payload,
        }) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "failed to enqueue attributes record");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ticosd_common::MapConfig;

    #[test]
    fn payload_roundtrips() {
        let encoded = encode_attributes_payload(1_753_500_000, br#"{"foo":"bar"}"#);
        let (timestamp, json) = decode_attributes_payload(&encoded).unwrap();
        assert_eq!(timestamp, 1_753_500_000);
        assert_eq!(json, br#"{"foo":"bar"}"#);
    }

    #[test]
    fn enqueues_when_data_collection_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(Mutex::new(FileQueue::open(dir.path(), 1 << 16).unwrap()));
        let config = Arc::new(MapConfig::new(json!({ "enable_data_collection": true })));
        let plugin = AttributesPlugin::new(queue.clone(), config);

        let msg = AttributesMessage {
            timestamp: 1_753_500_000,
            json: br#"{"foo":"bar"}"#.to_vec(),
        };
        assert!(plugin.handle_ipc(&msg.encode()));

        let mut q = queue.lock().unwrap();
        let record = q.read_head().unwrap().unwrap();
        assert_eq!(record.record_type, RecordType::Attributes);
    }

    #[test]
    fn is_a_noop_success_when_data_collection_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(Mutex::new(FileQueue::open(dir.path(), 1 << 16).unwrap()));
        let config = Arc::new(MapConfig::new(json!({ "enable_data_collection": false })));
        let plugin = AttributesPlugin::new(queue.clone(), config);

        let msg = AttributesMessage {
            timestamp: 1_753_500_000,
            json: br#"{"foo":"bar"}"#.to_vec(),
        };
        assert!(plugin.handle_ipc(&msg.encode()));
        assert!(queue.lock().unwrap().read_head().unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_datagram() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(Mutex::new(FileQueue::open(dir.path(), 1 << 16).unwrap()));
        let config = Arc::new(MapConfig::new(json!({ "enable_data_collection": true })));
        let plugin = AttributesPlugin::new(queue, config);
        assert!(!plugin.handle_ipc(b"ATTRIBUTES\0short"));
    }
}
