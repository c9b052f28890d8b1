// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Accepts coredump-ready notifications from the out-of-process transform
//! helper, rate-limits them, and queues the accepted ones for upload. Grounded
//! on `plugins/coredump/coredump.c`'s `prv_msg_handler`: the plugin itself never
//! touches the ELF data (that happens in the helper invoked by the kernel's
//! `core_pattern`, per spec.md §5), it only decides whether this crash counts
//! against the rate limit and, if so, hands the already-written file off to the
//! transmit queue.

use crate::plugin::Plugin;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use ticosd_common::ConfigView;
use ticosd_coredump::RateLimiter;
use ticosd_ipc::{CoreNotifyMessage, CORE_TAG};
use ticosd_queue::{FileQueue, RecordType, TxRecord};

const RATE_LIMITER_HISTORY_FILE: &str = "coredump_rate_limiter_history";

fn now_epoch_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

/// Wraps a queued coredump record's file path, tagging whether the upload
/// engine should send it with `Content-Encoding: gzip`.
pub struct CoredumpPlugin {
    queue: Arc<Mutex<FileQueue>>,
    config: Arc<dyn ConfigView>,
    limiter: Mutex<Option<RateLimiter>>,
}

impl CoredumpPlugin {
    /// Builds the rate limiter from `coredump_plugin.rate_limit_count` /
    /// `coredump_plugin.rate_limit_duration_seconds`, unless `dev_mode` is on, in
    /// which case every coredump is accepted (spec.md §4.6).
    pub fn new(queue: Arc<Mutex<FileQueue>>, config: Arc<dyn ConfigView>, data_dir: &std::path::Path) -> Self {
        let dev_mode = config.get_bool(None, "dev_mode").unwrap_or(false);
        let limiter = if dev_mode {
            None
        } else {
            let count = config
                .get_int(Some("coredump_plugin"), "rate_limit_count")
                .unwrap_or(0)
                .max(0) as usize;
            let duration = config
                .get_int(Some("coredump_plugin"), "rate_limit_duration_seconds")
                .unwrap_or(0);
            RateLimiter::new(count, duration, data_dir.join(RATE_LIMITER_HISTORY_FILE))
        };

        Self {
            queue,
            config,
            limiter: Mutex::new(limiter),
        }
    }

    fn data_collection_enabled(&self) -> bool {
        self.config.get_bool(None, "enable_data_collection").unwrap_or(false)
    }

    fn accept(&self) -> bool {
        let mut guard = self.limiter.lock().expect("rate limiter lock poisoned");
        match guard.as_mut() {
            Some(limiter) => limiter.check_event(now_epoch_s()),
            None => true,
        }
    }
}

impl Plugin for CoredumpPlugin {
    fn name(&self) -> &'static str {
        "coredump"
    }

    fn ipc_prefix(&self) -> Option<&'static [u8]> {
        Some(CORE_TAG)
    }

    fn handle_ipc(&self, datagram: &[u8]) -> bool {
        let Some(msg) = CoreNotifyMessage::decode(datagram) else {
            tracing::warn!("malformed coredump notification, dropping");
            return false;
        };

        if !self.data_collection_enabled() || !self.accept() {
            tracing::info!(path = %msg.path, "dropping rate-limited or unwanted coredump");
            let _ = std::fs::remove_file(PathBuf::from(&msg.path));
            return true;
        }

        let record_type = if msg.gzipped {
            RecordType::CoreUploadGzip
        } else {
            RecordType::CoreUpload
        };
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        match queue.write(&TxRecord {
            record_type,
            payload: msg.path.clone().into_bytes(),
        }) {
            Ok(accepted) => {
                if !accepted {
                    let _ = std::fs::remove_file(PathBuf::from(&msg.path));
                }
                accepted
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to enqueue coredump record");
                let _ = std::fs::remove_file(PathBuf::from(&msg.path));
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

    fn make_plugin(config: serde_json::Value, data_dir: &std::path::Path) -> CoredumpPlugin {
        let queue = Arc::new(Mutex::new(FileQueue::open(data_dir, 1 << 20).unwrap()));
        CoredumpPlugin::new(queue, Arc::new(MapConfig::new(config)), data_dir)
    }

    #[test]
    fn enqueues_accepted_coredumps_and_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let core_path = dir.path().join("core.elf");
        std::fs::write(&core_path, b"elfbytes").unwrap();

        let plugin = make_plugin(
            json!({ "enable_data_collection": true, "dev_mode": true }),
            dir.path(),
        );
        let msg = CoreNotifyMessage {
            gzipped: false,
            path: core_path.to_str().unwrap().to_owned(),
        };
        assert!(plugin.handle_ipc(&msg.encode()));
        assert!(core_path.exists());

        let mut q = plugin.queue.lock().unwrap();
        let record = q.read_head().unwrap().unwrap();
        assert_eq!(record.record_type, RecordType::CoreUpload);
    }

    #[test]
    fn drops_and_deletes_file_when_data_collection_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let core_path = dir.path().join("core.elf");
        std::fs::write(&core_path, b"elfbytes").unwrap();

        let plugin = make_plugin(
            json!({ "enable_data_collection": false, "dev_mode": true }),
            dir.path(),
        );
        let msg = CoreNotifyMessage {
            gzipped: true,
            path: core_path.to_str().unwrap().to_owned(),
        };
        assert!(plugin.handle_ipc(&msg.encode()));
        assert!(!core_path.exists());
        assert!(plugin.queue.lock().unwrap().read_head().unwrap().is_none());
    }

    #[test]
    fn rate_limiter_rejects_crashes_past_the_configured_count() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = make_plugin(
            json!({
                "enable_data_collection": true,
                "dev_mode": false,
                "coredump_plugin": {
                    "rate_limit_count": 1,
                    "rate_limit_duration_seconds": 3600,
                },
            }),
            dir.path(),
        );

        let first_path = dir.path().join("core-1.elf");
        std::fs::write(&first_path, b"a").unwrap();
        let first = CoreNotifyMessage {
            gzipped: false,
            path: first_path.to_str().unwrap().to_owned(),
        };
        assert!(plugin.handle_ipc(&first.encode()));
        assert!(first_path.exists());

        let second_path = dir.path().join("core-2.elf");
        std::fs::write(&second_path, b"b").unwrap();
        let second = CoreNotifyMessage {
            gzipped: false,
            path: second_path.to_str().unwrap().to_owned(),
        };
        assert!(plugin.handle_ipc(&second.encode()));
        assert!(!second_path.exists());
    }

    #[test]
    fn rejects_malformed_datagram() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = make_plugin(json!({ "enable_data_collection": true }), dir.path());
        assert!(!plugin.handle_ipc(b"CORE\0"[0..3].as_ref()));
    }
}
