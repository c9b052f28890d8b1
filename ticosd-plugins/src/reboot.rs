// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tracks the reason the device last rebooted and queues one `RebootEvent` per
//! boot. Grounded on `plugins/reboot/reboot.c`: `prv_reboot_read_and_clear_*`
//! (read an integer reason from a file, then delete it), `prv_track_reboot` (build
//! and enqueue the event JSON), and `prv_run_if_untracked_boot_id` (a
//! `last_tracked_boot_id` sidecar file so a reboot is only reported once even if
//! the daemon restarts mid-boot).
//!
//! Hardware reboot-reason collection (pstore parsing, U-Boot environment
//! inspection, multiple prioritized sources) is an external collaborator per
//! spec.md §1; this plugin only persists/reads the integer reason code the
//! collaborator is expected to have already written to `lastrebootreason`
//! (spec.md §9, Open Question (b)).

use crate::plugin::Plugin;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use ticosd_common::{ConfigView, DeviceIdentity, SoftwareIdentity};
use ticosd_queue::{FileQueue, RecordType, TxRecord};

const LAST_REBOOT_REASON_FILE: &str = "lastrebootreason";
const LAST_TRACKED_BOOT_ID_FILE: &str = "last_tracked_boot_id";
const BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";
const UNKNOWN_REBOOT_REASON: i64 = 0x0000;

/// Reads the ASCII-decimal reboot reason ticosctl's `reboot` subcommand (or a
/// hardware-specific collaborator) wrote, then deletes the file so the next boot
/// doesn't re-report it. Missing file or unparsable contents both mean "no reason
/// recorded", matching `prv_reboot_read_and_clear_reboot_reason_from_file`'s
/// "can't read -> Unknown" fallback.
fn read_and_clear_reboot_reason(data_dir: &Path) -> i64 {
    let path = data_dir.join(LAST_REBOOT_REASON_FILE);
    let reason = std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(UNKNOWN_REBOOT_REASON);
    let _ = std::fs::remove_file(&path);
    reason
}

/// Returns the current boot's unique id (the kernel's own `boot_id`, stable for
/// the lifetime of one boot and different on every reboot).
fn read_boot_id() -> Option<String> {
    std::fs::read_to_string(BOOT_ID_PATH).ok().map(|s| s.trim().to_owned())
}

/// Returns `true` the first time this `boot_id` is seen, and records it so a
/// later call (e.g. after a daemon restart within the same boot) returns `false`.
fn is_untracked_boot_id(tracked_file: &Path, boot_id: &str) -> bool {
    if let Ok(previous) = std::fs::read_to_string(tracked_file) {
        if previous.trim() == boot_id {
            return false;
        }
    }
    let _ = std::fs::write(tracked_file, boot_id);
    true
}

fn build_reboot_event_json(
    device: &DeviceIdentity,
    software: &SoftwareIdentity,
    reason: i64,
) -> Vec<u8> {
    let body = json!({
        "Type": "Trace",
        "SoftwareType": software.software_type,
        "SoftwareVersion": software.software_version,
        "HardwareVersion": device.hardware_version,
        "SdkVersion": software.sdk_version,
        "EventInfo": { "Reason": reason },
        "UserInfo": {},
    });
    serde_json::to_vec(&body).expect("json serialization of static shape cannot fail")
}

/// Runs once at startup (no IPC role, matching `g_plugins[]`'s empty `ipc_name`
/// for the reboot entry): if this boot hasn't been tracked yet and data
/// collection is enabled, enqueue one `RebootEvent`.
pub struct RebootPlugin;

impl RebootPlugin {
    /// Mirrors `ticosd_reboot_init` + `prv_run_if_untracked_boot_id`: a boot is
    /// always marked tracked (even with data collection off, so the event isn't
    /// reported retroactively once it's re-enabled), but the event itself is only
    /// built and queued when collection is enabled.
    pub fn init(
        queue: &Arc<Mutex<FileQueue>>,
        config: &Arc<dyn ConfigView>,
        device: &DeviceIdentity,
        software: &SoftwareIdentity,
        data_dir: &Path,
    ) -> Self {
        let Some(boot_id) = read_boot_id() else {
            tracing::warn!("failed to read current boot_id, skipping reboot tracking");
            return Self;
        };

        let tracked_file = data_dir.join(LAST_TRACKED_BOOT_ID_FILE);
        if !is_untracked_boot_id(&tracked_file, &boot_id) {
            return Self;
        }

        let enabled = config.get_bool(None, "enable_data_collection").unwrap_or(false);
        if !enabled {
            tracing::info!("data collection disabled, not starting reboot plugin");
            return Self;
        }

        let reason = read_and_clear_reboot_reason(data_dir);
        let payload = build_reboot_event_json(device, software, reason);
        let mut q = queue.lock().expect("queue lock poisoned");
        if let Err(e) = q.write(&TxRecord {
            record_type: RecordType::RebootEvent,
            payload,
        }) {
            tracing::error!(error = %e, "failed to queue reboot reason");
        }

        Self
    }
}

impl Plugin for RebootPlugin {
    fn name(&self) -> &'static str {
        "reboot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_a_previously_unseen_boot_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("last_tracked_boot_id");
        assert!(is_untracked_boot_id(&file, "boot-a"));
        assert!(!is_untracked_boot_id(&file, "boot-a"));
        assert!(is_untracked_boot_id(&file, "boot-b"));
    }

    #[test]
    fn reboot_reason_file_is_read_then_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LAST_REBOOT_REASON_FILE);
        std::fs::write(&path, "32773").unwrap();

        assert_eq!(read_and_clear_reboot_reason(dir.path()), 32773);
        assert!(!path.exists());
        // second read with no file present falls back to Unknown
        assert_eq!(read_and_clear_reboot_reason(dir.path()), UNKNOWN_REBOOT_REASON);
    }

    #[test]
    fn event_json_embeds_the_reason_and_identity_fields() {
        let device = DeviceIdentity {
            device_serial: "DEV001".into(),
            hardware_version: "evt2".into(),
        };
        let software = SoftwareIdentity {
            software_type: "main-app".into(),
            software_version: "4.5.6".into(),
            sdk_version: "1.0.0".into(),
        };
        let bytes = build_reboot_event_json(&device, &software, 32773);
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["EventInfo"]["Reason"], 32773);
        assert_eq!(value["HardwareVersion"], "evt2");
    }
}
