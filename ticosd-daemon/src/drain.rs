// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The supervisor's drain loop: one queue-draining pass per wakeup, exponential
//! backoff between passes while delivery is failing, and the per-record-type
//! dispatch to the upload engine. Grounded on `ticosd.c`'s
//! `prv_ticosd_process_loop` (the `override_interval` backoff state machine) and
//! `prv_ticosd_process_tx_queue` (the per-`TxData` type switch to a network call).

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use ticosd_common::{DeviceIdentity, SoftwareIdentity};
use ticosd_queue::{FileQueue, RecordType, TxRecord};
use ticosd_upload::{FailureLogGate, NetworkResult, UploadClient};

use crate::signals;

const BACKOFF_INITIAL: Duration = Duration::from_secs(60);
const BACKOFF_MULTIPLIER: u32 = 2;

/// Runs until `signals::should_terminate()`, backing off after each failed drain
/// pass and resetting to `BACKOFF_INITIAL` after a pass that fully empties the
/// queue (spec.md §4.10, invariant 7).
pub fn run(
    queue: &Arc<Mutex<FileQueue>>,
    client: &UploadClient,
    device: &DeviceIdentity,
    software: &SoftwareIdentity,
    refresh_interval: Duration,
) {
    let gate = FailureLogGate::new();
    let mut backoff = BACKOFF_INITIAL;

    while !signals::should_terminate() {
        let wakeup = Instant::now();

        let interval = if drain_all_or_fail(queue, client, device, software, &gate) {
            backoff = BACKOFF_INITIAL;
            refresh_interval
        } else {
            let capped = backoff.min(refresh_interval);
            backoff = backoff.saturating_mul(BACKOFF_MULTIPLIER);
            capped
        };

        let remaining = interval.saturating_sub(wakeup.elapsed());
        signals::interruptible_sleep(remaining);
    }
}

/// Drains every record currently queued. Returns `true` if the queue ended up
/// empty, `false` if a retryable failure stopped the pass with records still
/// queued (the failed record stays at the head for the next pass).
fn drain_all_or_fail(
    queue: &Arc<Mutex<FileQueue>>,
    client: &UploadClient,
    device: &DeviceIdentity,
    software: &SoftwareIdentity,
    gate: &FailureLogGate,
) -> bool {
    loop {
        let record = {
            let mut q = queue.lock().expect("queue lock poisoned");
            match q.read_head() {
                Ok(Some(r)) => r,
                Ok(None) => return true,
                Err(e) => {
                    tracing::error!(error = %e, "queue read failed, aborting drain pass");
                    return false;
                }
            }
        };

        let result = deliver(&record, client, device, software);
        gate.observe(
            result,
            || tracing::warn!("delivery failing, backing off"),
            || tracing::info!("delivery recovered"),
        );

        match result {
            NetworkResult::Ok | NetworkResult::ErrorNoRetry => {
                if matches!(record.record_type, RecordType::CoreUpload | RecordType::CoreUploadGzip) {
                    delete_core_file(&record.payload);
                }
                let mut q = queue.lock().expect("queue lock poisoned");
                if let Err(e) = q.complete_read() {
                    tracing::error!(error = %e, "failed to advance queue cursor");
                    return false;
                }
            }
            NetworkResult::ErrorRetryLater => return false,
        }
    }
}

fn deliver(
    record: &TxRecord,
    client: &UploadClient,
    device: &DeviceIdentity,
    software: &SoftwareIdentity,
) -> NetworkResult {
    match record.record_type {
        RecordType::RebootEvent => deliver_reboot_event(record, client),
        RecordType::Attributes => deliver_attributes(record, client, device),
        RecordType::CoreUpload => deliver_coredump(record, client, device, software, false),
        RecordType::CoreUploadGzip => deliver_coredump(record, client, device, software, true),
    }
}

fn deliver_reboot_event(record: &TxRecord, client: &UploadClient) -> NetworkResult {
    let body: serde_json::Value = match serde_json::from_slice(&record.payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "malformed reboot event payload, dropping");
            return NetworkResult::ErrorNoRetry;
        }
    };
    client.post_event("/api/v0/events", &body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "reboot event request failed to even produce a response");
        NetworkResult::ErrorRetryLater
    })
}

fn deliver_attributes(record: &TxRecord, client: &UploadClient, device: &DeviceIdentity) -> NetworkResult {
    let Some((timestamp, json)) = ticosd_plugins::attributes::decode_attributes_payload(&record.payload) else {
        tracing::error!("malformed attributes payload, dropping");
        return NetworkResult::ErrorNoRetry;
    };
    let body: serde_json::Value = match serde_json::from_slice(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "malformed attributes JSON, dropping");
            return NetworkResult::ErrorNoRetry;
        }
    };
    let captured_date = format_captured_date(timestamp);
    client
        .patch_attributes(&device.device_serial, &captured_date, &body)
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "attributes request failed to even produce a response");
            NetworkResult::ErrorRetryLater
        })
}

fn deliver_coredump(
    record: &TxRecord,
    client: &UploadClient,
    device: &DeviceIdentity,
    software: &SoftwareIdentity,
    gzipped: bool,
) -> NetworkResult {
    let Ok(path) = std::str::from_utf8(&record.payload) else {
        tracing::error!("malformed coredump path payload, dropping");
        return NetworkResult::ErrorNoRetry;
    };
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, path, "coredump file missing or unreadable, dropping record");
            return NetworkResult::ErrorNoRetry;
        }
    };
    client
        .upload_coredump(
            &device.device_serial,
            &device.hardware_version,
            &software.software_type,
            &software.software_version,
            gzipped,
            &bytes,
        )
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "coredump upload failed to even produce a response");
            NetworkResult::ErrorRetryLater
        })
}

fn delete_core_file(payload: &[u8]) {
    if let Ok(path) = std::str::from_utf8(payload) {
        if let Err(e) = std::fs::remove_file(Path::new(path)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path, "failed to remove delivered coredump file");
            }
        }
    }
}

/// Formats a `captured_date=ISO8601Z` query value from the attributes record's
/// `timestamp_epoch_s`, matching `?captured_date=...` in spec.md §6.
fn format_captured_date(epoch_s: u64) -> String {
    let datetime = chrono::DateTime::from_timestamp(epoch_s as i64, 0).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_captured_date_as_iso8601_zulu() {
        assert_eq!(format_captured_date(1_753_500_000), "2025-07-26T05:20:00Z");
    }
}
