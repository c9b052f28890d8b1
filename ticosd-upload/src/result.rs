// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The three-way outcome every upload attempt reduces to, and the log-suppression
//! policy wrapped around it. Grounded on `network.c`'s `prv_check_error` (status
//! code -> retry classification) and its `prv_log_first_failed_request` /
//! `prv_log_first_succeeded_request` pair, which avoid flooding the log with one
//! line per queue-drain attempt during an extended outage.

use std::sync::atomic::{AtomicBool, Ordering};

/// What happened when ticosd tried to deliver one record to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkResult {
    /// Delivered. The record can be dropped from the queue.
    Ok,
    /// A transient condition (5xx, 429, 408, or a transport-level failure). The
    /// record stays at the head of the queue; the supervisor's drain loop must
    /// stop and back off rather than attempt the next record out of order.
    ErrorRetryLater,
    /// The server rejected the record outright (any other 4xx). Retrying
    /// unchanged would just fail again, so the record is dropped.
    ErrorNoRetry,
}

/// Classifies an HTTP status code the way `prv_check_error` does: anything
/// successful is `Ok`, 5xx/408/429 are retryable, every other client error is
/// terminal.
pub fn classify_status(status: u16) -> NetworkResult {
    match status {
        200..=299 => NetworkResult::Ok,
        408 | 429 => NetworkResult::ErrorRetryLater,
        500..=599 => NetworkResult::ErrorRetryLater,
        _ => NetworkResult::ErrorNoRetry,
    }
}

/// A transport-level failure (DNS, connection refused, timeout) is always
/// retryable -- there's no status code to inspect, and the failure is almost
/// always transient on an embedded device's flaky network link.
pub fn classify_transport_failure() -> NetworkResult {
    NetworkResult::ErrorRetryLater
}

/// Tracks whether the last delivery attempt failed, so callers only log the first
/// failure in a streak and the first recovery after it, not every attempt.
#[derive(Default)]
pub struct FailureLogGate {
    during_failure: AtomicBool,
}

impl FailureLogGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call with the outcome of an attempt; logs at most one line per state
    /// transition via `on_first_failure`/`on_first_recovery`.
    pub fn observe(
        &self,
        result: NetworkResult,
        on_first_failure: impl FnOnce(),
        on_first_recovery: impl FnOnce(),
    ) {
        let failed = matches!(result, NetworkResult::ErrorRetryLater);
        let was_failing = self.during_failure.swap(failed, Ordering::SeqCst);
        if failed && !was_failing {
            on_first_failure();
        } else if !failed && was_failing {
            on_first_recovery();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn classifies_status_codes() {
        assert_eq!(classify_status(204), NetworkResult::Ok);
        assert_eq!(classify_status(429), NetworkResult::ErrorRetryLater);
        assert_eq!(classify_status(503), NetworkResult::ErrorRetryLater);
        assert_eq!(classify_status(404), NetworkResult::ErrorNoRetry);
        assert_eq!(classify_status(401), NetworkResult::ErrorNoRetry);
    }

    #[test]
    fn logs_only_on_transitions() {
        let gate = FailureLogGate::new();
        let failures = AtomicUsize::new(0);
        let recoveries = AtomicUsize::new(0);

        for _ in 0..3 {
            gate.observe(
                NetworkResult::ErrorRetryLater,
                || {
                    failures.fetch_add(1, Ordering::SeqCst);
                },
                || {
                    recoveries.fetch_add(1, Ordering::SeqCst);
                },
            );
        }
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        gate.observe(
            NetworkResult::Ok,
            || {
                failures.fetch_add(1, Ordering::SeqCst);
            },
            || {
                recoveries.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(recoveries.load(Ordering::SeqCst), 1);
    }
}
