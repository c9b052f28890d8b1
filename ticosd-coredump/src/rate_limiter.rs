// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A sliding-window event rate limiter backed by a small on-disk history file, so
//! the limit survives a daemon restart. Grounded on `util/rate_limiter.c`: a fixed
//! number of past event timestamps are kept; a new event is allowed only if the
//! oldest recorded timestamp has aged out of the window.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Allows up to `count` events per `duration` by remembering the `count` most
/// recent event timestamps. Persists best-effort to `history_file` after every
/// accepted event; a failure to persist never blocks the event itself.
pub struct RateLimiter {
    count: usize,
    duration_secs: i64,
    history: Vec<i64>,
    history_file: PathBuf,
}

impl RateLimiter {
    /// Returns `None` if the limiter is configured to be a no-op (`count == 0` or
    /// `duration_secs == 0`), mirroring `ticosd_rate_limiter_init` returning `NULL`
    /// in that case -- callers should treat a `None` limiter as "rate limiting
    /// disabled", not an error.
    pub fn new(count: usize, duration_secs: i64, history_file: PathBuf) -> Option<Self> {
        if count == 0 || duration_secs == 0 {
            return None;
        }
        let history = load_history(&history_file, count);
        Some(Self {
            count,
            duration_secs,
            history,
            history_file,
        })
    }

    /// Checks whether an event happening at `now` (seconds since the Unix epoch) is
    /// within the limit. If allowed, records `now` into the history (evicting the
    /// oldest entry) and persists it.
    pub fn check_event(&mut self, now: i64) -> bool {
        if self.history[self.count - 1] + self.duration_secs > now {
            return false;
        }
        for i in (0..self.count - 1).rev() {
            self.history[i + 1] = self.history[i];
        }
        self.history[0] = now;
        self.persist();
        true
    }

    fn persist(&self) {
        if let Err(e) = write_history(&self.history_file, &self.history) {
            tracing::warn!(error = %e, file = %self.history_file.display(), "failed to persist rate limiter history");
        }
    }
}

fn load_history(path: &Path, count: usize) -> Vec<i64> {
    let mut history = vec![0i64; count];
    let contents = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return history,
        Err(e) => {
            tracing::warn!(error = %e, file = %path.display(), "failed to read rate limiter history");
            return history;
        }
    };
    for (slot, token) in history.iter_mut().zip(contents.split_whitespace()) {
        match token.parse::<i64>() {
            Ok(value) => *slot = value,
            Err(_) => break,
        }
    }
    history
}

fn write_history(path: &Path, history: &[i64]) -> std::io::Result<()> {
    let mut out = String::new();
    for value in history {
        out.push_str(&value.to_string());
        out.push(' ');
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::File::create(&tmp_path)?.write_all(out.as_bytes())?;
    std::fs::rename(tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_when_count_or_duration_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RateLimiter::new(0, 60, dir.path().join("h")).is_none());
        assert!(RateLimiter::new(3, 0, dir.path().join("h")).is_none());
    }

    #[test]
    fn allows_up_to_count_events_then_rejects_until_window_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut limiter = RateLimiter::new(2, 60, dir.path().join("history")).unwrap();

        assert!(limiter.check_event(1000));
        assert!(limiter.check_event(1010));
        // third event arrives before the first of the last two ages out
        assert!(!limiter.check_event(1020));
        // once 60s have passed since the oldest retained event (1000), it's allowed again
        assert!(limiter.check_event(1061));
    }

    #[test]
    fn history_survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        {
            let mut limiter = RateLimiter::new(2, 60, path.clone()).unwrap();
            assert!(limiter.check_event(1000));
            assert!(limiter.check_event(1010));
        }
        let mut reloaded = RateLimiter::new(2, 60, path).unwrap();
        assert!(!reloaded.check_event(1020));
    }

    #[test]
    fn tolerates_missing_history_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut limiter = RateLimiter::new(1, 60, dir.path().join("does-not-exist")).unwrap();
        assert!(limiter.check_event(500));
    }
}
