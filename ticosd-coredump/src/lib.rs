// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The coredump ingest pipeline: a rate limiter protecting against crash loops, a
//! `/proc/<pid>/mem` accessor, and the transformer that turns a raw kernel
//! coredump into the compact core file ticosd queues for upload.

pub mod procmem;
pub mod rate_limiter;
pub mod transformer;

pub use procmem::{ProcFsMem, ProcMem};
pub use rate_limiter::RateLimiter;
pub use transformer::{transform, TransformError, TransformReport};
