// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The HTTP upload engine: a blocking client for the three record shapes ticosd
//! delivers (events, attributes, coredumps), and the retry/log-suppression policy
//! wrapped around every attempt.

pub mod client;
pub mod error;
pub mod result;

pub use client::{UploadClient, UploadClientBuilder};
pub use error::UploadError;
pub use result::{classify_status, classify_transport_failure, FailureLogGate, NetworkResult};
