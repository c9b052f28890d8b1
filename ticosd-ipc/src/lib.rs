// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The `AF_UNIX SOCK_DGRAM` wire protocol and socket plumbing shared by `ticosd`
//! and `ticosctl`.

pub mod socket;
pub mod wire;

pub use socket::{IpcListener, IpcSender};
pub use wire::{
    match_tag, AttributesMessage, CoreNotifyMessage, ATTRIBUTES_TAG, COLLECTD_TAG, CORE_TAG,
    MAX_DATAGRAM_SIZE,
};
