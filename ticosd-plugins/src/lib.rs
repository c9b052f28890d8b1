// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The plugin capability trait, the static plugin table, and the three concrete
//! plugins ticosd's end-to-end scenarios exercise: `attributes`, `reboot`, and
//! `coredump`. Grounded on `util/plugins.c`'s `g_plugins[]` table and
//! `ticosd_plugins_process_ipc`'s linear-scan-by-prefix dispatch, redesigned per
//! spec.md §9 as a trait-object table instead of a function-pointer struct array.

pub mod attributes;
pub mod coredump;
pub mod plugin;
pub mod reboot;
pub mod registry;

pub use attributes::AttributesPlugin;
pub use coredump::CoredumpPlugin;
pub use plugin::Plugin;
pub use reboot::RebootPlugin;
pub use registry::PluginRegistry;
