// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Streaming ELF64 core-file reading and writing, a gzip sink decorator, and the
//! CBOR-framed vendor metadata note embedded in every coredump ticosd uploads.
//!
//! Every piece here assumes a forward-only byte stream: coredumps arrive over a
//! pipe from the kernel's `core_pattern` helper invocation and are read exactly
//! once, so none of these types support seeking.

pub mod cbor;
pub mod gzip;
pub mod note;
pub mod reader;
pub mod types;
pub mod writer;

pub use note::{build_metadata_note, CoredumpMetadata};
pub use reader::{CoreElfReader, ElfReadError, ElfReadIo, StdReadIo};
pub use types::{Elf64Ehdr, Elf64Phdr, ET_CORE, PT_LOAD, PT_NOTE};
pub use writer::{CoreElfWriter, ElfWriteError, ElfWriteIo, FileWriteIo};
