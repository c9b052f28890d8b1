// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The `Elf64_Nhdr`-framed metadata note every transformed coredump carries, and the
//! dictionary it embeds. Grounded on `core_elf_metadata.c`: note name `"Ticos"`, note
//! type `0x4154454d`, and a 7-entry dictionary of unsigned-integer keys.

use crate::cbor::{dictionary_size, encode_dictionary, ByteSink, Entry};

/// Arbitrary vendor note type used to tag the metadata note, matching the
/// original's `#define TICOS_CORE_ELF_METADATA_NOTE_TYPE 0x4154454d`.
pub const METADATA_NOTE_TYPE: u32 = 0x4154_454d;
const NOTE_NAME: &str = "Ticos";

const KEY_SCHEMA_VERSION: u64 = 1;
const KEY_LINUX_SDK_VERSION: u64 = 2;
const KEY_CAPTURED_TIME: u64 = 3;
const KEY_DEVICE_SERIAL: u64 = 4;
const KEY_HARDWARE_VERSION: u64 = 5;
const KEY_SOFTWARE_TYPE: u64 = 6;
const KEY_SOFTWARE_VERSION: u64 = 7;

/// Always 1 today; bumped only if the dictionary's shape changes incompatibly.
const SCHEMA_VERSION: u64 = 1;

/// Everything the metadata note needs to describe the device and moment a coredump
/// was captured. `captured_time` is seconds since the Unix epoch, truncated to
/// 32 bits in the original format.
pub struct CoredumpMetadata<'a> {
    pub linux_sdk_version: &'a str,
    pub captured_time: u32,
    pub device_serial: &'a str,
    pub hardware_version: &'a str,
    pub software_type: &'a str,
    pub software_version: &'a str,
}

fn entries<'a>(meta: &'a CoredumpMetadata<'a>) -> [Entry<'a>; 7] {
    [
        Entry::Uint(KEY_SCHEMA_VERSION, SCHEMA_VERSION),
        Entry::Text(KEY_LINUX_SDK_VERSION, meta.linux_sdk_version),
        Entry::Uint(KEY_CAPTURED_TIME, meta.captured_time as u64),
        Entry::Text(KEY_DEVICE_SERIAL, meta.device_serial),
        Entry::Text(KEY_HARDWARE_VERSION, meta.hardware_version),
        Entry::Text(KEY_SOFTWARE_TYPE, meta.software_type),
        Entry::Text(KEY_SOFTWARE_VERSION, meta.software_version),
    ]
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// Frames `name` (a NUL-terminated vendor string), `note_type`, and `desc` as an
/// `Elf64_Nhdr`-prefixed note, 4-byte aligning both the name and description as
/// ELF notes require.
pub fn encode_note(name: &str, note_type: u32, desc: &[u8]) -> Vec<u8> {
    let name_bytes = {
        let mut v = name.as_bytes().to_vec();
        v.push(0);
        v
    };
    let namesz = name_bytes.len() as u32;
    let descsz = desc.len() as u32;

    let mut out = Vec::with_capacity(12 + align_up(name_bytes.len(), 4) + align_up(desc.len(), 4));
    out.extend_from_slice(&namesz.to_le_bytes());
    out.extend_from_slice(&descsz.to_le_bytes());
    out.extend_from_slice(&note_type.to_le_bytes());
    out.extend_from_slice(&name_bytes);
    out.resize(out.len() + (align_up(name_bytes.len(), 4) - name_bytes.len()), 0);
    out.extend_from_slice(desc);
    out.resize(out.len() + (align_up(desc.len(), 4) - desc.len()), 0);
    out
}

/// Builds the complete `Ticos` metadata note, ready to be attached to the output
/// ELF as a `PT_NOTE` segment's payload.
pub fn build_metadata_note(meta: &CoredumpMetadata<'_>) -> Vec<u8> {
    let entry_list = entries(meta);
    let mut desc = ByteSink(Vec::with_capacity(dictionary_size(&entry_list)));
    encode_dictionary(&mut desc, &entry_list);
    encode_note(NOTE_NAME, METADATA_NOTE_TYPE, &desc.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_header_reports_exact_sizes() {
        let note = encode_note("Ticos", METADATA_NOTE_TYPE, &[1, 2, 3]);
        let namesz = u32::from_le_bytes(note[0..4].try_into().unwrap());
        let descsz = u32::from_le_bytes(note[4..8].try_into().unwrap());
        let note_type = u32::from_le_bytes(note[8..12].try_into().unwrap());
        assert_eq!(namesz, 6); // "Ticos\0"
        assert_eq!(descsz, 3);
        assert_eq!(note_type, METADATA_NOTE_TYPE);
        // header(12) + name padded to 8 + desc padded to 4
        assert_eq!(note.len(), 12 + 8 + 4);
    }

    #[test]
    fn metadata_note_embeds_all_fields() {
        let meta = CoredumpMetadata {
            linux_sdk_version: "1.2.3",
            captured_time: 1_753_500_000,
            device_serial: "DEV001",
            hardware_version: "evt2",
            software_type: "main-app",
            software_version: "4.5.6",
        };
        let note = build_metadata_note(&meta);
        assert!(note.len() > 12);
        // the device serial bytes must show up somewhere in the encoded description
        assert!(note.windows(6).any(|w| w == b"DEV001"));
    }
}
