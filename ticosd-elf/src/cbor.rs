// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A minimal CBOR encoder (RFC 8949 major types 0/3/5 only: unsigned integers, text
//! strings, and maps) good enough to frame the metadata dictionary in
//! [`crate::note`]. Every encode method is driven through a [`Sink`], so the exact
//! same call sequence can either emit real bytes or just measure how many bytes it
//! would take — mirroring `ticos_cbor_encoder_size_only_init` in the original
//! `core_elf_metadata.c`, which computes the note's description length before
//! allocating it.

/// Where encoded bytes go. [`ByteSink`] actually collects them; [`SizeSink`] only
/// counts, so the writer can size an allocation before doing the real encode pass.
pub trait Sink {
    fn put(&mut self, bytes: &[u8]);
}

#[derive(Default)]
pub struct ByteSink(pub Vec<u8>);

impl Sink for ByteSink {
    fn put(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }
}

#[derive(Default)]
pub struct SizeSink(pub usize);

impl Sink for SizeSink {
    fn put(&mut self, bytes: &[u8]) {
        self.0 += bytes.len();
    }
}

const MAJOR_UINT: u8 = 0;
const MAJOR_TEXT: u8 = 3;
const MAJOR_MAP: u8 = 5;

fn write_head(sink: &mut impl Sink, major: u8, value: u64) {
    let major = major << 5;
    if value < 24 {
        sink.put(&[major | value as u8]);
    } else if value <= u8::MAX as u64 {
        sink.put(&[major | 24, value as u8]);
    } else if value <= u16::MAX as u64 {
        sink.put(&[major | 25]);
        sink.put(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        sink.put(&[major | 26]);
        sink.put(&(value as u32).to_be_bytes());
    } else {
        sink.put(&[major | 27]);
        sink.put(&value.to_be_bytes());
    }
}

/// Encodes a CBOR map header with `len` key/value pairs to follow.
pub fn encode_map_header(sink: &mut impl Sink, len: u64) {
    write_head(sink, MAJOR_MAP, len);
}

/// Encodes an unsigned integer, usable both as a dictionary key and as a value.
pub fn encode_uint(sink: &mut impl Sink, value: u64) {
    write_head(sink, MAJOR_UINT, value);
}

/// Encodes a UTF-8 text string value.
pub fn encode_text(sink: &mut impl Sink, value: &str) {
    write_head(sink, MAJOR_TEXT, value.len() as u64);
    sink.put(value.as_bytes());
}

/// One dictionary entry: an unsigned integer key plus a value that is either an
/// unsigned integer or a UTF-8 string (the only two value shapes the metadata note
/// needs, per `core_elf_metadata.c`).
pub enum Entry<'a> {
    Uint(u64, u64),
    Text(u64, &'a str),
}

/// Encodes a flat dictionary (map of uint keys to uint/text values) by running the
/// same entry sequence through the given sink. Calling this once with a
/// [`SizeSink`] and once with a [`ByteSink`] gives you the exact allocation size
/// and then the real bytes, without duplicating the encoding logic.
pub fn encode_dictionary(sink: &mut impl Sink, entries: &[Entry<'_>]) {
    encode_map_header(sink, entries.len() as u64);
    for entry in entries {
        match entry {
            Entry::Uint(key, value) => {
                encode_uint(sink, *key);
                encode_uint(sink, *value);
            }
            Entry::Text(key, value) => {
                encode_uint(sink, *key);
                encode_text(sink, value);
            }
        }
    }
}

/// Returns the exact byte length `encode_dictionary` would produce for `entries`,
/// without allocating the real buffer.
pub fn dictionary_size(entries: &[Entry<'_>]) -> usize {
    let mut size = SizeSink::default();
    encode_dictionary(&mut size, entries);
    size.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_uint_is_one_byte() {
        let mut out = ByteSink::default();
        encode_uint(&mut out, 1);
        assert_eq!(out.0, vec![0x01]);
    }

    #[test]
    fn large_uint_uses_four_byte_head() {
        let mut out = ByteSink::default();
        encode_uint(&mut out, 1_700_000_000);
        assert_eq!(out.0[0], (0 << 5) | 26);
        assert_eq!(out.0.len(), 5);
    }

    #[test]
    fn text_encodes_head_then_utf8_bytes() {
        let mut out = ByteSink::default();
        encode_text(&mut out, "abc");
        assert_eq!(out.0, vec![(3 << 5) | 3, b'a', b'b', b'c']);
    }

    #[test]
    fn size_sink_matches_byte_sink_length() {
        let entries = [
            Entry::Uint(1, 1),
            Entry::Text(2, "sdk-1.2.3"),
            Entry::Uint(3, 1_753_500_000),
        ];
        let mut bytes = ByteSink::default();
        encode_dictionary(&mut bytes, &entries);
        assert_eq!(dictionary_size(&entries), bytes.0.len());
    }
}
