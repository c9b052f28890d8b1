// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A streaming ELF64 core-file reader. Grounded on `core_elf_reader.c`/`.h`: the
//! kernel hands coredumps to the collecting helper over a non-seekable pipe, so
//! this reader only ever moves forward -- segment data can be read once, in
//! non-decreasing `p_offset` order, and anything already passed is gone.

use crate::types::{Elf64Ehdr, Elf64Phdr, EHDR_SIZE, PHDR_SIZE};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElfReadError {
    #[error("I/O error reading core file: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected end of stream: wanted {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}

/// The read side of the streaming core file source. Short reads are expected and
/// retried internally; a `read` returning `Ok(0)` means end of stream.
pub trait ElfReadIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Reads from any `std::io::Read`, e.g. the coredump helper's stdin.
pub struct StdReadIo<R: io::Read>(pub R);

impl<R: io::Read> ElfReadIo for StdReadIo<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

const DISCARD_CHUNK: usize = 4096;

pub struct CoreElfReader<IO> {
    io: IO,
    stream_pos: u64,
}

impl<IO: ElfReadIo> CoreElfReader<IO> {
    pub fn new(io: IO) -> Self {
        Self { io, stream_pos: 0 }
    }

    pub fn stream_pos(&self) -> u64 {
        self.stream_pos
    }

    /// Reads until `buf` is full or the stream ends, returning however many bytes
    /// were actually read (a short read on EOF, never an error by itself).
    fn read_all(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.io.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        self.stream_pos += total as u64;
        Ok(total)
    }

    fn discard(&mut self, mut count: u64) -> io::Result<u64> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        let requested = count;
        while count > 0 {
            let chunk = count.min(DISCARD_CHUNK as u64) as usize;
            let n = self.read_all(&mut scratch[..chunk])?;
            if n == 0 {
                break;
            }
            count -= n as u64;
        }
        Ok(requested - count)
    }

    /// Reads and validates the ELF header. Must be the first call made on a fresh
    /// reader. A truncated or malformed header is a coredump parse warning, not a
    /// fatal error (spec.md §7): it is logged and `Ok(None)` is returned so the
    /// caller can transition straight to its "done, no segments" state, the same
    /// way [`CoreElfReader::read_segment_data`] reports an unreachable read with
    /// `Ok(None)` instead of an `Err`.
    pub fn read_header(&mut self) -> Result<Option<Elf64Ehdr>, ElfReadError> {
        let mut buf = [0u8; EHDR_SIZE];
        let n = self.read_all(&mut buf)?;
        if n != EHDR_SIZE {
            tracing::warn!(expected = EHDR_SIZE, got = n, "truncated ELF header");
            return Ok(None);
        }
        let ehdr = Elf64Ehdr::from_bytes(&buf);
        if !ehdr.is_valid_core_elf() {
            tracing::warn!("input is not a valid ELF64 core file");
            return Ok(None);
        }
        Ok(Some(ehdr))
    }

    /// Reads the segment header table, skipping forward over any gap between the
    /// end of the ELF header and `ehdr.e_phoff` (logging a warning -- a well-formed
    /// core file shouldn't have one, but the format doesn't forbid it). A segment
    /// table that lies behind the stream position or is truncated mid-table is
    /// also only a warning (spec.md §7): `Ok(None)` is returned rather than an
    /// `Err`, mirroring `read_segment_data`'s non-fatal `Ok(None)`.
    pub fn read_segment_headers(&mut self, ehdr: &Elf64Ehdr) -> Result<Option<Vec<Elf64Phdr>>, ElfReadError> {
        if ehdr.e_phoff > self.stream_pos {
            let gap = ehdr.e_phoff - self.stream_pos;
            tracing::warn!(gap, "skipping bytes between ELF header and segment table");
            self.discard(gap)?;
        } else if ehdr.e_phoff < self.stream_pos {
            tracing::warn!("segment header table offset is behind the current stream position; cannot rewind a non-seekable stream");
            return Ok(None);
        }

        let mut segments = Vec::with_capacity(ehdr.e_phnum as usize);
        for _ in 0..ehdr.e_phnum {
            let mut buf = [0u8; PHDR_SIZE];
            let n = self.read_all(&mut buf)?;
            if n != PHDR_SIZE {
                tracing::warn!(expected = PHDR_SIZE, got = n, "truncated segment header table");
                return Ok(None);
            }
            segments.push(Elf64Phdr::from_bytes(&buf));
        }
        Ok(Some(segments))
    }

    /// Reads exactly `phdr.p_filesz` bytes of a segment's data, skipping forward to
    /// `phdr.p_offset` first. Returns `Ok(None)` if `p_offset` is already behind the
    /// current stream position -- the segment table listed segments out of the
    /// order their data actually appears in the stream, which this reader (like the
    /// original) cannot recover from without seeking.
    pub fn read_segment_data(&mut self, phdr: &Elf64Phdr) -> Result<Option<Vec<u8>>, ElfReadError> {
        if phdr.p_offset < self.stream_pos {
            return Ok(None);
        }
        let gap = phdr.p_offset - self.stream_pos;
        self.discard(gap)?;

        let mut buf = vec![0u8; phdr.p_filesz as usize];
        let n = self.read_all(&mut buf)?;
        if n as u64 != phdr.p_filesz {
            return Err(ElfReadError::Truncated {
                expected: phdr.p_filesz as usize,
                got: n,
            });
        }
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Elf64Ehdr, Elf64Phdr, PT_LOAD, PT_NOTE};
    use crate::writer::{CoreElfWriter, ElfWriteIo, FileWriteIo};

    fn phdr(p_type: u32, filesz: u64) -> Elf64Phdr {
        Elf64Phdr {
            p_type,
            p_flags: 6,
            p_offset: 0,
            p_vaddr: 0x1000,
            p_paddr: 0,
            p_filesz: filesz,
            p_memsz: filesz,
            p_align: 1,
        }
    }

    #[test]
    fn reads_back_a_core_file_written_by_the_writer() {
        let mut writer = CoreElfWriter::new(0xb7);
        writer.add_segment_with_buffer(phdr(PT_NOTE, 4), vec![1, 2, 3, 4]);
        writer.add_segment_with_buffer(phdr(PT_LOAD, 3), vec![9, 8, 7]);
        let mut out = FileWriteIo(Vec::new());
        writer.write(&mut out).unwrap();

        let mut reader = CoreElfReader::new(StdReadIo(&out.0[..]));
        let ehdr = reader.read_header().unwrap().unwrap();
        assert!(ehdr.is_valid_core_elf());
        assert_eq!(ehdr.e_phnum, 2);

        let segments = reader.read_segment_headers(&ehdr).unwrap().unwrap();
        assert_eq!(segments.len(), 2);

        let note_data = reader.read_segment_data(&segments[0]).unwrap().unwrap();
        assert_eq!(note_data, vec![1, 2, 3, 4]);
        let load_data = reader.read_segment_data(&segments[1]).unwrap().unwrap();
        assert_eq!(load_data, vec![9, 8, 7]);
    }

    #[test]
    fn truncated_header_is_a_warning_not_an_error() {
        let mut reader = CoreElfReader::new(StdReadIo(&b"not enough bytes"[..]));
        assert!(reader.read_header().unwrap().is_none());
    }

    #[test]
    fn non_core_elf_is_a_warning_not_an_error() {
        let mut ehdr_bytes = Elf64Ehdr::new_core(0xb7, 0).to_bytes();
        ehdr_bytes[16] = 2; // ET_EXEC instead of ET_CORE
        let mut reader = CoreElfReader::new(StdReadIo(&ehdr_bytes[..]));
        assert!(reader.read_header().unwrap().is_none());
    }

    #[test]
    fn out_of_order_segment_read_returns_none() {
        let mut writer = CoreElfWriter::new(0xb7);
        writer.add_segment_with_buffer(phdr(PT_NOTE, 4), vec![1, 2, 3, 4]);
        writer.add_segment_with_buffer(phdr(PT_LOAD, 3), vec![9, 8, 7]);
        let mut out = FileWriteIo(Vec::new());
        writer.write(&mut out).unwrap();

        let mut reader = CoreElfReader::new(StdReadIo(&out.0[..]));
        let ehdr = reader.read_header().unwrap().unwrap();
        let segments = reader.read_segment_headers(&ehdr).unwrap().unwrap();

        let _ = reader.read_segment_data(&segments[1]).unwrap();
        // segment 0's data offset is now behind the stream position
        let missed = reader.read_segment_data(&segments[0]).unwrap();
        assert!(missed.is_none());
    }
}
