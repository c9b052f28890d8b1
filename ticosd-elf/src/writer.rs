// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A streaming ELF64 core-file writer. Grounded on `core_elf_writer.c`: segments are
//! registered up front (owning either an in-memory buffer or a callback that
//! produces the bytes lazily), then `write()` emits the header, backfills each
//! segment's `p_offset`, and streams the bodies out in one forward pass -- no
//! seeking required of the underlying sink.

use crate::types::{Elf64Ehdr, Elf64Phdr, EHDR_SIZE, PHDR_SIZE};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElfWriteError {
    #[error("I/O error writing core file: {0}")]
    Io(#[from] io::Error),

    #[error("segment buffer length ({buffer_len}) does not match p_filesz ({filesz})")]
    SegmentLengthMismatch { buffer_len: usize, filesz: u64 },

    #[error("writer produced {actual} bytes for a segment but its header promised {expected}")]
    SegmentSizeMismatch { expected: u64, actual: u64 },
}

/// The write side of the streaming core file sink. [`crate::gzip::GzipWriteIo`]
/// decorates one of these to transparently gzip everything written to it.
pub trait ElfWriteIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

/// Writes directly to a `std::fs::File` (or any other plain `Write` + flush-able
/// sink), with no compression.
pub struct FileWriteIo<W: io::Write>(pub W);

impl<W: io::Write> ElfWriteIo for FileWriteIo<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.write_all(buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

enum SegmentData<'a> {
    Buffer(Vec<u8>),
    Callback(Box<dyn FnMut(&mut dyn ElfWriteIo) -> io::Result<()> + 'a>),
}

struct Segment<'a> {
    header: Elf64Phdr,
    data: SegmentData<'a>,
}

/// Builds up a list of segments and then streams a complete core ELF file out
/// through an [`ElfWriteIo`] sink in a single forward pass. `'a` bounds how long a
/// callback-backed segment's captured state (e.g. a `/proc/<pid>/mem` handle) must
/// stay alive -- at most as long as the writer itself.
pub struct CoreElfWriter<'a> {
    e_machine: u16,
    segments: Vec<Segment<'a>>,
}

const PADDING_WRITE_SIZE: usize = 4096;

impl<'a> CoreElfWriter<'a> {
    pub fn new(e_machine: u16) -> Self {
        Self {
            e_machine,
            segments: Vec::new(),
        }
    }

    /// Registers a segment whose entire body is already in memory. `header.p_filesz`
    /// is overwritten to match `buffer.len()`.
    pub fn add_segment_with_buffer(&mut self, mut header: Elf64Phdr, buffer: Vec<u8>) {
        header.p_filesz = buffer.len() as u64;
        self.segments.push(Segment {
            header,
            data: SegmentData::Buffer(buffer),
        });
    }

    /// Registers a segment whose body is produced lazily by `write_body`, which
    /// must write exactly `header.p_filesz` bytes to the sink it is given (e.g.
    /// streaming a `PT_LOAD` segment straight out of `/proc/<pid>/mem`).
    pub fn add_segment_with_callback(
        &mut self,
        header: Elf64Phdr,
        write_body: impl FnMut(&mut dyn ElfWriteIo) -> io::Result<()> + 'a,
    ) {
        self.segments.push(Segment {
            header,
            data: SegmentData::Callback(Box::new(write_body)),
        });
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Emits the ELF header, the segment header table (with `p_offset` backfilled),
    /// and then every segment's body in order, finishing with `io.sync()`.
    pub fn write(mut self, io: &mut dyn ElfWriteIo) -> Result<(), ElfWriteError> {
        let ehdr = Elf64Ehdr::new_core(self.e_machine, self.segments.len() as u16);
        io.write(&ehdr.to_bytes())?;
        let mut write_offset = EHDR_SIZE as u64;

        let mut segment_data_offset = write_offset + (PHDR_SIZE as u64) * self.segments.len() as u64;
        for segment in &mut self.segments {
            let pad = segment.header.padding_before(segment_data_offset);
            segment.header.p_offset = segment_data_offset + pad;
            segment_data_offset += pad + segment.header.p_filesz;
        }

        for segment in &self.segments {
            io.write(&segment.header.to_bytes())?;
        }
        write_offset += (PHDR_SIZE as u64) * self.segments.len() as u64;

        for segment in &mut self.segments {
            let pad_len = segment.header.p_offset - write_offset;
            write_padding(io, pad_len)?;
            write_offset += pad_len;

            match &mut segment.data {
                SegmentData::Buffer(buf) => {
                    if buf.len() as u64 != segment.header.p_filesz {
                        return Err(ElfWriteError::SegmentLengthMismatch {
                            buffer_len: buf.len(),
                            filesz: segment.header.p_filesz,
                        });
                    }
                    io.write(buf)?;
                }
                SegmentData::Callback(cb) => {
                    cb(io)?;
                }
            }
            write_offset += segment.header.p_filesz;

            let expected = segment.header.p_offset + segment.header.p_filesz;
            if write_offset != expected {
                return Err(ElfWriteError::SegmentSizeMismatch {
                    expected: segment.header.p_filesz,
                    actual: write_offset.saturating_sub(segment.header.p_offset),
                });
            }
        }

        io.sync()?;
        Ok(())
    }
}

fn write_padding(io: &mut dyn ElfWriteIo, mut len: u64) -> io::Result<()> {
    let zeros = [0u8; PADDING_WRITE_SIZE];
    while len > 0 {
        let chunk = len.min(PADDING_WRITE_SIZE as u64) as usize;
        io.write(&zeros[..chunk])?;
        len -= chunk as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PT_LOAD, PT_NOTE};

    fn note_segment(len: u64) -> Elf64Phdr {
        Elf64Phdr {
            p_type: PT_NOTE,
            p_flags: 0,
            p_offset: 0,
            p_vaddr: 0,
            p_paddr: 0,
            p_filesz: len,
            p_memsz: len,
            p_align: 1,
        }
    }

    fn load_segment(len: u64, align: u64) -> Elf64Phdr {
        Elf64Phdr {
            p_type: PT_LOAD,
            p_flags: 6,
            p_offset: 0,
            p_vaddr: 0x400000,
            p_paddr: 0,
            p_filesz: len,
            p_memsz: len,
            p_align: align,
        }
    }

    #[test]
    fn writes_header_table_and_bodies_with_alignment_padding() {
        let mut writer = CoreElfWriter::new(0xb7);
        writer.add_segment_with_buffer(note_segment(3), vec![1, 2, 3]);
        writer.add_segment_with_buffer(load_segment(4, 4096), vec![9, 9, 9, 9]);

        let mut out = FileWriteIo(Vec::new());
        writer.write(&mut out).unwrap();

        let bytes = out.0;
        let ehdr = Elf64Ehdr::from_bytes(&bytes[0..EHDR_SIZE].try_into().unwrap());
        assert!(ehdr.is_valid_core_elf());
        assert_eq!(ehdr.e_phnum, 2);
        assert_eq!(ehdr.e_phoff as usize, EHDR_SIZE);

        let phdr_table_off = EHDR_SIZE;
        let first = Elf64Phdr::from_bytes(
            &bytes[phdr_table_off..phdr_table_off + PHDR_SIZE].try_into().unwrap(),
        );
        let second = Elf64Phdr::from_bytes(
            &bytes[phdr_table_off + PHDR_SIZE..phdr_table_off + 2 * PHDR_SIZE]
                .try_into()
                .unwrap(),
        );
        assert_eq!(first.p_offset, (EHDR_SIZE + 2 * PHDR_SIZE) as u64);
        // second segment must land on a 4096-byte boundary
        assert_eq!(second.p_offset % 4096, 0);

        let body = &bytes[second.p_offset as usize..second.p_offset as usize + 4];
        assert_eq!(body, &[9, 9, 9, 9]);
    }

    #[test]
    fn callback_segment_streams_its_own_body() {
        let mut writer = CoreElfWriter::new(0xb7);
        writer.add_segment_with_callback(load_segment(6, 1), |io| io.write(b"abcdef"));

        let mut out = FileWriteIo(Vec::new());
        writer.write(&mut out).unwrap();

        assert!(out.0.windows(6).any(|w| w == b"abcdef"));
    }

    #[test]
    fn rejects_buffer_whose_length_disagrees_with_filesz() {
        let mut writer = CoreElfWriter::new(0xb7);
        let mut header = note_segment(10);
        header.p_filesz = 10;
        writer.segments.push(Segment {
            header,
            data: SegmentData::Buffer(vec![1, 2, 3]),
        });

        let mut out = FileWriteIo(Vec::new());
        let err = writer.write(&mut out).unwrap_err();
        assert!(matches!(err, ElfWriteError::SegmentLengthMismatch { .. }));
    }
}
