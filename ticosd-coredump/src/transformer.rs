// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transforms a raw kernel coredump (read from stdin, forward-only) into the
//! compact, vendor-tagged core file ticosd queues for upload. Grounded on
//! `core_elf_transformer.c`: `PT_NOTE` segments are copied verbatim, `PT_LOAD`
//! segments are re-read from the crashed process's own address space (not trusted
//! from the kernel's dump, which may be truncated), and any other segment type is
//! dropped with a warning. A vendor metadata note is appended last.

use crate::procmem::ProcMem;
use std::io;
use thiserror::Error;
use ticosd_elf::reader::{CoreElfReader, ElfReadError, ElfReadIo};
use ticosd_elf::types::{Elf64Phdr, PT_LOAD, PT_NOTE};
use ticosd_elf::writer::{CoreElfWriter, ElfWriteError, ElfWriteIo};
use ticosd_elf::{build_metadata_note, CoredumpMetadata};

/// Segment data is streamed out of `/proc/<pid>/mem` this many bytes at a time.
const PROC_MEM_COPY_BUFFER_SIZE: usize = 4096;
/// Matches the original's fixed-size warning buffer; once full, further warnings
/// are only logged, not carried in the report.
const MAX_WARNINGS: usize = 16;
/// Used to fill bytes the transformer could not read back out of the crashed
/// process, so the resulting core file still has the right shape even when part
/// of it is unrecoverable.
const UNREADABLE_FILL_BYTE: u8 = 0xEF;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("reading input coredump: {0}")]
    Read(#[from] ElfReadError),

    #[error("writing transformed coredump: {0}")]
    Write(#[from] ElfWriteError),
}

/// Non-fatal observations made while transforming one coredump (e.g. a segment
/// type that had to be dropped).
pub struct TransformReport {
    pub warnings: Vec<String>,
    pub warnings_dropped: usize,
}

fn push_warning(warnings: &mut Vec<String>, dropped: &mut usize, message: String) {
    if warnings.len() < MAX_WARNINGS {
        warnings.push(message);
    } else {
        *dropped += 1;
        tracing::warn!("{message} (warning buffer full, not retained in report)");
    }
}

/// Copies `len` bytes starting at `vaddr` out of `proc_mem` into `io`, in
/// fixed-size chunks. A short or failed read at any point is padded with
/// `UNREADABLE_FILL_BYTE` rather than aborting the segment -- partial memory is
/// still more useful to a debugger than no memory.
fn copy_proc_mem(
    proc_mem: &dyn ProcMem,
    mut vaddr: u64,
    mut len: u64,
    io: &mut dyn ElfWriteIo,
) -> io::Result<()> {
    let mut chunk = [0u8; PROC_MEM_COPY_BUFFER_SIZE];
    while len > 0 {
        let want = len.min(PROC_MEM_COPY_BUFFER_SIZE as u64) as usize;
        let read = proc_mem.read_at(vaddr, &mut chunk[..want]).unwrap_or(0);
        if read < want {
            chunk[read..want].fill(UNREADABLE_FILL_BYTE);
        }
        io.write(&chunk[..want])?;
        vaddr += want as u64;
        len -= want as u64;
    }
    Ok(())
}

/// Runs the full reader -> writer pipeline for one coredump.
pub fn transform<IO: ElfReadIo>(
    mut reader: CoreElfReader<IO>,
    writer_io: &mut dyn ElfWriteIo,
    proc_mem: &dyn ProcMem,
    metadata: &CoredumpMetadata<'_>,
) -> Result<TransformReport, TransformError> {
    let mut warnings = Vec::new();
    let mut warnings_dropped = 0;

    let ehdr = reader.read_header()?;
    if ehdr.is_none() {
        push_warning(
            &mut warnings,
            &mut warnings_dropped,
            "input is not a valid or complete ELF core file; emitting metadata-only output".to_string(),
        );
    }
    let segments = match &ehdr {
        Some(ehdr) => match reader.read_segment_headers(ehdr)? {
            Some(segments) => segments,
            None => {
                push_warning(
                    &mut warnings,
                    &mut warnings_dropped,
                    "truncated segment header table; emitting metadata-only output".to_string(),
                );
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let mut writer = CoreElfWriter::new(ehdr.map(|h| h.e_machine).unwrap_or(0));

    for phdr in &segments {
        handle_segment(
            &mut reader,
            &mut writer,
            phdr,
            proc_mem,
            &mut warnings,
            &mut warnings_dropped,
        )?;
    }

    let note_phdr = Elf64Phdr {
        p_type: PT_NOTE,
        p_flags: 0,
        p_offset: 0,
        p_vaddr: 0,
        p_paddr: 0,
        p_filesz: 0,
        p_memsz: 0,
        p_align: 1,
    };
    writer.add_segment_with_buffer(note_phdr, build_metadata_note(metadata));

    writer.write(writer_io)?;

    Ok(TransformReport {
        warnings,
        warnings_dropped,
    })
}

fn handle_segment<IO: ElfReadIo>(
    reader: &mut CoreElfReader<IO>,
    writer: &mut CoreElfWriter<'_>,
    phdr: &Elf64Phdr,
    proc_mem: &dyn ProcMem,
    warnings: &mut Vec<String>,
    warnings_dropped: &mut usize,
) -> Result<(), TransformError> {
    match phdr.p_type {
        PT_NOTE => match reader.read_segment_data(phdr)? {
            Some(data) => writer.add_segment_with_buffer(*phdr, data),
            None => push_warning(
                warnings,
                warnings_dropped,
                format!("note segment at offset {} was unreadable (out of order)", phdr.p_offset),
            ),
        },
        PT_LOAD => {
            // Drain this segment's bytes out of the kernel's own dump so the
            // stream position stays in sync, even though we re-source the real
            // bytes from /proc/<pid>/mem below.
            let _ = reader.read_segment_data(phdr)?;
            let vaddr = phdr.p_vaddr;
            let len = phdr.p_filesz;
            writer.add_segment_with_callback(*phdr, move |io| copy_proc_mem(proc_mem, vaddr, len, io));
        }
        other => {
            let _ = reader.read_segment_data(phdr)?;
            push_warning(
                warnings,
                warnings_dropped,
                format!("dropping unsupported segment type {other}"),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procmem::fake::FakeProcMem;
    use ticosd_elf::reader::StdReadIo;
    use ticosd_elf::writer::FileWriteIo;
    use ticosd_elf::types::Elf64Phdr;

    fn metadata() -> CoredumpMetadata<'static> {
        CoredumpMetadata {
            linux_sdk_version: "1.0.0",
            captured_time: 1_753_500_000,
            device_serial: "DEV001",
            hardware_version: "evt2",
            software_type: "main-app",
            software_version: "4.5.6",
        }
    }

    #[test]
    fn load_segment_is_resourced_from_proc_mem_not_the_kernel_dump() {
        let mut source = CoreElfWriter::new(0xb7);
        source.add_segment_with_buffer(
            Elf64Phdr {
                p_type: PT_LOAD,
                p_flags: 6,
                p_offset: 0,
                p_vaddr: 0x1000,
                p_paddr: 0,
                p_filesz: 4,
                p_memsz: 4,
                p_align: 1,
            },
            vec![0, 0, 0, 0], // kernel's dump is stale/zeroed
        );
        let mut kernel_dump = FileWriteIo(Vec::new());
        source.write(&mut kernel_dump).unwrap();

        let mut proc_mem = FakeProcMem::new();
        proc_mem.map(0x1000, vec![0xAA, 0xBB, 0xCC, 0xDD]);

        let reader = CoreElfReader::new(StdReadIo(&kernel_dump.0[..]));
        let mut out = FileWriteIo(Vec::new());
        let report = transform(reader, &mut out, &proc_mem, &metadata()).unwrap();
        assert!(report.warnings.is_empty());

        assert!(out.0.windows(4).any(|w| w == [0xAA, 0xBB, 0xCC, 0xDD]));
    }

    #[test]
    fn unmapped_load_bytes_are_filled_with_sentinel() {
        let mut source = CoreElfWriter::new(0xb7);
        source.add_segment_with_buffer(
            Elf64Phdr {
                p_type: PT_LOAD,
                p_flags: 6,
                p_offset: 0,
                p_vaddr: 0x2000,
                p_paddr: 0,
                p_filesz: 8,
                p_memsz: 8,
                p_align: 1,
            },
            vec![0; 8],
        );
        let mut kernel_dump = FileWriteIo(Vec::new());
        source.write(&mut kernel_dump).unwrap();

        let proc_mem = FakeProcMem::new(); // nothing mapped
        let reader = CoreElfReader::new(StdReadIo(&kernel_dump.0[..]));
        let mut out = FileWriteIo(Vec::new());
        transform(reader, &mut out, &proc_mem, &metadata()).unwrap();

        assert!(out.0.windows(8).any(|w| w == [0xEF; 8]));
    }

    #[test]
    fn unsupported_segment_type_is_dropped_with_a_warning() {
        let mut source = CoreElfWriter::new(0xb7);
        source.add_segment_with_buffer(
            Elf64Phdr {
                p_type: 0x6474e550, // PT_GNU_EH_FRAME, not handled
                p_flags: 4,
                p_offset: 0,
                p_vaddr: 0,
                p_paddr: 0,
                p_filesz: 4,
                p_memsz: 4,
                p_align: 1,
            },
            vec![1, 2, 3, 4],
        );
        let mut kernel_dump = FileWriteIo(Vec::new());
        source.write(&mut kernel_dump).unwrap();

        let proc_mem = FakeProcMem::new();
        let reader = CoreElfReader::new(StdReadIo(&kernel_dump.0[..]));
        let mut out = FileWriteIo(Vec::new());
        let report = transform(reader, &mut out, &proc_mem, &metadata()).unwrap();
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn truncated_input_produces_a_metadata_only_core_file_instead_of_aborting() {
        let proc_mem = FakeProcMem::new();
        let reader = CoreElfReader::new(StdReadIo(&b"not a full ELF header"[..]));
        let mut out = FileWriteIo(Vec::new());
        let report = transform(reader, &mut out, &proc_mem, &metadata()).unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert!(!out.0.is_empty());

        let mut reread = CoreElfReader::new(StdReadIo(&out.0[..]));
        let ehdr = reread.read_header().unwrap().unwrap();
        assert_eq!(ehdr.e_phnum, 1); // metadata note only
    }
}
