// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! ELF64 on-disk structures and the constants this crate cares about. Field names
//! and layout follow `<elf.h>`; only what `core_elf_reader.c`/`core_elf_writer.c`
//! touch is reproduced here, not the whole ELF spec.

pub const EI_NIDENT: usize = 16;
pub const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELFCLASS64: u8 = 2;
pub const EV_CURRENT: u8 = 1;
pub const ET_CORE: u16 = 4;
pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_NOTE: u32 = 4;

pub const EHDR_SIZE: usize = 64;
pub const PHDR_SIZE: usize = 56;

/// `Elf64_Ehdr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Ehdr {
    pub e_ident: [u8; EI_NIDENT],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl Elf64Ehdr {
    pub fn new_core(e_machine: u16, e_phnum: u16) -> Self {
        let mut e_ident = [0u8; EI_NIDENT];
        e_ident[0..4].copy_from_slice(&ELFMAG);
        e_ident[4] = ELFCLASS64;
        e_ident[6] = EV_CURRENT;
        Self {
            e_ident,
            e_type: ET_CORE,
            e_machine,
            e_version: EV_CURRENT as u32,
            e_entry: 0,
            e_phoff: if e_phnum > 0 { EHDR_SIZE as u64 } else { 0 },
            e_shoff: 0,
            e_flags: 0,
            e_ehsize: EHDR_SIZE as u16,
            e_phentsize: PHDR_SIZE as u16,
            e_phnum,
            e_shentsize: 0,
            e_shnum: 0,
            e_shstrndx: 0,
        }
    }

    pub fn is_valid_core_elf(&self) -> bool {
        self.e_ident[0..4] == ELFMAG
            && self.e_ident[4] == ELFCLASS64
            && self.e_ident[6] == EV_CURRENT
            && self.e_version == EV_CURRENT as u32
            && self.e_ehsize as usize == EHDR_SIZE
            && self.e_phentsize as usize == PHDR_SIZE
            && self.e_type == ET_CORE
    }

    pub fn to_bytes(&self) -> [u8; EHDR_SIZE] {
        let mut out = [0u8; EHDR_SIZE];
        out[0..16].copy_from_slice(&self.e_ident);
        out[16..18].copy_from_slice(&self.e_type.to_le_bytes());
        out[18..20].copy_from_slice(&self.e_machine.to_le_bytes());
        out[20..24].copy_from_slice(&self.e_version.to_le_bytes());
        out[24..32].copy_from_slice(&self.e_entry.to_le_bytes());
        out[32..40].copy_from_slice(&self.e_phoff.to_le_bytes());
        out[40..48].copy_from_slice(&self.e_shoff.to_le_bytes());
        out[48..52].copy_from_slice(&self.e_flags.to_le_bytes());
        out[52..54].copy_from_slice(&self.e_ehsize.to_le_bytes());
        out[54..56].copy_from_slice(&self.e_phentsize.to_le_bytes());
        out[56..58].copy_from_slice(&self.e_phnum.to_le_bytes());
        out[58..60].copy_from_slice(&self.e_shentsize.to_le_bytes());
        out[60..62].copy_from_slice(&self.e_shnum.to_le_bytes());
        out[62..64].copy_from_slice(&self.e_shstrndx.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8; EHDR_SIZE]) -> Self {
        let mut e_ident = [0u8; EI_NIDENT];
        e_ident.copy_from_slice(&buf[0..16]);
        Self {
            e_ident,
            e_type: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
            e_machine: u16::from_le_bytes(buf[18..20].try_into().unwrap()),
            e_version: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            e_entry: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            e_phoff: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            e_shoff: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            e_flags: u32::from_le_bytes(buf[48..52].try_into().unwrap()),
            e_ehsize: u16::from_le_bytes(buf[52..54].try_into().unwrap()),
            e_phentsize: u16::from_le_bytes(buf[54..56].try_into().unwrap()),
            e_phnum: u16::from_le_bytes(buf[56..58].try_into().unwrap()),
            e_shentsize: u16::from_le_bytes(buf[58..60].try_into().unwrap()),
            e_shnum: u16::from_le_bytes(buf[60..62].try_into().unwrap()),
            e_shstrndx: u16::from_le_bytes(buf[62..64].try_into().unwrap()),
        }
    }
}

/// `Elf64_Phdr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl Elf64Phdr {
    pub fn to_bytes(&self) -> [u8; PHDR_SIZE] {
        let mut out = [0u8; PHDR_SIZE];
        out[0..4].copy_from_slice(&self.p_type.to_le_bytes());
        out[4..8].copy_from_slice(&self.p_flags.to_le_bytes());
        out[8..16].copy_from_slice(&self.p_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.p_vaddr.to_le_bytes());
        out[24..32].copy_from_slice(&self.p_paddr.to_le_bytes());
        out[32..40].copy_from_slice(&self.p_filesz.to_le_bytes());
        out[40..48].copy_from_slice(&self.p_memsz.to_le_bytes());
        out[48..56].copy_from_slice(&self.p_align.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8; PHDR_SIZE]) -> Self {
        Self {
            p_type: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            p_flags: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            p_offset: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            p_vaddr: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            p_paddr: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            p_filesz: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            p_memsz: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            p_align: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
        }
    }

    /// Bytes needed to round `offset` up to this segment's `p_align`, matching
    /// `TICOS_ALIGN_UP(offset, p_align) - offset`. Alignment of 0 or 1 means "no
    /// alignment constraint".
    pub fn padding_before(&self, offset: u64) -> u64 {
        if self.p_align <= 1 {
            return 0;
        }
        let rem = offset % self.p_align;
        if rem == 0 {
            0
        } else {
            self.p_align - rem
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ehdr_roundtrips_through_bytes() {
        let ehdr = Elf64Ehdr::new_core(0xb7, 3);
        let bytes = ehdr.to_bytes();
        assert_eq!(Elf64Ehdr::from_bytes(&bytes), ehdr);
        assert!(ehdr.is_valid_core_elf());
    }

    #[test]
    fn phdr_roundtrips_through_bytes() {
        let phdr = Elf64Phdr {
            p_type: PT_LOAD,
            p_flags: 6,
            p_offset: 4096,
            p_vaddr: 0x400000,
            p_paddr: 0,
            p_filesz: 8192,
            p_memsz: 8192,
            p_align: 4096,
        };
        assert_eq!(Elf64Phdr::from_bytes(&phdr.to_bytes()), phdr);
    }

    #[test]
    fn padding_before_respects_alignment() {
        let phdr = Elf64Phdr {
            p_type: PT_LOAD,
            p_flags: 6,
            p_offset: 0,
            p_vaddr: 0,
            p_paddr: 0,
            p_filesz: 0,
            p_memsz: 0,
            p_align: 4096,
        };
        assert_eq!(phdr.padding_before(100), 3996);
        assert_eq!(phdr.padding_before(4096), 0);

        let unaligned = Elf64Phdr { p_align: 0, ..phdr };
        assert_eq!(unaligned.padding_before(100), 0);
    }
}
