// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Access to a crashed process's address space via `/proc/<pid>/mem`. Grounded on
//! `core_elf_transformer.c`'s procfs handler: `open(O_RDONLY|O_CLOEXEC)` followed by
//! `pread` at each `PT_LOAD` segment's virtual address.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

/// A source of process memory, addressed by virtual address. Implemented for real
/// crashes by [`ProcFsMem`]; tests use an in-memory fake instead of touching
/// `/proc`.
pub trait ProcMem {
    /// Reads up to `buf.len()` bytes starting at virtual address `vaddr`. Returns
    /// the number of bytes actually read; `Ok(0)` means the address is unreadable
    /// (unmapped, swapped out, or past EOF) and the caller should treat it as a
    /// short read, not necessarily an error.
    fn read_at(&self, vaddr: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// Reads directly from `/proc/<pid>/mem` using `pread`, which (unlike `lseek` +
/// `read`) is safe to call concurrently and doesn't perturb a shared file offset.
pub struct ProcFsMem {
    fd: RawFd,
}

impl ProcFsMem {
    pub fn open(pid: u32) -> io::Result<Self> {
        let path = CString::new(format!("/proc/{pid}/mem")).expect("pid formats without NUL bytes");
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }
}

impl Drop for ProcFsMem {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl ProcMem for ProcFsMem {
    fn read_at(&self, vaddr: u64, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::pread(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                vaddr as libc::off_t,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

#[cfg(test)]
pub mod fake {
    use super::ProcMem;
    use std::collections::BTreeMap;
    use std::io;

    /// A fixed byte buffer addressed as if it were mapped at `base_vaddr`, for
    /// exercising the transformer without a real crashed process.
    pub struct FakeProcMem {
        regions: BTreeMap<u64, Vec<u8>>,
    }

    impl FakeProcMem {
        pub fn new() -> Self {
            Self {
                regions: BTreeMap::new(),
            }
        }

        pub fn map(&mut self, base_vaddr: u64, bytes: Vec<u8>) {
            self.regions.insert(base_vaddr, bytes);
        }
    }

    impl ProcMem for FakeProcMem {
        fn read_at(&self, vaddr: u64, buf: &mut [u8]) -> io::Result<usize> {
            for (&base, region) in &self.regions {
                if vaddr >= base && vaddr < base + region.len() as u64 {
                    let start = (vaddr - base) as usize;
                    let available = &region[start..];
                    let n = available.len().min(buf.len());
                    buf[..n].copy_from_slice(&available[..n]);
                    return Ok(n);
                }
            }
            Ok(0)
        }
    }
}
