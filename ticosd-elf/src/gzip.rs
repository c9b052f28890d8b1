// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A gzip-compressing [`ElfWriteIo`] decorator. Grounded on `core_elf_writer.c`'s
//! `sTicosCoreElfWriteGzipIO`, which wraps an inner IO with zlib's deflate in gzip
//! mode (`window_bits + 16`); here `flate2::write::GzEncoder` plays the same role.

use crate::writer::ElfWriteIo;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io;

/// Adapts an `&mut dyn ElfWriteIo` so `flate2`'s `Write`-based encoder can target
/// it directly.
struct IoShim<'a>(&'a mut dyn ElfWriteIo);

impl io::Write for IoShim<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compresses everything written to it before handing the bytes to `inner`.
/// `sync()` finalizes the gzip stream (the deflate `Z_FINISH` loop in the original)
/// and then syncs `inner`; writing after a sync panics, matching the original's
/// "finalize is the last thing that happens to a writer" lifecycle.
pub struct GzipWriteIo<'a> {
    encoder: Option<GzEncoder<IoShim<'a>>>,
}

impl<'a> GzipWriteIo<'a> {
    pub fn new(inner: &'a mut dyn ElfWriteIo) -> Self {
        Self {
            encoder: Some(GzEncoder::new(IoShim(inner), Compression::default())),
        }
    }
}

impl ElfWriteIo for GzipWriteIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        use io::Write;
        self.encoder
            .as_mut()
            .expect("GzipWriteIo used after sync()")
            .write_all(buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        let encoder = self.encoder.take().expect("GzipWriteIo synced twice");
        let mut shim = encoder.finish()?;
        shim.0.sync()
    }
}

impl Drop for GzipWriteIo<'_> {
    /// `sync()` is the only thing that finalizes the deflate stream and flushes it
    /// to `inner`; a `GzipWriteIo` dropped without one still has buffered,
    /// unflushed input sitting in the encoder. Spec.md §4.3: "the adapter reports
    /// a failure if sync was not called before destruction."
    fn drop(&mut self) {
        if self.encoder.is_some() {
            tracing::error!("GzipWriteIo dropped without calling sync(); compressed output is incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::FileWriteIo;
    use std::io::Read;

    #[test]
    fn compressed_output_inflates_back_to_original() {
        let mut sink = FileWriteIo(Vec::new());
        {
            let mut gz = GzipWriteIo::new(&mut sink);
            gz.write(b"hello coredump world, ").unwrap();
            gz.write(b"hello coredump world, ").unwrap();
            gz.sync().unwrap();
        }

        let mut decoder = flate2::read::GzDecoder::new(&sink.0[..]);
        let mut roundtripped = String::new();
        decoder.read_to_string(&mut roundtripped).unwrap();
        assert_eq!(roundtripped, "hello coredump world, hello coredump world, ");
    }

    #[test]
    fn dropping_without_sync_does_not_panic() {
        let mut sink = FileWriteIo(Vec::new());
        let mut gz = GzipWriteIo::new(&mut sink);
        gz.write(b"buffered but never flushed").unwrap();
        drop(gz); // logs an error via tracing, per spec.md §4.3; must not panic
    }
}
