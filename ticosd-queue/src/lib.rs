// Copyright 2021-Present Ticos, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A bounded, file-backed FIFO queue of records waiting to be uploaded, durable
//! across a daemon restart or crash. Framing and the cursor-file recovery scheme
//! are this crate's own design (the original `queue.c` did not survive
//! distillation, only its header); everything else ticosd does depends only on the
//! `write` / `read_head` / `complete_read` / `reset` surface described here.
//!
//! On-disk layout:
//! - `queue.bin`: a flat append log of frames, each `[u32 len_le][u8 type_tag][payload]`,
//!   where `len` counts the tag byte plus the payload.
//! - `queue.cursor`: two little-endian `u64`s, `head` and `tail`, byte offsets into
//!   `queue.bin`. `head` is the start of the oldest unconsumed frame; `tail` is
//!   where the next `write` appends. Written after every mutation so a crash
//!   between data and cursor writes loses at most the in-flight operation.
//!
//! When `head` reaches `tail` (queue fully drained) or a `write` would exceed the
//! size budget, the queue compacts: the live byte range `[head, tail)` is copied
//! down to the front of the file and both cursors reset, reclaiming the space
//! consumed by already-delivered records.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("queue file is corrupt: {0}")]
    Corrupt(String),
}

fn io_err(path: &Path, source: std::io::Error) -> QueueError {
    QueueError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What kind of payload a queued record carries. The queue itself never
/// interprets the payload; this tag only tells the upload engine which endpoint
/// and wire shape to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    RebootEvent = 1,
    Attributes = 2,
    CoreUpload = 3,
    CoreUploadGzip = 4,
}

impl RecordType {
    fn from_tag(tag: u8) -> Result<Self, QueueError> {
        match tag {
            1 => Ok(Self::RebootEvent),
            2 => Ok(Self::Attributes),
            3 => Ok(Self::CoreUpload),
            4 => Ok(Self::CoreUploadGzip),
            other => Err(QueueError::Corrupt(format!("unknown record type tag {other}"))),
        }
    }
}

/// One queued record: its kind, plus the raw bytes the corresponding upload path
/// knows how to serialize (a JSON body, a coredump file's contents, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub record_type: RecordType,
    pub payload: Vec<u8>,
}

impl TxRecord {
    fn framed_len(&self) -> u64 {
        // 4-byte length prefix + 1-byte tag + payload
        4 + 1 + self.payload.len() as u64
    }

    fn write_frame(&self, buf: &mut Vec<u8>) {
        let inner_len = 1 + self.payload.len() as u32;
        buf.extend_from_slice(&inner_len.to_le_bytes());
        buf.push(self.record_type as u8);
        buf.extend_from_slice(&self.payload);
    }
}

const CURSOR_FILE_LEN: usize = 16;

/// A persistent, bounded FIFO queue backed by two files under `data_dir`.
pub struct FileQueue {
    data_path: PathBuf,
    cursor_path: PathBuf,
    data_file: File,
    max_size_bytes: u64,
    head: u64,
    tail: u64,
    /// Length of the frame last returned by `read_head`, so `complete_read` knows
    /// how far to advance `head`.
    pending_frame_len: Option<u64>,
}

impl FileQueue {
    pub fn open(data_dir: &Path, max_size_bytes: u64) -> Result<Self, QueueError> {
        let data_path = data_dir.join("queue.bin");
        let cursor_path = data_dir.join("queue.cursor");

        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&data_path)
            .map_err(|e| io_err(&data_path, e))?;

        let (head, tail) = match std::fs::read(&cursor_path) {
            Ok(bytes) if bytes.len() == CURSOR_FILE_LEN => (
                u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
                u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            ),
            Ok(_) | Err(_) => (0, 0),
        };

        let mut queue = Self {
            data_path,
            cursor_path,
            data_file,
            max_size_bytes,
            head,
            tail,
            pending_frame_len: None,
        };
        queue.persist_cursor()?;
        Ok(queue)
    }

    fn persist_cursor(&self) -> Result<(), QueueError> {
        let mut bytes = [0u8; CURSOR_FILE_LEN];
        bytes[0..8].copy_from_slice(&self.head.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.tail.to_le_bytes());
        let tmp_path = self.cursor_path.with_extension("tmp");
        std::fs::write(&tmp_path, bytes).map_err(|e| io_err(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.cursor_path).map_err(|e| io_err(&self.cursor_path, e))?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.head >= self.tail
    }

    pub fn used_bytes(&self) -> u64 {
        self.tail - self.head
    }

    /// Appends `record` to the tail of the queue. Returns `Ok(false)` (not an
    /// error) if the record doesn't fit even after compacting -- callers treat
    /// that as "queue full, drop this record", matching a bounded queue's only
    /// sane behavior under sustained overload.
    pub fn write(&mut self, record: &TxRecord) -> Result<bool, QueueError> {
        let frame_len = record.framed_len();

        if self.tail + frame_len > self.max_size_bytes && self.head > 0 {
            self.compact()?;
        }
        if self.tail + frame_len > self.max_size_bytes {
            tracing::warn!(
                used = self.used_bytes(),
                budget = self.max_size_bytes,
                "transmit queue full, dropping record"
            );
            return Ok(false);
        }

        let mut frame = Vec::with_capacity(frame_len as usize);
        record.write_frame(&mut frame);
        self.data_file
            .write_all_at(&frame, self.tail)
            .map_err(|e| io_err(&self.data_path, e))?;
        self.data_file.sync_data().map_err(|e| io_err(&self.data_path, e))?;
        self.tail += frame_len;
        self.persist_cursor()?;
        Ok(true)
    }

    /// Returns the oldest unconsumed record without removing it. Call
    /// `complete_read` after successfully handling it to advance past it; calling
    /// `read_head` again without completing re-returns the same record.
    pub fn read_head(&mut self) -> Result<Option<TxRecord>, QueueError> {
        if self.is_empty() {
            self.pending_frame_len = None;
            return Ok(None);
        }

        let mut len_buf = [0u8; 4];
        self.data_file
            .read_exact_at(&mut len_buf, self.head)
            .map_err(|e| io_err(&self.data_path, e))?;
        let inner_len = u32::from_le_bytes(len_buf) as u64;
        if inner_len == 0 {
            return Err(QueueError::Corrupt("zero-length frame".into()));
        }

        let mut inner = vec![0u8; inner_len as usize];
        self.data_file
            .read_exact_at(&mut inner, self.head + 4)
            .map_err(|e| io_err(&self.data_path, e))?;
        let record_type = RecordType::from_tag(inner[0])?;
        let payload = inner[1..].to_vec();

        self.pending_frame_len = Some(4 + inner_len);
        Ok(Some(TxRecord { record_type, payload }))
    }

    /// Advances past the record last returned by `read_head`, then compacts if the
    /// queue has fully drained.
    pub fn complete_read(&mut self) -> Result<(), QueueError> {
        let frame_len = self
            .pending_frame_len
            .take()
            .expect("complete_read called without a prior read_head");
        self.head += frame_len;
        self.persist_cursor()?;
        if self.is_empty() && self.head > 0 {
            self.compact()?;
        }
        Ok(())
    }

    /// Discards every queued record and resets the queue to empty. Used when data
    /// collection is disabled (spec.md §6: queue reset on
    /// `disable-data-collection`).
    pub fn reset(&mut self) -> Result<(), QueueError> {
        self.head = 0;
        self.tail = 0;
        self.pending_frame_len = None;
        self.data_file
            .set_len(0)
            .map_err(|e| io_err(&self.data_path, e))?;
        self.persist_cursor()
    }

    /// Shifts the live `[head, tail)` byte range down to offset 0 and truncates the
    /// file, reclaiming space already-delivered records used to occupy.
    fn compact(&mut self) -> Result<(), QueueError> {
        if self.head == 0 {
            return Ok(());
        }
        let live_len = self.tail - self.head;
        if live_len > 0 {
            let mut buf = vec![0u8; live_len as usize];
            self.data_file
                .read_exact_at(&mut buf, self.head)
                .map_err(|e| io_err(&self.data_path, e))?;
            self.data_file
                .write_all_at(&buf, 0)
                .map_err(|e| io_err(&self.data_path, e))?;
        }
        self.data_file
            .set_len(live_len)
            .map_err(|e| io_err(&self.data_path, e))?;
        self.data_file.sync_data().map_err(|e| io_err(&self.data_path, e))?;
        self.head = 0;
        self.tail = live_len;
        self.persist_cursor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(record_type: RecordType, payload: &[u8]) -> TxRecord {
        TxRecord {
            record_type,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn writes_and_reads_back_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = FileQueue::open(dir.path(), 1 << 20).unwrap();

        assert!(queue.write(&record(RecordType::RebootEvent, b"reason=3")).unwrap());
        assert!(queue.write(&record(RecordType::Attributes, b"{\"x\":1}")).unwrap());

        let first = queue.read_head().unwrap().unwrap();
        assert_eq!(first.record_type, RecordType::RebootEvent);
        assert_eq!(first.payload, b"reason=3");
        queue.complete_read().unwrap();

        let second = queue.read_head().unwrap().unwrap();
        assert_eq!(second.record_type, RecordType::Attributes);
        queue.complete_read().unwrap();

        assert!(queue.read_head().unwrap().is_none());
    }

    #[test]
    fn survives_reopen_without_losing_unconsumed_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut queue = FileQueue::open(dir.path(), 1 << 20).unwrap();
            queue.write(&record(RecordType::CoreUpload, b"elfbytes")).unwrap();
        }
        let mut reopened = FileQueue::open(dir.path(), 1 << 20).unwrap();
        let rec = reopened.read_head().unwrap().unwrap();
        assert_eq!(rec.payload, b"elfbytes");
    }

    #[test]
    fn peeking_without_completing_returns_the_same_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = FileQueue::open(dir.path(), 1 << 20).unwrap();
        queue.write(&record(RecordType::Attributes, b"a")).unwrap();

        let first_peek = queue.read_head().unwrap().unwrap();
        let second_peek = queue.read_head().unwrap().unwrap();
        assert_eq!(first_peek, second_peek);
    }

    #[test]
    fn compacts_after_full_drain_and_reclaims_space() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = FileQueue::open(dir.path(), 1 << 20).unwrap();
        for _ in 0..5 {
            queue.write(&record(RecordType::Attributes, b"0123456789")).unwrap();
        }
        for _ in 0..5 {
            queue.read_head().unwrap().unwrap();
            queue.complete_read().unwrap();
        }
        assert_eq!(queue.head, 0);
        assert_eq!(queue.tail, 0);
    }

    #[test]
    fn rejects_writes_once_full_even_after_compaction_attempt() {
        let dir = tempfile::tempdir().unwrap();
        // budget barely fits one small record's frame
        let mut queue = FileQueue::open(dir.path(), 16).unwrap();
        assert!(queue.write(&record(RecordType::Attributes, b"12345678")).unwrap());
        assert!(!queue.write(&record(RecordType::Attributes, b"12345678")).unwrap());
    }

    #[test]
    fn reset_discards_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = FileQueue::open(dir.path(), 1 << 20).unwrap();
        queue.write(&record(RecordType::Attributes, b"a")).unwrap();
        queue.reset().unwrap();
        assert!(queue.read_head().unwrap().is_none());
    }
}
