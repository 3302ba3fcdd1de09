// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Two-stream sparse overlay (§4.6): writes go to an append-only `data`
//! stream, an append-only `offsets` log records where each write (or
//! zero-trimmed hole) landed, and an in-memory [`index::IntervalIndex`]
//! answers reads without scanning the log. Ports
//! `original_source/siaform/sparse/sparse.go`; `chain` holds the
//! single-stream variant from `sparse/chain.go`.

pub mod chain;
pub mod delta;
pub mod index;

use std::fs::File;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use delta::LogEntry;
use index::{Interval, IntervalIndex};
use positioned_io::{ReadAt, WriteAt};

use crate::error::{Result, SectorVaultError};

/// The minimal append/random-read capability the two streams need.
/// `crate::chunk_appender::ChunkAppender` is the production backing (its
/// reads and appends go over the network); tests use a plain growable
/// buffer.
#[async_trait]
pub trait ByteStream: Send + Sync {
    async fn append(&mut self, data: &[u8]) -> Result<u64>;
    async fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
    fn len(&self) -> u64;
}

#[derive(Default)]
pub struct VecStream(Vec<u8>);

#[async_trait]
impl ByteStream for VecStream {
    async fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.0.len() as u64;
        self.0.extend_from_slice(data);
        Ok(offset)
    }

    async fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start + length as usize;
        self.0
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or_else(|| SectorVaultError::OutOfRange(format!("read_at {start}..{end} past end of stream")))
    }

    fn len(&self) -> u64 {
        self.0.len() as u64
    }
}

/// Real on-disk backing for a stream, standing in for the original's
/// `os.File`-backed `Appender` (`original_source/siaform/sparse/sparse.go`'s
/// `Appender` is just `io.ReaderAt` plus `Append`). Positioned reads and
/// writes run on the blocking pool since `positioned_io::{ReadAt, WriteAt}`
/// are synchronous.
pub struct FileStream {
    file: Arc<std::sync::Mutex<File>>,
    len: AtomicU64,
}

impl FileStream {
    pub fn open(file: File) -> Result<Self> {
        let len = file
            .metadata()
            .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("stat stream file: {e}")))?
            .len();
        Ok(FileStream {
            file: Arc::new(std::sync::Mutex::new(file)),
            len: AtomicU64::new(len),
        })
    }
}

#[async_trait]
impl ByteStream for FileStream {
    async fn append(&mut self, data: &[u8]) -> Result<u64> {
        let file = self.file.clone();
        let offset = self.len.load(Ordering::Acquire);
        let written = data.len() as u64;
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || file.lock().unwrap().write_all_at(offset, &data))
            .await
            .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("join append task: {e}")))?
            .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("write_at: {e}")))?;
        self.len.store(offset + written, Ordering::Release);
        Ok(offset)
    }

    async fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if offset + length > self.len.load(Ordering::Acquire) {
            return Err(SectorVaultError::OutOfRange(format!("read_at {offset}..{} past end of stream", offset + length)));
        }
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; length as usize];
            file.lock().unwrap().read_exact_at(offset, &mut buf)?;
            Ok::<_, std::io::Error>(buf)
        })
        .await
        .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("join read task: {e}")))?
        .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("read_at: {e}")))
    }

    fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }
}

pub struct SparseFile<D, O> {
    data: D,
    offsets: O,
    log: Vec<LogEntry>,
    index: IntervalIndex,
    broken: AtomicBool,
}

impl<D: ByteStream, O: ByteStream> SparseFile<D, O> {
    pub fn new(data: D, offsets: O) -> Self {
        SparseFile {
            data,
            offsets,
            log: Vec::new(),
            index: IntervalIndex::new(),
            broken: AtomicBool::new(false),
        }
    }

    /// Rebuilds a `SparseFile` purely from its two streams, replaying
    /// the offsets log to reconstruct the in-memory index. This is the
    /// "reopen" path: no state survives a process restart except what's
    /// in `data` and `offsets`.
    pub async fn reopen(data: D, offsets: O) -> Result<Self> {
        let raw = offsets.read_at(0, offsets.len()).await?;
        let log = delta::decode_log(&raw);
        let mut index = IntervalIndex::new();
        let mut expected_data_len = 0u64;
        for entry in &log {
            match entry {
                LogEntry::Write(interval) => {
                    index.insert(*interval);
                    expected_data_len = interval.physical_offset + interval.length;
                }
                LogEntry::Hole { virtual_offset, length } => index.remove_range(*virtual_offset, *length),
            }
        }
        if data.len() != expected_data_len {
            return Err(SectorVaultError::Corrupted("data size doesn't match records offsets".to_string()));
        }
        Ok(SparseFile {
            data,
            offsets,
            log,
            index,
            broken: AtomicBool::new(false),
        })
    }

    fn check_not_broken(&self) -> Result<()> {
        if self.broken.load(Ordering::Acquire) {
            return Err(SectorVaultError::Broken);
        }
        Ok(())
    }

    /// Writes `data` at `virtual_offset`. A write that is entirely zero
    /// bytes is never stored in the data stream — it just punches a
    /// hole, which later reads fill back in with zeros, exactly as if
    /// the bytes had been written and happened to be zero.
    pub async fn write(&mut self, virtual_offset: u64, data: &[u8]) -> Result<()> {
        self.check_not_broken()?;
        if data.is_empty() {
            return Ok(());
        }
        self.index.remove_range(virtual_offset, data.len() as u64);
        if data.iter().all(|&b| b == 0) {
            let entry = LogEntry::Hole { virtual_offset, length: data.len() as u64 };
            self.append_log(&entry).await?;
            self.log.push(entry);
            return Ok(());
        }
        let physical_offset = self.append_data(data).await?;
        let interval = Interval {
            virtual_offset,
            physical_offset,
            length: data.len() as u64,
        };
        self.index.insert(interval);
        let entry = LogEntry::Write(interval);
        self.append_log(&entry).await?;
        self.log.push(entry);
        Ok(())
    }

    /// Any I/O failure on either stream latches `broken`: a write that
    /// landed in one stream but not the other would otherwise leave the
    /// index unrecoverable on reopen, so the file must never be written
    /// to again.
    async fn append_data(&mut self, data: &[u8]) -> Result<u64> {
        self.data.append(data).await.inspect_err(|_| self.broken.store(true, Ordering::Release))
    }

    async fn append_log(&mut self, entry: &LogEntry) -> Result<()> {
        let bytes = delta::encode_log(std::slice::from_ref(entry));
        self.offsets
            .append(&bytes)
            .await
            .inspect_err(|_| self.broken.store(true, Ordering::Release))?;
        Ok(())
    }

    /// Reads `[offset, offset+length)`, filling any uncovered (never
    /// written, or zero-trimmed) ranges with zero bytes. Reads of
    /// already-recorded intervals keep working even after `broken`
    /// latches: only further writes are refused.
    pub async fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut out = vec![0u8; length as usize];
        for interval in self.index.query(offset, length) {
            let chunk = self.data.read_at(interval.physical_offset, interval.length).await?;
            let dst_start = (interval.virtual_offset - offset) as usize;
            out[dst_start..dst_start + chunk.len()].copy_from_slice(&chunk);
        }
        Ok(out)
    }

    pub fn len(&self) -> u64 {
        self.index.highest_virtual_end()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands the two backing streams back to the caller, e.g. to close
    /// them or to `reopen` a fresh `SparseFile` from the same state.
    pub fn into_streams(self) -> (D, O) {
        (self.data, self.offsets)
    }
}

#[cfg(test)]
mod tests;
