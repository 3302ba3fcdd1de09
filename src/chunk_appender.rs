// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Append-only file view over a sequence of fixed backend chunks (§4.7),
//! ported from `original_source/chunkappender/chunkappender.go`. Keeps a
//! cumulative-size table (`ends`) to binary-search which chunks a read
//! range touches, fetches every touched chunk concurrently through a
//! [`crate::lru::WeightLru`], and restricts writes to pure appends.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Result, SectorVaultError};
use crate::lru::WeightLru;
use crate::sparse::ByteStream;

/// The backend a `ChunkAppender` is layered over: a sequence of
/// independently addressable chunks, numbered `0..len`.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn sizes(&self) -> Result<Vec<u64>>;
    async fn get(&self, index: usize) -> Result<Vec<u8>>;
    async fn put(&self, index: usize, data: &[u8]) -> Result<()>;
}

pub struct ChunkAppender<C> {
    backend: C,
    ends: RwLock<Vec<u64>>,
    write_lock: AsyncMutex<()>,
    cache: AsyncMutex<WeightLru<usize, Arc<Vec<u8>>>>,
}

impl<C: ChunkStore> ChunkAppender<C> {
    pub async fn new(backend: C, max_items: usize, max_weight_bytes: u64) -> Result<Self> {
        let sizes = backend.sizes().await?;
        let mut ends = Vec::with_capacity(sizes.len());
        let mut sum = 0u64;
        for size in sizes {
            sum += size;
            ends.push(sum);
        }
        Ok(ChunkAppender {
            backend,
            ends: RwLock::new(ends),
            write_lock: AsyncMutex::new(()),
            cache: AsyncMutex::new(WeightLru::new(max_items, max_weight_bytes)),
        })
    }

    /// Maps a byte range `[c1, c2)` to the half-open chunk index range
    /// that covers it, mirroring the original's `sort.Search` pair.
    fn range_to_chunks(&self, c1: u64, c2: u64) -> (usize, usize) {
        let ends = self.ends.read();
        let b1 = ends.partition_point(|&end| end <= c1);
        let offset_in_tail = ends[b1..]
            .iter()
            .position(|&end| end >= c2)
            .expect("c2 <= total_len, checked by the caller");
        (b1, b1 + 1 + offset_in_tail)
    }

    /// Byte range `[start, end)` a given chunk index spans.
    fn chunk_bounds(&self, index: usize) -> (u64, u64) {
        let ends = self.ends.read();
        let start = if index == 0 { 0 } else { ends[index - 1] };
        (start, ends[index])
    }

    fn total_len(&self) -> u64 {
        self.ends.read().last().copied().unwrap_or(0)
    }

    fn chunk_count(&self) -> usize {
        self.ends.read().len()
    }

    async fn read_chunk(&self, index: usize) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().await.get(&index) {
            return Ok(cached.clone());
        }
        let data = Arc::new(self.backend.get(index).await?);
        let weight = data.len() as u64;
        if let Err(err) = self.cache.lock().await.add(index, data.clone(), weight) {
            tracing::debug!(chunk = index, %err, "chunk too heavy to cache, serving uncached");
        }
        Ok(data)
    }

    /// Reads `length` bytes starting at `offset`. Touched chunks are
    /// fetched concurrently; each contributes only the slice of itself
    /// that overlaps the requested range.
    pub async fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let end = offset + length;
        if self.chunk_count() == 0 || end > self.total_len() {
            return Err(SectorVaultError::OutOfRange(format!(
                "read_at {offset}..{end} past end of file (size {})",
                self.total_len()
            )));
        }
        let (b1, b2) = self.range_to_chunks(offset, end);
        let chunks = try_join_all((b1..b2).map(|index| self.read_chunk(index))).await?;

        let mut out = vec![0u8; length as usize];
        for (index, data) in (b1..b2).zip(chunks) {
            let (chunk_start, chunk_end) = self.chunk_bounds(index);
            let slice_start = offset.saturating_sub(chunk_start) as usize;
            let slice_end = data.len() - chunk_end.saturating_sub(end) as usize;
            let dst_start = (chunk_start.max(offset) - offset) as usize;
            out[dst_start..dst_start + (slice_end - slice_start)].copy_from_slice(&data[slice_start..slice_end]);
        }
        Ok(out)
    }

    /// Appends `data` at the current end of file. `off` must equal the
    /// current size; any other value is a non-append write and fails.
    pub async fn write_at(&self, data: &[u8], off: u64) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;
        let total = self.total_len();
        if off != total {
            return Err(SectorVaultError::OutOfRange(format!(
                "attempt to perform non-append write at {off}. File size is {total}."
            )));
        }
        let new_index = self.chunk_count();
        self.backend.put(new_index, data).await?;
        self.ends.write().push(total + data.len() as u64);
        Ok(data.len())
    }

    /// Grows the file to `size` by appending zero bytes. Shrinking is
    /// not supported.
    pub async fn truncate(&self, size: u64) -> Result<()> {
        let total = self.total_len();
        if size < total {
            return Err(SectorVaultError::OutOfRange(format!(
                "can't shrink chunk appender from {total} to {size}"
            )));
        }
        if size == total {
            return Ok(());
        }
        self.write_at(&vec![0u8; (size - total) as usize], total).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: ChunkStore> ByteStream for ChunkAppender<C> {
    async fn append(&mut self, data: &[u8]) -> Result<u64> {
        let start = self.total_len();
        self.write_at(data, start).await?;
        Ok(start)
    }

    async fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        ChunkAppender::read_at(self, offset, length).await
    }

    fn len(&self) -> u64 {
        self.total_len()
    }
}

#[cfg(test)]
mod tests;
