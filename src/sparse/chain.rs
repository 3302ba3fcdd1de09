// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Single-stream sparse variant (§4.9), ported from
//! `original_source/siaform/sparse/chain.go`. Unlike [`super::SparseFile`]
//! (which supports arbitrary overwrites via an in-memory interval
//! index), this variant assumes virtual offsets only ever increase
//! across appends — the common sequential-write case — and instead of
//! keeping any in-memory index at all, embeds a backward skip-chain in
//! every record so a fresh reader can binary-search backward from the
//! tail to the record covering a given offset in `O(log n)` record
//! reads, even right after a process restart.

use integer_encoding::VarInt;

use super::ByteStream;
use crate::error::{Result, SectorVaultError};

// Every method below that touches the backing stream is async: the
// production `ByteStream` (`crate::chunk_appender::ChunkAppender`) reads
// and appends over the network.

struct RecordMeta {
    back_pointers: Vec<u64>,
    virtual_offset: u64,
    length: u64,
    header_len: usize,
}

impl RecordMeta {
    fn covers(&self, target: u64) -> bool {
        self.virtual_offset <= target && target < self.virtual_offset + self.length
    }
}

fn try_parse(buf: &[u8]) -> Option<RecordMeta> {
    let mut cursor = 0usize;
    let (count, n) = u64::decode_var(buf.get(cursor..)?)?;
    cursor += n;
    let mut back_pointers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (ptr, n) = u64::decode_var(buf.get(cursor..)?)?;
        cursor += n;
        back_pointers.push(ptr);
    }
    let (virtual_offset, n) = u64::decode_var(buf.get(cursor..)?)?;
    cursor += n;
    let (length, n) = u64::decode_var(buf.get(cursor..)?)?;
    cursor += n;
    Some(RecordMeta {
        back_pointers,
        virtual_offset,
        length,
        header_len: cursor,
    })
}

/// How many of the lowest levels of the skip tower to carry forward:
/// trailing zero bits of the 1-based record number, i.e. the tower
/// updates at level `k` once every `2^k` records — the standard
/// logarithmic skip-list construction.
fn levels_for(one_based_index: u64) -> usize {
    (one_based_index.trailing_zeros() as usize) + 1
}

pub struct ChainWriter<S> {
    stream: S,
    next_index: u64,
    tower: Vec<Option<u64>>,
}

const MAX_LEVELS: usize = 48;

impl<S: ByteStream> ChainWriter<S> {
    pub fn new(stream: S) -> Self {
        ChainWriter {
            stream,
            next_index: 0,
            tower: vec![None; MAX_LEVELS],
        }
    }

    pub fn reopen(stream: S, next_index: u64, tower: Vec<Option<u64>>) -> Self {
        ChainWriter { stream, next_index, tower }
    }

    /// Appends a record for `[virtual_offset, virtual_offset + data.len())`
    /// and returns its stream offset (needed by the caller to seek later).
    pub async fn append(&mut self, virtual_offset: u64, data: &[u8]) -> Result<u64> {
        let levels = levels_for(self.next_index + 1).min(MAX_LEVELS);
        let back_pointers: Vec<u64> = self.tower[..levels].iter().filter_map(|o| *o).collect();

        let mut header = Vec::new();
        push_varint(&mut header, back_pointers.len() as u64);
        for ptr in &back_pointers {
            push_varint(&mut header, *ptr);
        }
        push_varint(&mut header, virtual_offset);
        push_varint(&mut header, data.len() as u64);

        let record_offset = self.stream.len();
        let mut record = header;
        record.extend_from_slice(data);
        self.stream.append(&record).await?;

        for slot in self.tower[..levels].iter_mut() {
            *slot = Some(record_offset);
        }
        self.next_index += 1;
        Ok(record_offset)
    }

    pub fn into_reader(self) -> ChainReader<S> {
        ChainReader { stream: self.stream }
    }

    fn into_parts(self) -> (S, u64, Vec<Option<u64>>) {
        (self.stream, self.next_index, self.tower)
    }
}

fn push_varint(buf: &mut Vec<u8>, value: u64) {
    let mut tmp = [0u8; 10];
    let written = value.encode_var(&mut tmp);
    buf.extend_from_slice(&tmp[..written]);
}

pub struct ChainReader<S> {
    stream: S,
}

const INITIAL_PEEK: u64 = 256;
const MAX_PEEK: u64 = 1 << 20;

impl<S: ByteStream> ChainReader<S> {
    pub fn new(stream: S) -> Self {
        ChainReader { stream }
    }

    async fn read_meta(&self, offset: u64) -> Result<RecordMeta> {
        let mut peek = INITIAL_PEEK.min(self.stream.len().saturating_sub(offset).max(1));
        loop {
            let buf = self.stream.read_at(offset, peek).await?;
            if let Some(meta) = try_parse(&buf) {
                return Ok(meta);
            }
            if peek >= MAX_PEEK || offset + peek >= self.stream.len() {
                return Err(SectorVaultError::Corrupted(format!("unparsable chain record at {offset}")));
            }
            peek = (peek * 2).min(MAX_PEEK);
        }
    }

    async fn read_record_data(&self, offset: u64, meta: &RecordMeta) -> Result<Vec<u8>> {
        self.stream.read_at(offset + meta.header_len as u64, meta.length).await
    }

    /// Walks backward from `tail_offset` (the stream offset of the most
    /// recently appended record) to find the record covering `target`,
    /// using the fewest backward hops the skip-chain allows.
    pub async fn read_covering(&self, tail_offset: u64, target: u64) -> Result<Option<Vec<u8>>> {
        let mut current_offset = tail_offset;
        let mut current = self.read_meta(current_offset).await?;
        loop {
            if current.covers(target) {
                return Ok(Some(self.read_record_data(current_offset, &current).await?));
            }
            if current.virtual_offset <= target {
                return Ok(None);
            }
            let mut advanced = false;
            for &candidate_offset in current.back_pointers.iter().rev() {
                let candidate = self.read_meta(candidate_offset).await?;
                if candidate.virtual_offset > target || candidate.covers(target) {
                    current_offset = candidate_offset;
                    current = candidate;
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                match current.back_pointers.first() {
                    Some(&offset) => {
                        current_offset = offset;
                        current = self.read_meta(offset).await?;
                    }
                    None => return Ok(None),
                }
            }
        }
    }
}

/// Composes [`ChainWriter`] and [`ChainReader`] over a single cloned
/// handle to one backend stream — the single-stream counterpart to
/// [`super::SparseFile`]'s two-stream overlay. `S` must be cheaply
/// cloneable (e.g. an `Arc`-backed handle) since both halves need their
/// own reference to the stream.
pub struct SingleStreamSparse<S> {
    stream: S,
    next_index: u64,
    tower: Vec<Option<u64>>,
    tail_offset: Option<u64>,
}

impl<S: ByteStream + Clone> SingleStreamSparse<S> {
    pub fn new(stream: S) -> Self {
        SingleStreamSparse {
            stream,
            next_index: 0,
            tower: vec![None; MAX_LEVELS],
            tail_offset: None,
        }
    }

    /// Appends a record and advances the tail. Virtual offsets must be
    /// strictly increasing across calls.
    pub async fn write(&mut self, virtual_offset: u64, data: &[u8]) -> Result<()> {
        let mut writer = ChainWriter::reopen(self.stream.clone(), self.next_index, std::mem::take(&mut self.tower));
        let offset = writer.append(virtual_offset, data).await?;
        let (_, next_index, tower) = writer.into_parts();
        self.next_index = next_index;
        self.tower = tower;
        self.tail_offset = Some(offset);
        Ok(())
    }

    /// Finds the record covering `target`, or `None` if nothing written
    /// so far reaches that far back.
    pub async fn read(&self, target: u64) -> Result<Option<Vec<u8>>> {
        match self.tail_offset {
            Some(tail) => ChainReader::new(self.stream.clone()).read_covering(tail, target).await,
            None => Ok(None),
        }
    }
}
