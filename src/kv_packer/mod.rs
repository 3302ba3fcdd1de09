// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Append-coalescing key/value store over the sector manager (§4.5).
//! Generalizes `original_source/siaform/zipkv/zipkv.go`'s two-file
//! (`db`/`block`) design: values are appended into sectors the same way
//! `crate::file_store` appends file bytes, while an in-memory table maps
//! keys to their current [`FileRecord`], and every mutation is logged to
//! [`history`] so a past revision can be replayed.

pub mod history;
pub mod persist;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::SectorBackend;
use crate::error::{Result, SectorVaultError};
use crate::file_store::piece::FilePiece;
use crate::file_store::FileRecord;
use crate::sector_manager::state::SectorId;
use crate::sector_manager::SectorManager;

use history::HistoryRecord;

struct InProgress {
    sector_id: SectorId,
    buffer: Vec<u8>,
}

pub struct KvPacker<B> {
    manager: Arc<SectorManager<B>>,
    table: Mutex<HashMap<String, FileRecord>>,
    history: Mutex<Vec<HistoryRecord>>,
    in_progress: Mutex<Option<InProgress>>,
    /// Rotates through `[0, kv_max_db_name]` each time [`Self::dump_db`]
    /// is called, modelling the original's bounded `db` file rotation
    /// without needing its exact on-disk layout.
    next_db_slot: Mutex<u32>,
}

impl<B: SectorBackend + 'static> KvPacker<B> {
    pub fn new(manager: Arc<SectorManager<B>>) -> Self {
        KvPacker {
            manager,
            table: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            in_progress: Mutex::new(None),
            next_db_slot: Mutex::new(0),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.table.lock().contains_key(key)
    }

    pub async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        if value.len() as u64 > self.manager.config().kv_max_value_size as u64 {
            return Err(SectorVaultError::OutOfRange(format!(
                "value for {key} is {} bytes, exceeds kv_max_value_size",
                value.len()
            )));
        }
        let entry = self.write_value(value).await?;
        self.table.lock().insert(key.to_string(), entry.clone());
        self.history.lock().push(HistoryRecord::Put {
            key: key.to_string(),
            entry,
        });
        Ok(())
    }

    async fn write_value(&self, data: &[u8]) -> Result<FileRecord> {
        let sector_size = self.manager.config().sector_size as usize;
        let min_size = self.manager.config().min_size_for_sector as usize;
        let mut pieces = Vec::new();
        let mut cursor = 0;
        while cursor < data.len() {
            let remaining = &data[cursor..];
            if remaining.len() >= min_size {
                let take = remaining.len().min(sector_size);
                let mut chunk = remaining[..take].to_vec();
                chunk.resize(sector_size, 0);
                let sector_id = self.manager.add_sector(chunk)?;
                pieces.push(FilePiece::whole_sector(sector_id, take as u32));
                cursor += take;
            } else {
                pieces.push(self.append_to_in_progress(remaining)?);
                cursor += remaining.len();
            }
        }
        Ok(FileRecord {
            pieces,
            size: data.len() as u64,
        })
    }

    fn append_to_in_progress(&self, data: &[u8]) -> Result<FilePiece> {
        let sector_size = self.manager.config().sector_size as usize;
        loop {
            let mut in_progress = self.in_progress.lock();
            match in_progress.as_mut() {
                Some(slot) if slot.buffer.len() + data.len() <= sector_size => {
                    let offset = slot.buffer.len() as u32;
                    slot.buffer.extend_from_slice(data);
                    return Ok(FilePiece::coalesced(slot.sector_id, offset, data));
                }
                Some(slot) => {
                    let full = std::mem::take(&mut slot.buffer);
                    let sector_id = slot.sector_id;
                    *in_progress = None;
                    drop(in_progress);
                    self.flush_sector(sector_id, full)?;
                    continue;
                }
                None => {
                    let sector_id = self.manager.allocate_sector();
                    *in_progress = Some(InProgress {
                        sector_id,
                        buffer: Vec::with_capacity(sector_size),
                    });
                }
            }
        }
    }

    fn flush_sector(&self, sector_id: SectorId, mut buffer: Vec<u8>) -> Result<()> {
        let sector_size = self.manager.config().sector_size as usize;
        buffer.resize(sector_size, 0);
        self.manager.write_sector(sector_id, buffer)
    }

    /// Flushes the shared in-progress sector. Named `Sync` in §4.5.
    pub fn sync(&self) -> Result<()> {
        let mut in_progress = self.in_progress.lock();
        if let Some(slot) = in_progress.take() {
            self.flush_sector(slot.sector_id, slot.buffer)?;
        }
        Ok(())
    }

    /// Reads a piece's bytes, serving from the still-buffered in-progress
    /// sector when its block hasn't been flushed to the manager yet
    /// (§4.5: "if the backing block is the current `nextBackendFile`,
    /// serve from the in-memory `next`").
    async fn read_piece(&self, piece: &FilePiece) -> Result<Vec<u8>> {
        let start = piece.offset as usize;
        let end = start + piece.length as usize;
        let data = {
            let in_progress = self.in_progress.lock();
            match in_progress.as_ref().filter(|slot| slot.sector_id == piece.sector_id) {
                Some(slot) => slot
                    .buffer
                    .get(start..end)
                    .ok_or_else(|| SectorVaultError::OutOfRange(format!("piece range {start}..{end} outside buffer")))?
                    .to_vec(),
                None => {
                    drop(in_progress);
                    let sector = self.manager.read_sector(piece.sector_id).await?;
                    sector
                        .get(start..end)
                        .ok_or_else(|| SectorVaultError::OutOfRange(format!("piece range {start}..{end} outside sector")))?
                        .to_vec()
                }
            }
        };
        if !piece.verify(&data) {
            return Err(SectorVaultError::Corrupted(format!(
                "checksum mismatch in sector {}",
                piece.sector_id
            )));
        }
        Ok(data)
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let entry = self
            .table
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| SectorVaultError::NotFound(key.to_string()))?;
        let mut out = Vec::new();
        for piece in &entry.pieces {
            out.extend(self.read_piece(piece).await?);
        }
        Ok(out)
    }

    pub async fn get_at(&self, key: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let entry = self
            .table
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| SectorVaultError::NotFound(key.to_string()))?;
        let want_end = offset + length;
        let mut out = Vec::new();
        let mut cursor: u64 = 0;
        for piece in &entry.pieces {
            let piece_start = cursor;
            let piece_end = cursor + piece.length as u64;
            cursor = piece_end;
            if piece_end <= offset || piece_start >= want_end {
                continue;
            }
            let data = self.read_piece(piece).await?;
            let lo = offset.saturating_sub(piece_start) as usize;
            let hi = (want_end.min(piece_end) - piece_start) as usize;
            out.extend_from_slice(&data[lo..hi]);
        }
        if out.len() as u64 != length {
            return Err(SectorVaultError::OutOfRange(format!(
                "{key}: requested {length} bytes at {offset}, value too short"
            )));
        }
        Ok(out)
    }

    pub fn link(&self, src: &str, dst: &str) -> Result<()> {
        let mut table = self.table.lock();
        let entry = table
            .get(src)
            .cloned()
            .ok_or_else(|| SectorVaultError::NotFound(src.to_string()))?;
        table.insert(dst.to_string(), entry.clone());
        drop(table);
        self.history.lock().push(HistoryRecord::Put {
            key: dst.to_string(),
            entry,
        });
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let removed = self.table.lock().remove(key).is_some();
        if !removed {
            return Err(SectorVaultError::NotFound(key.to_string()));
        }
        self.history.lock().push(HistoryRecord::Delete { key: key.to_string() });
        Ok(())
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history.lock().clone()
    }

    pub fn current_revision(&self) -> usize {
        self.history.lock().len().saturating_sub(1)
    }

    /// Reconstructs the key/value index as it was at `rev` without
    /// touching the live table (§4.5's time-travel `Zip`).
    pub fn table_at_revision(&self, rev: usize) -> HashMap<String, FileRecord> {
        history::replay_to_revision(&self.history.lock(), rev)
    }

    /// Flushes the in-progress sector before dumping: the snapshot only
    /// records `table`/`history`, so any key still served out of the
    /// in-memory buffer would be unreadable after a reload.
    pub fn dump_db(&self) -> Result<(u32, Vec<u8>)> {
        self.sync()?;
        let mut slot = self.next_db_slot.lock();
        let used = *slot;
        let max = self.manager.config().kv_max_db_name;
        *slot = (used + 1) % (max + 1);
        let bytes = persist::dump(&self.table.lock(), &self.history.lock())?;
        Ok((used, bytes))
    }

    pub fn load(manager: Arc<SectorManager<B>>, zdata: &[u8]) -> Result<Self> {
        let loaded = persist::load(zdata)?;
        Ok(KvPacker {
            manager,
            table: Mutex::new(loaded.table),
            history: Mutex::new(loaded.history),
            in_progress: Mutex::new(None),
            next_db_slot: Mutex::new(0),
        })
    }
}

#[cfg(test)]
mod tests;
