// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Named files as ordered lists of sector pieces (§4.4). Generalizes
//! `original_source/siaform/files/files.go`'s directory-of-files model
//! onto redundancy-set-backed sectors: small writes are coalesced into
//! one shared in-progress sector so short files don't each waste a
//! whole sector; writes at or above `min_size_for_sector` get sectors
//! of their own.

pub mod persist;
pub mod piece;

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;

use crate::backend::SectorBackend;
use crate::error::{Result, SectorVaultError};
use crate::sector_manager::state::SectorId;
use crate::sector_manager::SectorManager;

use piece::FilePiece;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    pub pieces: Vec<FilePiece>,
    pub size: u64,
}

struct InProgress {
    sector_id: SectorId,
    buffer: Vec<u8>,
}

pub struct FileStore<B> {
    manager: Arc<SectorManager<B>>,
    files: Mutex<HashMap<String, FileRecord>>,
    in_progress: Mutex<Option<InProgress>>,
}

impl<B: SectorBackend + 'static> FileStore<B> {
    pub fn new(manager: Arc<SectorManager<B>>) -> Self {
        FileStore {
            manager,
            files: Mutex::new(HashMap::new()),
            in_progress: Mutex::new(None),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    pub fn create(&self, name: &str) -> Result<()> {
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return Err(SectorVaultError::Other(anyhow::anyhow!("file {name} already exists")));
        }
        files.insert(name.to_string(), FileRecord::default());
        Ok(())
    }

    pub fn open_or_create(&self, name: &str) -> Result<()> {
        self.files.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let mut files = self.files.lock();
        if !files.contains_key(old) {
            return Err(SectorVaultError::NotFound(old.to_string()));
        }
        if files.contains_key(new) {
            return Err(SectorVaultError::Other(anyhow::anyhow!("file {new} already exists")));
        }
        let record = files.remove(old).expect("checked above");
        files.insert(new.to_string(), record);
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SectorVaultError::NotFound(name.to_string()))
    }

    /// Shares `src`'s piece list with a new name `dst`, without copying
    /// any sector bytes.
    pub fn link(&self, src: &str, dst: &str) -> Result<()> {
        let mut files = self.files.lock();
        let record = files
            .get(src)
            .cloned()
            .ok_or_else(|| SectorVaultError::NotFound(src.to_string()))?;
        if files.contains_key(dst) {
            return Err(SectorVaultError::Other(anyhow::anyhow!("file {dst} already exists")));
        }
        files.insert(dst.to_string(), record);
        Ok(())
    }

    /// Appends `data` to `name`, routing large writes to dedicated
    /// sectors and small writes into the shared in-progress sector.
    #[instrument(skip(self, data))]
    pub async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        if !self.files.lock().contains_key(name) {
            return Err(SectorVaultError::NotFound(name.to_string()));
        }
        let sector_size = self.manager.config().sector_size as usize;
        let min_size = self.manager.config().min_size_for_sector as usize;

        let mut new_pieces = Vec::new();
        let mut cursor = 0;
        while cursor < data.len() {
            let remaining = &data[cursor..];
            if remaining.len() >= min_size {
                let take = remaining.len().min(sector_size);
                let mut chunk = remaining[..take].to_vec();
                chunk.resize(sector_size, 0);
                let sector_id = self.manager.add_sector(chunk)?;
                new_pieces.push(FilePiece::whole_sector(sector_id, take as u32));
                cursor += take;
            } else {
                let piece = self.append_to_in_progress(remaining).await?;
                cursor += remaining.len();
                new_pieces.push(piece);
            }
        }

        let mut files = self.files.lock();
        let record = files.get_mut(name).expect("checked above");
        record.size += data.len() as u64;
        record.pieces.extend(new_pieces);
        Ok(())
    }

    async fn append_to_in_progress(&self, data: &[u8]) -> Result<FilePiece> {
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
                    // No room left: flush this sector and start a fresh one.
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

    /// Flushes whatever is sitting in the shared in-progress sector so
    /// every piece handed out so far is actually backed by an uploaded
    /// (or at least written) sector. Safe to call at any time, including
    /// with nothing pending.
    pub fn flush(&self) -> Result<()> {
        let mut in_progress = self.in_progress.lock();
        if let Some(slot) = in_progress.take() {
            self.flush_sector(slot.sector_id, slot.buffer)?;
        }
        Ok(())
    }

    /// Reads a piece's bytes, serving from the still-buffered in-progress
    /// sector when its block hasn't been flushed to the manager yet
    /// (§4.4: a sector that's only been `allocate_sector`'d has never
    /// joined a redundancy set, so `manager.read_sector` would return
    /// `Unavailable` for it).
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

    pub async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let pieces = self
            .files
            .lock()
            .get(name)
            .ok_or_else(|| SectorVaultError::NotFound(name.to_string()))?
            .pieces
            .clone();
        let mut out = Vec::new();
        for piece in &pieces {
            out.extend(self.read_piece(piece).await?);
        }
        Ok(out)
    }

    /// Reads `length` bytes starting at `offset` without materializing
    /// the whole file, touching only the sectors the range overlaps.
    pub async fn get_at(&self, name: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let pieces = self
            .files
            .lock()
            .get(name)
            .ok_or_else(|| SectorVaultError::NotFound(name.to_string()))?
            .pieces
            .clone();

        let mut out = Vec::new();
        let mut file_cursor: u64 = 0;
        let want_end = offset + length;
        for piece in &pieces {
            let piece_start = file_cursor;
            let piece_end = file_cursor + piece.length as u64;
            file_cursor = piece_end;
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
                "{name}: requested {length} bytes at {offset}, file too short"
            )));
        }
        Ok(out)
    }

    /// Flushes the in-progress sector before dumping, so a reload never
    /// references a piece that was only ever sitting in the in-memory
    /// buffer.
    pub fn dump_db(&self) -> Result<Vec<u8>> {
        self.flush()?;
        persist::dump(&self.files.lock())
    }

    pub fn load(manager: Arc<SectorManager<B>>, zdata: &[u8]) -> Result<Self> {
        let files = persist::load(zdata)?;
        Ok(FileStore {
            manager,
            files: Mutex::new(files),
            in_progress: Mutex::new(None),
        })
    }

    /// Opens `name` for `Seek`/`Read`/`Write` access with a cursor, as
    /// `original_source/siaform/files/files.go`'s `Files.Open` does.
    pub fn open(&self, name: &str) -> Result<OpenFile<'_, B>> {
        if !self.files.lock().contains_key(name) {
            return Err(SectorVaultError::NotFound(name.to_string()));
        }
        Ok(OpenFile::new(self, name.to_string()))
    }
}

/// A cursor onto one named file, generalizing `files.go:110-198`'s `File`
/// (which fixes a single sector's worth of bytes at `lastSector` to avoid
/// re-fetching it on every `Read`) to pieces of any size.
pub struct OpenFile<'a, B> {
    store: &'a FileStore<B>,
    name: String,
    offset: u64,
    last_sector: Option<(SectorId, Vec<u8>)>,
}

impl<'a, B: SectorBackend + 'static> OpenFile<'a, B> {
    fn new(store: &'a FileStore<B>, name: String) -> Self {
        OpenFile { store, name, offset: 0, last_sector: None }
    }

    fn size(&self) -> Result<u64> {
        self.store
            .files
            .lock()
            .get(&self.name)
            .map(|record| record.size)
            .ok_or_else(|| SectorVaultError::NotFound(self.name.clone()))
    }

    /// Moves the cursor. `SeekFrom::End` resolves against the file's
    /// current logical size, matching `files.go`'s `io.SeekEnd` branch.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_offset = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.offset as i64 + delta,
            SeekFrom::End(delta) => self.size()? as i64 + delta,
        };
        if new_offset < 0 {
            return Err(SectorVaultError::OutOfRange("negative seek offset".to_string()));
        }
        self.offset = new_offset as u64;
        Ok(self.offset)
    }

    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Reads up to `buf.len()` bytes starting at the cursor into `buf`,
    /// returning how many were actually read (fewer at EOF, zero once the
    /// cursor is at or past the end of the file) and advancing the cursor
    /// by that amount.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pieces = self
            .store
            .files
            .lock()
            .get(&self.name)
            .ok_or_else(|| SectorVaultError::NotFound(self.name.clone()))?
            .pieces
            .clone();

        let want_end = self.offset + buf.len() as u64;
        let mut file_cursor = 0u64;
        let mut written = 0usize;
        for piece in &pieces {
            if written >= buf.len() {
                break;
            }
            let piece_start = file_cursor;
            let piece_end = file_cursor + piece.length as u64;
            file_cursor = piece_end;
            if piece_end <= self.offset || piece_start >= want_end {
                continue;
            }
            let data = self.read_piece_cached(piece).await?;
            let lo = self.offset.saturating_sub(piece_start) as usize;
            let hi = (want_end.min(piece_end) - piece_start) as usize;
            let slice = &data[lo..hi];
            buf[written..written + slice.len()].copy_from_slice(slice);
            written += slice.len();
        }
        self.offset += written as u64;
        Ok(written)
    }

    /// Reads one piece's bytes, serving repeated reads of the same
    /// sector from a single-slot cache instead of re-fetching through
    /// the manager every time (`files.go`'s `lastSector`/`lastSectorID`).
    /// A piece still living in the shared in-progress buffer is never
    /// cached here, since its bytes keep changing until it's flushed.
    async fn read_piece_cached(&mut self, piece: &FilePiece) -> Result<Vec<u8>> {
        let start = piece.offset as usize;
        let end = start + piece.length as usize;

        let buffered = {
            let in_progress = self.store.in_progress.lock();
            in_progress
                .as_ref()
                .filter(|slot| slot.sector_id == piece.sector_id)
                .map(|slot| slot.buffer.get(start..end).map(|s| s.to_vec()))
        };
        if let Some(slice) = buffered {
            let data = slice.ok_or_else(|| SectorVaultError::OutOfRange(format!("piece range {start}..{end} outside buffer")))?;
            return verify_piece(piece, data);
        }

        if let Some((id, sector)) = &self.last_sector {
            if *id == piece.sector_id {
                let data = sector
                    .get(start..end)
                    .ok_or_else(|| SectorVaultError::OutOfRange(format!("piece range {start}..{end} outside cached sector")))?
                    .to_vec();
                return verify_piece(piece, data);
            }
        }

        let sector = self.store.manager.read_sector(piece.sector_id).await?;
        let data = sector
            .get(start..end)
            .ok_or_else(|| SectorVaultError::OutOfRange(format!("piece range {start}..{end} outside sector")))?
            .to_vec();
        let data = verify_piece(piece, data)?;
        self.last_sector = Some((piece.sector_id, sector));
        Ok(data)
    }

    /// Appends `data` at the cursor. Only appends at the current end of
    /// file are supported, the same restriction `files.go`'s `Write`
    /// enforces (`f.File.Size % sectorSize != 0` rejects a write into
    /// the middle of the last, not-yet-full sector from a second
    /// handle); unlike the original, a full sector isn't required here
    /// since `FileStore::put` coalesces short writes itself.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let size = self.size()?;
        if self.offset != size {
            return Err(SectorVaultError::Other(anyhow::anyhow!(
                "write at offset {} must be at end of file (size {size}); only appends are supported",
                self.offset
            )));
        }
        self.store.put(&self.name, data).await?;
        self.offset += data.len() as u64;
        Ok(data.len())
    }
}

fn verify_piece(piece: &FilePiece, data: Vec<u8>) -> Result<Vec<u8>> {
    if !piece.verify(&data) {
        return Err(SectorVaultError::Corrupted(format!("checksum mismatch in sector {}", piece.sector_id)));
    }
    Ok(data)
}

#[cfg(test)]
mod tests;
