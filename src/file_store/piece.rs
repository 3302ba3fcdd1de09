// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A `FilePiece` is one contiguous run of a named file's bytes living at
//! a fixed offset inside one sector (§4.4). Generalizes
//! `original_source/siaform/files/files.go`'s flat offset list into a
//! structure that also carries an optional integrity checksum for
//! pieces written as part of a coalesced (small-write) sector, since
//! those share a sector with unrelated files and deserve their own
//! check independent of the sector's own at-rest encryption.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sector_manager::state::SectorId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilePiece {
    pub sector_id: SectorId,
    pub offset: u32,
    pub length: u32,
    /// SHA-256 of the piece's plaintext bytes. Present for pieces that
    /// share a sector with other files' pieces (coalesced writes),
    /// where a corrupted neighbor wouldn't otherwise be detectable at
    /// this layer.
    pub checksum: Option<[u8; 32]>,
}

impl FilePiece {
    pub fn whole_sector(sector_id: SectorId, length: u32) -> Self {
        FilePiece {
            sector_id,
            offset: 0,
            length,
            checksum: None,
        }
    }

    pub fn coalesced(sector_id: SectorId, offset: u32, data: &[u8]) -> Self {
        FilePiece {
            sector_id,
            offset,
            length: data.len() as u32,
            checksum: Some(Sha256::digest(data).into()),
        }
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        match &self.checksum {
            Some(expected) => Sha256::digest(data).as_slice() == expected,
            None => true,
        }
    }
}
