// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-disk snapshot format for the sector manager (§6): a gzip-wrapped
//! cbor4ii encoding of sectors, sets and the pending queue. Mirrors
//! `original_source/siaform/manager/manager.go`'s `DumpDb`/`Load`, minus
//! the protobuf framing (no codegen toolchain available here — see
//! SPEC_FULL.md §6).

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SectorVaultError};
use crate::gzip::{gunzip, gzip};

use super::state::{ManagerState, RedundancySet, SectorId, SectorRecord};

#[derive(Serialize, Deserialize)]
struct SectorSnapshot {
    id: SectorId,
    is_data: bool,
    contract: Vec<u8>,
    sector_root: Vec<u8>,
    payload: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct SetSnapshot {
    data_ids: Vec<SectorId>,
    parity_ids: Vec<SectorId>,
}

#[derive(Serialize, Deserialize)]
struct ManagerSnapshot {
    ndata: u32,
    nparity: u32,
    sector_size: u32,
    next_id: SectorId,
    sectors: Vec<SectorSnapshot>,
    sets: Vec<SetSnapshot>,
    pending: Vec<SectorId>,
}

fn hex_decode(s: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| SectorVaultError::Corrupted(format!("{what}: {e}")))
}

pub fn dump(state: &ManagerState, ndata: usize, nparity: usize, sector_size: u32) -> Result<Vec<u8>> {
    let ndata = ndata as u32;
    let nparity = nparity as u32;
    let mut sectors: Vec<SectorSnapshot> = state
        .sectors
        .iter()
        .map(|(&id, record)| {
            Ok(SectorSnapshot {
                id,
                is_data: record.is_data,
                contract: hex_decode(&record.contract, "contract")?,
                sector_root: hex_decode(&record.sector_root, "sector_root")?,
                payload: record.payload.clone(),
            })
        })
        .collect::<Result<_>>()?;
    sectors.sort_by_key(|s| s.id);

    let sets = state
        .sets
        .iter()
        .map(|set| SetSnapshot {
            data_ids: set.data_ids.clone(),
            parity_ids: set.parity_ids.clone(),
        })
        .collect();

    let snapshot = ManagerSnapshot {
        ndata,
        nparity,
        sector_size,
        next_id: state.next_id_peek(),
        sectors,
        sets,
        pending: state.pending.iter().copied().collect(),
    };

    let encoded = cbor4ii::serde::to_vec(Vec::new(), &snapshot)
        .map_err(|e| SectorVaultError::Serialization(crate::error::SerializationError::Encode(e.to_string())))?;
    gzip(&encoded)
}

pub struct LoadedManager {
    pub state: ManagerState,
    pub ndata: usize,
    pub nparity: usize,
    pub sector_size: u32,
}

pub fn load(zdata: &[u8]) -> Result<LoadedManager> {
    let encoded = gunzip(zdata)?;
    let snapshot: ManagerSnapshot = cbor4ii::serde::from_slice(&encoded)
        .map_err(|e| SectorVaultError::Serialization(crate::error::SerializationError::Decode(e.to_string())))?;

    let mut sectors = HashMap::with_capacity(snapshot.sectors.len());
    for s in snapshot.sectors {
        sectors.insert(
            s.id,
            SectorRecord {
                payload: s.payload,
                contract: hex::encode(s.contract),
                sector_root: hex::encode(s.sector_root),
                is_data: s.is_data,
            },
        );
    }
    let sets = snapshot
        .sets
        .into_iter()
        .map(|s| RedundancySet {
            data_ids: s.data_ids,
            parity_ids: s.parity_ids,
        })
        .collect();
    let pending: VecDeque<SectorId> = snapshot.pending.into_iter().collect();

    Ok(LoadedManager {
        state: ManagerState::restore(sectors, sets, pending, snapshot.next_id),
        ndata: snapshot.ndata as usize,
        nparity: snapshot.nparity as usize,
        sector_size: snapshot.sector_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_then_load_round_trips_sectors_and_sets() {
        let mut state = ManagerState::new();
        let a = state.allocate(true);
        state.write_sector(a, vec![9u8; 4], 4);
        let set_index = state.form_one_set(1, false).unwrap();
        state.mark_uploaded(a, "01".to_string(), "deadbeef".to_string());
        state.mark_end_upload(set_index);

        let dumped = dump(&state, 1, 1, 4).unwrap();
        let loaded = load(&dumped).unwrap();
        assert_eq!(loaded.ndata, 1);
        assert_eq!(loaded.nparity, 1);
        assert_eq!(loaded.sector_size, 4);
        let record = &loaded.state.sectors[&a];
        assert_eq!(record.contract, "01");
        assert_eq!(record.sector_root, "deadbeef");
        assert!(record.payload.is_none());
        assert_eq!(loaded.state.sets.len(), 1);
        assert_eq!(loaded.state.next_id_peek(), state.next_id_peek());
    }

    #[test]
    fn unwritten_sectors_keep_their_payload() {
        let mut state = ManagerState::new();
        let a = state.allocate(true);
        state.write_sector(a, vec![1, 2, 3, 4], 4);
        let dumped = dump(&state, 1, 1, 4).unwrap();
        let loaded = load(&dumped).unwrap();
        assert_eq!(loaded.state.sectors[&a].payload, Some(vec![1, 2, 3, 4]));
    }
}
