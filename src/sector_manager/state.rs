// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Pure, synchronous sector/set bookkeeping — no I/O, no locks held
//! across awaits. Everything here runs under the manager's primary lock
//! (§5: "No operation may suspend while holding the manager's main
//! lock"). Generalizes `original_source/siaform/manager/manager.go`'s
//! flat `PrimarySectors`/`EccSectors` maps into proper redundancy sets of
//! `ndata` data sectors plus `nparity` parity sectors (§4.3).

use std::collections::{HashMap, VecDeque};

pub type SectorId = u64;

#[derive(Debug, Clone)]
pub struct SectorRecord {
    pub payload: Option<Vec<u8>>,
    pub contract: String,
    pub sector_root: String,
    pub is_data: bool,
}

impl SectorRecord {
    fn empty(is_data: bool) -> Self {
        SectorRecord {
            payload: None,
            contract: String::new(),
            sector_root: String::new(),
            is_data,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        !self.contract.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RedundancySet {
    pub data_ids: Vec<SectorId>,
    pub parity_ids: Vec<SectorId>,
}

impl RedundancySet {
    pub fn all_ids(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.data_ids.iter().chain(self.parity_ids.iter()).copied()
    }

    pub fn position_of(&self, id: SectorId) -> Option<usize> {
        self.data_ids
            .iter()
            .chain(self.parity_ids.iter())
            .position(|&s| s == id)
    }

    pub fn is_fully_uploaded(&self, sectors: &HashMap<SectorId, SectorRecord>) -> bool {
        self.all_ids().all(|id| {
            sectors
                .get(&id)
                .map(SectorRecord::is_uploaded)
                .unwrap_or(false)
        })
    }
}

/// Everything the manager's primary lock protects (§5): sectors, sets,
/// pending queue and the reverse sector→set index. Latency and
/// last-failure maps are deliberately NOT here — they have independent
/// locks per §5.
pub struct ManagerState {
    pub sectors: HashMap<SectorId, SectorRecord>,
    pub sets: Vec<RedundancySet>,
    pub pending: VecDeque<SectorId>,
    pub sector_to_set: HashMap<SectorId, usize>,
    pub uploading_sets: std::collections::HashSet<usize>,
    next_id: SectorId,
}

impl ManagerState {
    pub fn new() -> Self {
        ManagerState {
            sectors: HashMap::new(),
            sets: Vec::new(),
            pending: VecDeque::new(),
            sector_to_set: HashMap::new(),
            uploading_sets: std::collections::HashSet::new(),
            next_id: 1,
        }
    }

    pub fn allocate(&mut self, is_data: bool) -> SectorId {
        let id = self.next_id;
        self.next_id += 1;
        self.sectors.insert(id, SectorRecord::empty(is_data));
        id
    }

    /// Attaches `data` to a previously-allocated, still-empty sector and
    /// enqueues it onto `pending`. Panics if the sector doesn't exist, is
    /// already written, or already belongs to a set — those are
    /// programming errors per spec.md §9.
    pub fn write_sector(&mut self, id: SectorId, data: Vec<u8>, sector_size: usize) {
        assert_eq!(data.len(), sector_size, "WriteSector: wrong payload length");
        let record = self
            .sectors
            .get_mut(&id)
            .unwrap_or_else(|| panic!("WriteSector: no such sector {id}"));
        assert!(
            record.payload.is_none() && !record.is_uploaded(),
            "WriteSector: sector {id} already written"
        );
        assert!(
            !self.sector_to_set.contains_key(&id),
            "WriteSector: sector {id} already belongs to a set"
        );
        record.payload = Some(data);
        self.pending.push_back(id);
    }

    /// Pops up to `ndata` ids off the front of `pending`, forming exactly
    /// one set whenever `pending.len() >= ndata`, or (when `allow_short`
    /// is set, i.e. during `UploadAllPending`) whatever remains when
    /// `0 < pending.len() < ndata`. Returns the new set's index.
    pub fn form_one_set(&mut self, ndata: usize, allow_short: bool) -> Option<usize> {
        let take = if self.pending.len() >= ndata {
            ndata
        } else if allow_short && !self.pending.is_empty() {
            self.pending.len()
        } else {
            return None;
        };
        assert!(take > 0, "form_one_set: refusing to form an empty set");
        let data_ids: Vec<SectorId> = (0..take)
            .map(|_| self.pending.pop_front().expect("checked length above"))
            .collect();
        let set_index = self.sets.len();
        for &id in &data_ids {
            self.sector_to_set.insert(id, set_index);
        }
        self.sets.push(RedundancySet {
            data_ids,
            parity_ids: Vec::new(),
        });
        Some(set_index)
    }

    pub fn attach_parity(&mut self, set_index: usize, parity_ids: Vec<SectorId>) {
        for &id in &parity_ids {
            self.sector_to_set.insert(id, set_index);
        }
        self.sets[set_index].parity_ids = parity_ids;
    }

    pub fn mark_begin_upload(&mut self, set_index: usize) {
        assert!(
            self.uploading_sets.insert(set_index),
            "programming error: parallel upload of set {set_index}"
        );
    }

    pub fn mark_end_upload(&mut self, set_index: usize) {
        self.uploading_sets.remove(&set_index);
    }

    pub fn mark_uploaded(&mut self, id: SectorId, contract: String, sector_root: String) {
        let record = self.sectors.get_mut(&id).expect("sector must exist");
        record.contract = contract;
        record.sector_root = sector_root;
        record.payload = None;
    }

    pub fn all_uploaded(&self) -> bool {
        self.sets.iter().all(|s| s.is_fully_uploaded(&self.sectors))
    }

    pub fn next_id_peek(&self) -> SectorId {
        self.next_id
    }

    /// Rebuilds state from a persisted snapshot (§persist.rs). `next_id`
    /// must be at least one greater than any id appearing in `sectors`.
    pub fn restore(
        sectors: HashMap<SectorId, SectorRecord>,
        sets: Vec<RedundancySet>,
        pending: VecDeque<SectorId>,
        next_id: SectorId,
    ) -> Self {
        let mut sector_to_set = HashMap::new();
        for (index, set) in sets.iter().enumerate() {
            for id in set.all_ids() {
                sector_to_set.insert(id, index);
            }
        }
        ManagerState {
            sectors,
            sets,
            pending,
            sector_to_set,
            uploading_sets: std::collections::HashSet::new(),
            next_id,
        }
    }
}

impl Default for ManagerState {
    fn default() -> Self {
        Self::new()
    }
}
