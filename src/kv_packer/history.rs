// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The append-only operation log that makes time travel possible.
//! Unlike `original_source/siaform/zipkv/zipkv.go`, which only logged
//! the previous `Location` a key pointed at, this logs the operation
//! itself (`Put` with its new location, or `Delete`) — the original's
//! scheme can't replay from an empty table to an arbitrary revision
//! because a `Delete` record carries no information about what preceded
//! it; logging the operation is a strict superset and keeps replay
//! well-defined for `rev = 0`.

use serde::{Deserialize, Serialize};

use crate::file_store::FileRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum HistoryRecord {
    Put { key: String, entry: FileRecord },
    Delete { key: String },
}

/// Replays `records[..=rev]` (or the whole log, if `rev` is past the
/// end) onto an empty table and returns the resulting key/value index.
pub fn replay_to_revision(
    records: &[HistoryRecord],
    rev: usize,
) -> std::collections::HashMap<String, FileRecord> {
    let mut table = std::collections::HashMap::new();
    let end = (rev + 1).min(records.len());
    for record in &records[..end] {
        match record {
            HistoryRecord::Put { key, entry } => {
                table.insert(key.clone(), entry.clone());
            }
            HistoryRecord::Delete { key } => {
                table.remove(key);
            }
        }
    }
    table
}
