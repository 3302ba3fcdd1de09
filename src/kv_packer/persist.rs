// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Gzip-wrapped cbor4ii snapshot of the table and its history log.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SectorVaultError};
use crate::file_store::FileRecord;
use crate::gzip::{gunzip, gzip};

use super::history::HistoryRecord;

#[derive(Serialize, Deserialize)]
struct KvSnapshot {
    table: HashMap<String, FileRecord>,
    history: Vec<HistoryRecord>,
}

pub struct Loaded {
    pub table: HashMap<String, FileRecord>,
    pub history: Vec<HistoryRecord>,
}

pub fn dump(table: &HashMap<String, FileRecord>, history: &[HistoryRecord]) -> Result<Vec<u8>> {
    let snapshot = KvSnapshot {
        table: table.clone(),
        history: history.to_vec(),
    };
    let encoded = cbor4ii::serde::to_vec(Vec::new(), &snapshot)
        .map_err(|e| SectorVaultError::Serialization(crate::error::SerializationError::Encode(e.to_string())))?;
    gzip(&encoded)
}

pub fn load(zdata: &[u8]) -> Result<Loaded> {
    let encoded = gunzip(zdata)?;
    let snapshot: KvSnapshot = cbor4ii::serde::from_slice(&encoded)
        .map_err(|e| SectorVaultError::Serialization(crate::error::SerializationError::Decode(e.to_string())))?;
    Ok(Loaded {
        table: snapshot.table,
        history: snapshot.history,
    })
}
