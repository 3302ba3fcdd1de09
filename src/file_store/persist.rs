// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Gzip-wrapped cbor4ii snapshot of the file directory, same framing
//! convention as `crate::sector_manager::persist`.

use std::collections::HashMap;

use crate::error::{Result, SectorVaultError};
use crate::gzip::{gunzip, gzip};

use super::FileRecord;

pub fn dump(files: &HashMap<String, FileRecord>) -> Result<Vec<u8>> {
    let encoded = cbor4ii::serde::to_vec(Vec::new(), files)
        .map_err(|e| SectorVaultError::Serialization(crate::error::SerializationError::Encode(e.to_string())))?;
    gzip(&encoded)
}

pub fn load(zdata: &[u8]) -> Result<HashMap<String, FileRecord>> {
    let encoded = gunzip(zdata)?;
    cbor4ii::serde::from_slice(&encoded)
        .map_err(|e| SectorVaultError::Serialization(crate::error::SerializationError::Decode(e.to_string())))
}
