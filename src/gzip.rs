// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! gzip(best-compression), a direct port of `original_source/gzip/gzip.go`.
//! Every persistence format in this crate is wrapped with these two
//! functions before it touches a backend.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{SerializationError, SectorVaultError};

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, SectorVaultError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(SerializationError::Gzip)?;
    Ok(encoder.finish().map_err(SerializationError::Gzip)?)
}

pub fn gunzip(zdata: &[u8]) -> Result<Vec<u8>, SectorVaultError> {
    let mut decoder = GzDecoder::new(zdata);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(SerializationError::Gzip)?;
    Ok(out)
}
