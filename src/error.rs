// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Crate-wide error type.
//!
//! Recoverable conditions (§7 of the design doc) become `Err` values;
//! programming errors (parallel upload of the same sector, a set formed
//! with zero sectors, a sector/set membership discrepancy) are bugs and
//! `panic!` instead of being threaded through `Result`.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SectorVaultError>;

#[derive(thiserror::Error, Debug)]
pub enum SectorVaultError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("corrupted: {0}")]
    Corrupted(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("overflow: {0}")]
    Overflow(String),

    #[error("upload failed, will retry: {0}")]
    TransientUpload(String),

    #[error("store is broken from a prior I/O failure")]
    Broken,

    #[error("the manager was stopped")]
    Cancelled,

    #[error("not enough data to recover sector {sector_id}: got {got}, need {need}")]
    NotEnoughToRecover {
        sector_id: u64,
        got: usize,
        need: usize,
    },

    #[error("too few contracts: need {need}, have {have}")]
    TooFewContracts { need: usize, have: usize },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SerializationError {
    #[error("gzip: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("cbor encode: {0}")]
    Encode(String),

    #[error("cbor decode: {0}")]
    Decode(String),
}

impl SectorVaultError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SectorVaultError::Io {
            path: path.into(),
            source,
        }
    }
}
