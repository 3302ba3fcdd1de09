// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The remote-storage capability surface (§9: "a simple capability triple
//! `{Contracts, Read, Write}`"). Real implementations (the HTTP provider
//! client, the encrypting wrapper, the caching wrapper) all forward to the
//! next layer in the pipeline; only the terminal provider actually talks
//! to a remote host, and that adapter is out of this crate's scope (see
//! `original_source/siaform/siaclient/siaclient.go`) — here it is a trait
//! plus the in-memory mock used by every test in this crate.

pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A provider identifier, hex-encoded as the spec requires.
pub type ContractId = String;
/// A provider-returned Merkle root, hex-encoded.
pub type SectorRoot = String;

/// The capability set the sector manager consumes. Implementations must
/// be cheap to clone (an `Arc` internally) since every upload/read task
/// holds its own handle.
#[async_trait]
pub trait SectorBackend: Send + Sync {
    async fn contracts(&self) -> Result<Vec<ContractId>>;

    /// Returns exactly `sector_size` bytes on success.
    async fn read(
        &self,
        contract: &ContractId,
        sector_root: &SectorRoot,
        sector_id: u64,
    ) -> Result<Vec<u8>>;

    async fn write(&self, contract: &ContractId, data: &[u8], sector_id: u64) -> Result<SectorRoot>;
}

/// Lets an `Arc`-wrapped backend be used directly, so callers can keep a
/// handle to manipulate it (e.g. toggling providers in tests) after
/// handing a clone to a [`crate::sector_manager::SectorManager`].
#[async_trait]
impl<T: SectorBackend + ?Sized> SectorBackend for Arc<T> {
    async fn contracts(&self) -> Result<Vec<ContractId>> {
        (**self).contracts().await
    }

    async fn read(&self, contract: &ContractId, sector_root: &SectorRoot, sector_id: u64) -> Result<Vec<u8>> {
        (**self).read(contract, sector_root, sector_id).await
    }

    async fn write(&self, contract: &ContractId, data: &[u8], sector_id: u64) -> Result<SectorRoot> {
        (**self).write(contract, data, sector_id).await
    }
}
