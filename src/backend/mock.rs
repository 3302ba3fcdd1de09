// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! In-memory stand-in for a fleet of sector-storage providers. Used by
//! every test in this crate in place of the real HTTP client
//! (`original_source/siaform/siaclient/siaclient.go`), which is out of
//! scope for this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{ContractId, SectorBackend, SectorRoot};
use crate::error::{Result, SectorVaultError};

struct ProviderState {
    sectors: HashMap<SectorRoot, Vec<u8>>,
    enabled: bool,
}

/// A mock fleet of providers, each independently toggleable so tests can
/// simulate outages (spec.md §8 scenario 2: "disable {01,03,05,07}").
pub struct MockBackend {
    providers: Mutex<HashMap<ContractId, ProviderState>>,
    writes: AtomicU64,
}

impl MockBackend {
    pub fn new(contract_ids: impl IntoIterator<Item = impl Into<ContractId>>) -> Self {
        let providers = contract_ids
            .into_iter()
            .map(|id| {
                (
                    id.into(),
                    ProviderState {
                        sectors: HashMap::new(),
                        enabled: true,
                    },
                )
            })
            .collect();
        MockBackend {
            providers: Mutex::new(providers),
            writes: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, contract: &str, enabled: bool) {
        if let Some(state) = self.providers.lock().get_mut(contract) {
            state.enabled = enabled;
        }
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn merkle_root(data: &[u8]) -> SectorRoot {
        hex::encode(Sha256::digest(data))
    }
}

#[async_trait]
impl SectorBackend for MockBackend {
    async fn contracts(&self) -> Result<Vec<ContractId>> {
        Ok(self
            .providers
            .lock()
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn read(
        &self,
        contract: &ContractId,
        sector_root: &SectorRoot,
        _sector_id: u64,
    ) -> Result<Vec<u8>> {
        let providers = self.providers.lock();
        let state = providers
            .get(contract)
            .ok_or_else(|| SectorVaultError::Unavailable(format!("no such contract {contract}")))?;
        if !state.enabled {
            return Err(SectorVaultError::Unavailable(format!(
                "provider {contract} disabled"
            )));
        }
        state
            .sectors
            .get(sector_root)
            .cloned()
            .ok_or_else(|| SectorVaultError::NotFound(format!("sector root {sector_root}")))
    }

    async fn write(
        &self,
        contract: &ContractId,
        data: &[u8],
        _sector_id: u64,
    ) -> Result<SectorRoot> {
        let mut providers = self.providers.lock();
        let state = providers
            .get_mut(contract)
            .ok_or_else(|| SectorVaultError::Unavailable(format!("no such contract {contract}")))?;
        if !state.enabled {
            return Err(SectorVaultError::Unavailable(format!(
                "provider {contract} disabled"
            )));
        }
        let root = Self::merkle_root(data);
        state.sectors.insert(root.clone(), data.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let backend = MockBackend::new(["01", "02"]);
        let root = backend.write(&"01".to_string(), b"hello", 1).await.unwrap();
        let data = backend.read(&"01".to_string(), &root, 1).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn disabled_provider_is_excluded_from_contracts() {
        let backend = MockBackend::new(["01", "02"]);
        backend.set_enabled("01", false);
        let contracts = backend.contracts().await.unwrap();
        assert_eq!(contracts, vec!["02".to_string()]);
    }
}
