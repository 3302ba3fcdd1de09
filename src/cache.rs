// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! LRU cache keyed by sector root with in-flight read deduplication (§4.2).
//! A direct generalization of `original_source/siaform/cache/cache.go`:
//! the original used a `sync.Cond` to serialize concurrent readers of the
//! same sector root; this version uses `tokio::sync::Notify` for the same
//! effect in an async context.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, Notify};

use crate::backend::{ContractId, SectorBackend, SectorRoot};
use crate::error::Result;
use crate::lru::WeightLru;

struct Inner {
    lru: WeightLru<SectorRoot, Bytes>,
    in_flight: HashSet<SectorRoot>,
}

/// Wraps a [`SectorBackend`], caching payloads by the root the backend
/// returns and coalescing concurrent reads of the same root.
pub struct SectorCache<B> {
    backend: B,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl<B: SectorBackend> SectorCache<B> {
    pub fn new(backend: B, capacity: usize) -> Self {
        SectorCache {
            backend,
            inner: Mutex::new(Inner {
                lru: WeightLru::new(capacity, capacity as u64),
                in_flight: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub async fn contracts(&self) -> Result<Vec<ContractId>> {
        self.backend.contracts().await
    }

    /// Waits until no other caller is fetching `sector_root`, then claims
    /// the in-flight slot for ourselves.
    async fn claim(&self, sector_root: &SectorRoot) {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if !inner.in_flight.contains(sector_root) {
                    inner.in_flight.insert(sector_root.clone());
                    return;
                }
            }
            self.notify.notified().await;
        }
    }

    async fn release(&self, sector_root: &SectorRoot) {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(sector_root);
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn read(
        &self,
        contract: &ContractId,
        sector_root: &SectorRoot,
        sector_id: u64,
    ) -> Result<Vec<u8>> {
        self.claim(sector_root).await;
        let result = async {
            if let Some(cached) = self.inner.lock().await.lru.get(sector_root) {
                return Ok(cached.to_vec());
            }
            let data = self.backend.read(contract, sector_root, sector_id).await?;
            self.inner
                .lock()
                .await
                .lru
                .add(sector_root.clone(), Bytes::from(data.clone()), 1)
                .expect("single-sector weight never exceeds capacity");
            Ok(data)
        }
        .await;
        self.release(sector_root).await;
        result
    }

    pub async fn write(&self, contract: &ContractId, data: &[u8], sector_id: u64) -> Result<SectorRoot> {
        let root = self.backend.write(contract, data, sector_id).await?;
        let mut inner = self.inner.lock().await;
        inner
            .lru
            .add(root.clone(), Bytes::from(data.to_vec()), 1)
            .expect("single-sector weight never exceeds capacity");
        Ok(root)
    }
}
