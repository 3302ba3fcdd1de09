// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The central component (§4.3): owns sector allocation, redundancy-set
//! formation, background uploading and recovery-on-read. Generalizes
//! `original_source/siaform/manager/manager.go`'s single-provider,
//! single-backup design into `ndata`/`nparity` Reed-Solomon sets spread
//! across however many contracts the backend reports.

pub mod persist;
pub mod recovery;
pub mod state;
pub mod upload;
mod workers;

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::backend::SectorBackend;
use crate::cache::SectorCache;
use crate::cipher::SectorCipher;
use crate::config::EngineConfig;
use crate::error::{Result, SectorVaultError};

use recovery::RedundancyCodec;
use state::{ManagerState, SectorId};
use upload::{FailureTracker, LatencyTracker};

/// State shared between the `SectorManager` handle and its background
/// workers. Kept separate from `SectorManager` so both can be wrapped in
/// one `Arc` and handed to spawned tasks.
pub(crate) struct Shared<B> {
    config: EngineConfig,
    cipher: SectorCipher,
    cache: SectorCache<B>,
    codec: RedundancyCodec,
    state: SyncMutex<ManagerState>,
    latency: LatencyTracker,
    failures: FailureTracker,
    upload_done: Notify,
}

struct WorkerHandles {
    pending: JoinHandle<()>,
    set: JoinHandle<()>,
    stop_tx: flume::Sender<()>,
}

pub struct SectorManager<B> {
    shared: Arc<Shared<B>>,
    data_signal_tx: flume::Sender<()>,
    data_signal_rx: flume::Receiver<()>,
    set_queue_tx: flume::Sender<usize>,
    set_queue_rx: flume::Receiver<usize>,
    workers: SyncMutex<Option<WorkerHandles>>,
}

impl<B: SectorBackend + 'static> SectorManager<B> {
    pub fn new(config: EngineConfig, cipher_key: &[u8], backend: B) -> Result<Self> {
        let codec = RedundancyCodec::new(config.nparity as usize)?;
        let cache = SectorCache::new(backend, config.sector_cache_capacity);
        let shared = Arc::new(Shared {
            cipher: SectorCipher::new(cipher_key),
            cache,
            codec,
            state: SyncMutex::new(ManagerState::new()),
            latency: LatencyTracker::new(),
            failures: FailureTracker::new(),
            upload_done: Notify::new(),
            config,
        });
        let (data_signal_tx, data_signal_rx) = flume::bounded(1);
        let (set_queue_tx, set_queue_rx) = flume::bounded(1024);
        Ok(SectorManager {
            shared,
            data_signal_tx,
            data_signal_rx,
            set_queue_tx,
            set_queue_rx,
            workers: SyncMutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Reserves a new sector id without attaching any payload yet. Used
    /// by callers (the file store, the KV packer) that need the id
    /// before the bytes that will fill it are ready.
    pub fn allocate_sector(&self) -> SectorId {
        self.shared.state.lock().allocate(true)
    }

    /// Encrypts `data` in place with the per-sector stream cipher and
    /// attaches it to a previously allocated, still-empty sector, then
    /// wakes the background set-former.
    pub fn write_sector(&self, id: SectorId, mut data: Vec<u8>) -> Result<()> {
        let sector_size = self.shared.config.sector_size as usize;
        if data.len() != sector_size {
            return Err(SectorVaultError::OutOfRange(format!(
                "sector payload must be exactly {sector_size} bytes, got {}",
                data.len()
            )));
        }
        self.shared.cipher.encrypt(id, &mut data);
        self.shared.state.lock().write_sector(id, data, sector_size);
        let _ = self.data_signal_tx.try_send(());
        Ok(())
    }

    /// Convenience wrapper: allocate then write in one call.
    pub fn add_sector(&self, data: Vec<u8>) -> Result<SectorId> {
        let id = self.allocate_sector();
        self.write_sector(id, data)?;
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn read_sector(&self, id: SectorId) -> Result<Vec<u8>> {
        let mut ciphertext = self.fetch_ciphertext(id).await?;
        self.shared.cipher.decrypt(id, &mut ciphertext);
        Ok(ciphertext)
    }

    async fn fetch_ciphertext(&self, id: SectorId) -> Result<Vec<u8>> {
        // Fast path: still resident in memory (not yet uploaded).
        {
            let state = self.shared.state.lock();
            let record = state
                .sectors
                .get(&id)
                .ok_or_else(|| SectorVaultError::NotFound(format!("sector {id}")))?;
            if let Some(payload) = &record.payload {
                return Ok(payload.clone());
            }
            if record.is_uploaded() {
                let contract = record.contract.clone();
                let root = record.sector_root.clone();
                drop(state);
                if let Ok(data) = self.shared.cache.read(&contract, &root, id).await {
                    return Ok(data);
                }
            }
        }
        self.reconstruct_sector(id).await
    }

    /// Used when the direct provider for `id` is unreachable: pulls
    /// whichever sibling shards in the redundancy set are still
    /// reachable and reconstructs the missing ones via Reed-Solomon.
    async fn reconstruct_sector(&self, id: SectorId) -> Result<Vec<u8>> {
        let (set, position) = {
            let state = self.shared.state.lock();
            let set_index = *state
                .sector_to_set
                .get(&id)
                .ok_or_else(|| SectorVaultError::Unavailable(format!("sector {id} has no redundancy set yet")))?;
            let set = state.sets[set_index].clone();
            let position = set.position_of(id).expect("sector belongs to its own set");
            (set, position)
        };

        let mut shards: Vec<Option<Vec<u8>>> = Vec::with_capacity(set.data_ids.len() + set.parity_ids.len());
        for sibling in set.all_ids() {
            if sibling == id {
                shards.push(None);
                continue;
            }
            let (contract, root) = {
                let state = self.shared.state.lock();
                let record = &state.sectors[&sibling];
                if !record.is_uploaded() {
                    shards.push(None);
                    continue;
                }
                (record.contract.clone(), record.sector_root.clone())
            };
            match self.shared.cache.read(&contract, &root, sibling).await {
                Ok(data) => shards.push(Some(data)),
                Err(_) => shards.push(None),
            }
        }

        self.shared.codec.reconstruct(&mut shards, set.data_ids.len(), id)?;
        Ok(shards[position].take().expect("reconstructed"))
    }

    /// Reads a sector directly by contract and root, bypassing the
    /// redundancy-set lookup entirely. No re-verification of the
    /// provider-returned root against anything else is performed; the
    /// file store's own checksum is the only integrity check for data
    /// read this way.
    pub async fn insecure_read_sector_at(
        &self,
        contract: &str,
        sector_root: &str,
        sector_id: u64,
    ) -> Result<Vec<u8>> {
        let mut ciphertext = self
            .shared
            .cache
            .read(&contract.to_string(), &sector_root.to_string(), sector_id)
            .await?;
        self.shared.cipher.decrypt(sector_id, &mut ciphertext);
        Ok(ciphertext)
    }

    /// Forms short sets from whatever remains in `pending` and uploads
    /// everything, waiting for completion. Used before a clean shutdown
    /// so no sector payload is left only in memory.
    ///
    /// Each newly formed set is dispatched exactly one way: handed to the
    /// background `set_handler_loop` when it's running (it's the one
    /// draining `set_queue_rx`), or uploaded directly inline otherwise.
    /// Enqueuing *and* uploading the same index would race two
    /// `mark_begin_upload` calls for that set and panic.
    pub async fn upload_all_pending(&self) -> Result<()> {
        let set_indices = workers::form_and_enqueue_sets(&self.shared, true);
        let workers_running = self.workers.lock().is_some();
        for set_index in set_indices {
            if !workers_running || self.set_queue_tx.try_send(set_index).is_err() {
                workers::upload_set(self.shared.clone(), set_index).await?;
            }
        }
        if workers_running {
            self.wait_for_uploading().await?;
        }
        Ok(())
    }

    /// Blocks until every currently known redundancy set has finished
    /// uploading (does not form new sets from leftover pending sectors;
    /// call [`Self::upload_all_pending`] first if that's required).
    pub async fn wait_for_uploading(&self) -> Result<()> {
        loop {
            if self.shared.state.lock().all_uploaded() {
                return Ok(());
            }
            self.shared.upload_done.notified().await;
        }
    }

    /// Spawns the background pending-handler and set-handler loops.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if workers.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = flume::bounded(1);
        let pending = tokio::spawn(workers::pending_handler_loop(
            self.shared.clone(),
            self.data_signal_rx.clone(),
            self.set_queue_tx.clone(),
            stop_rx.clone(),
        ));
        let set = tokio::spawn(workers::set_handler_loop(
            self.shared.clone(),
            self.set_queue_rx.clone(),
            stop_rx,
        ));
        info!("sector manager background workers started");
        *workers = Some(WorkerHandles { pending, set, stop_tx });
    }

    /// Signals both background loops to exit and waits for them.
    pub async fn stop(&self) -> Result<()> {
        let handles = self.workers.lock().take();
        if let Some(handles) = handles {
            let _ = handles.stop_tx.send_async(()).await;
            let _ = handles.pending.await;
            let _ = handles.set.await;
        }
        Ok(())
    }

    pub fn dump_db(&self) -> Result<Vec<u8>> {
        let state = self.shared.state.lock();
        persist::dump(
            &state,
            self.shared.config.ndata,
            self.shared.config.nparity,
            self.shared.config.sector_size,
        )
    }

    pub fn load(config: EngineConfig, cipher_key: &[u8], backend: B, zdata: &[u8]) -> Result<Self> {
        let loaded = persist::load(zdata)?;
        let mut config = config;
        config.ndata = loaded.ndata;
        config.nparity = loaded.nparity;
        config.sector_size = loaded.sector_size;
        let codec = RedundancyCodec::new(config.nparity as usize)?;
        let cache = SectorCache::new(backend, config.sector_cache_capacity);
        let shared = Arc::new(Shared {
            cipher: SectorCipher::new(cipher_key),
            cache,
            codec,
            state: SyncMutex::new(loaded.state),
            latency: LatencyTracker::new(),
            failures: FailureTracker::new(),
            upload_done: Notify::new(),
            config,
        });
        let (data_signal_tx, data_signal_rx) = flume::bounded(1);
        let (set_queue_tx, set_queue_rx) = flume::bounded(1024);
        Ok(SectorManager {
            shared,
            data_signal_tx,
            data_signal_rx,
            set_queue_tx,
            set_queue_rx,
            workers: SyncMutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests;
