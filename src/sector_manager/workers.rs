// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Background loops: one forms redundancy sets out of the pending queue,
//! the other drains formed sets to the backend. Split the way
//! `original_source/siaform/manager/manager.go` splits `pendingHandler`
//! and `setHandler`, each woken by its own channel rather than polling.

use std::sync::Arc;
use std::time::Instant;

use tracing::{instrument, warn};

use crate::backend::{ContractId, SectorBackend};
use crate::error::Result;

use super::state::SectorId;
use super::upload::choose_providers;
use super::Shared;

/// Drains as many full `ndata`-sized sets out of `pending` as possible
/// (and, when `allow_short`, one final short set), allocating parity
/// sector ids for each and returning their indices.
pub(crate) fn form_and_enqueue_sets<B>(shared: &Arc<Shared<B>>, allow_short: bool) -> Vec<usize> {
    let mut state = shared.state.lock();
    let mut formed = Vec::new();
    loop {
        let ndata = shared.config.ndata;
        let nparity = shared.config.nparity;
        let Some(set_index) = state.form_one_set(ndata, allow_short) else {
            break;
        };
        let parity_ids: Vec<SectorId> = (0..nparity).map(|_| state.allocate(false)).collect();
        state.attach_parity(set_index, parity_ids);
        formed.push(set_index);
        if !allow_short {
            continue;
        }
        // A short set drains `pending` completely; don't loop forever.
        if state.pending.is_empty() {
            break;
        }
    }
    formed
}

/// Computes parity for `set_index` (if not yet computed) and uploads
/// every shard to a freshly chosen provider, retrying with backoff on
/// failure until it succeeds or the whole set has no viable providers.
#[instrument(skip(shared))]
pub(crate) async fn upload_set<B: SectorBackend>(shared: Arc<Shared<B>>, set_index: usize) -> Result<()> {
    let (data_ids, parity_ids, data_shards) = {
        let state = shared.state.lock();
        let set = state.sets[set_index].clone();
        let data_shards: Vec<Vec<u8>> = set
            .data_ids
            .iter()
            .map(|id| {
                state.sectors[id]
                    .payload
                    .clone()
                    .expect("data shard must be resident before upload")
            })
            .collect();
        (set.data_ids, set.parity_ids, data_shards)
    };

    let parity_shards = shared.codec.encode_parity(&data_shards)?;
    let all_ids: Vec<SectorId> = data_ids.iter().chain(parity_ids.iter()).copied().collect();
    let all_shards: Vec<Vec<u8>> = data_shards.into_iter().chain(parity_shards).collect();

    shared.state.lock().mark_begin_upload(set_index);
    let result = upload_shards(&shared, &all_ids, &all_shards).await;
    shared.state.lock().mark_end_upload(set_index);
    shared.upload_done.notify_waiters();
    result
}

/// Uploads every shard of one set, preferring a provider that hasn't
/// already taken a shard from this same set: otherwise losing a single
/// provider could take out more than one shard of a set that was meant
/// to tolerate exactly `nparity` losses. Only reuses a provider within
/// the set once every other available one already has a shard (more
/// shards than providers).
async fn upload_shards<B: SectorBackend>(shared: &Arc<Shared<B>>, ids: &[SectorId], shards: &[Vec<u8>]) -> Result<()> {
    let mut used_in_set: std::collections::HashSet<ContractId> = std::collections::HashSet::new();
    for (&id, shard) in ids.iter().zip(shards.iter()) {
        loop {
            let contracts = shared.cache.contracts().await?;
            let unused: Vec<ContractId> = contracts.iter().filter(|c| !used_in_set.contains(*c)).cloned().collect();
            let candidates = if unused.is_empty() { &contracts } else { &unused };
            let chosen = choose_providers(
                candidates,
                1,
                &shared.latency,
                &shared.failures,
                shared.config.provider_cooldown,
                Instant::now(),
            );
            let contract = match chosen {
                Ok(mut c) => c.remove(0),
                Err(err) => {
                    warn!(sector_id = id, "no provider available, retrying: {err}");
                    tokio::time::sleep(shared.config.upload_retry_backoff).await;
                    continue;
                }
            };
            let started = Instant::now();
            match shared.cache.write(&contract, shard, id).await {
                Ok(root) => {
                    shared.latency.record(&contract, started.elapsed());
                    shared.failures.clear(&contract);
                    used_in_set.insert(contract.clone());
                    shared.state.lock().mark_uploaded(id, contract, root);
                    break;
                }
                Err(err) => {
                    warn!(sector_id = id, provider = %contract, "upload failed, will retry: {err}");
                    shared.failures.record_failure(&contract, Instant::now());
                    tokio::time::sleep(shared.config.upload_retry_backoff).await;
                }
            }
        }
    }
    Ok(())
}

pub(crate) async fn pending_handler_loop<B: SectorBackend>(
    shared: Arc<Shared<B>>,
    data_signal_rx: flume::Receiver<()>,
    set_queue_tx: flume::Sender<usize>,
    stop_rx: flume::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = stop_rx.recv_async() => return,
            signal = data_signal_rx.recv_async() => {
                if signal.is_err() {
                    return;
                }
                for set_index in form_and_enqueue_sets(&shared, false) {
                    if set_queue_tx.send_async(set_index).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

pub(crate) async fn set_handler_loop<B: SectorBackend + 'static>(
    shared: Arc<Shared<B>>,
    set_queue_rx: flume::Receiver<usize>,
    stop_rx: flume::Receiver<()>,
) {
    let mut inflight = tokio::task::JoinSet::new();
    loop {
        tokio::select! {
            _ = stop_rx.recv_async() => break,
            set_index = set_queue_rx.recv_async() => {
                match set_index {
                    Ok(set_index) => {
                        let shared = shared.clone();
                        inflight.spawn(async move { upload_set(shared, set_index).await });
                    }
                    Err(_) => break,
                }
            }
            Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                if let Ok(Err(err)) = joined {
                    warn!("set upload task failed: {err}");
                }
            }
        }
    }
    while let Some(joined) = inflight.join_next().await {
        if let Ok(Err(err)) = joined {
            warn!("set upload task failed during shutdown: {err}");
        }
    }
}
