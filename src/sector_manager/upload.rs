// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Provider selection and the upload retry loop (§4.3, §5). Generalizes
//! `original_source/siaform/manager/manager.go`'s single-target upload
//! into "pick `ndata + nparity` distinct, non-cooling-down providers,
//! ranked by observed latency" and adds the cooldown-on-failure policy
//! the original enforced with a plain timestamp map.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::backend::ContractId;
use crate::error::{Result, SectorVaultError};

/// Running mean upload latency per provider. A provider with no samples
/// yet is preferred over one with samples, so every provider eventually
/// gets exercised instead of the fastest few taking all traffic forever.
#[derive(Default)]
pub struct LatencyTracker {
    totals: Mutex<HashMap<ContractId, (u64, u32)>>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, contract: &ContractId, elapsed: Duration) {
        let mut totals = self.totals.lock();
        let entry = totals.entry(contract.clone()).or_insert((0, 0));
        entry.0 += elapsed.as_millis() as u64;
        entry.1 += 1;
    }

    pub fn average_ms(&self, contract: &ContractId) -> Option<f64> {
        self.totals
            .lock()
            .get(contract)
            .map(|&(total, count)| total as f64 / count.max(1) as f64)
    }
}

/// Tracks the instant of each provider's most recent failed upload so a
/// provider can be skipped for `cooldown` after an error, rather than
/// retried immediately into the same outage.
#[derive(Default)]
pub struct FailureTracker {
    last_failure: Mutex<HashMap<ContractId, Instant>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self, contract: &ContractId, now: Instant) {
        self.last_failure.lock().insert(contract.clone(), now);
    }

    pub fn clear(&self, contract: &ContractId) {
        self.last_failure.lock().remove(contract);
    }

    pub fn is_cooling_down(&self, contract: &ContractId, cooldown: Duration, now: Instant) -> bool {
        self.last_failure
            .lock()
            .get(contract)
            .map(|&at| now.duration_since(at) < cooldown)
            .unwrap_or(false)
    }
}

/// Ranks `contracts` by latency (unseen providers first) and returns the
/// `count` best ones, excluding any currently cooling down. Errs with
/// [`SectorVaultError::TooFewContracts`] when fewer than `count` remain.
pub fn choose_providers(
    contracts: &[ContractId],
    count: usize,
    latency: &LatencyTracker,
    failures: &FailureTracker,
    cooldown: Duration,
    now: Instant,
) -> Result<Vec<ContractId>> {
    let mut candidates: Vec<&ContractId> = contracts
        .iter()
        .filter(|c| !failures.is_cooling_down(c, cooldown, now))
        .collect();
    // Shuffle before the stable sort so providers tied on latency (most
    // often every still-unseen one) don't always land in the same
    // fixed order, which would otherwise always send traffic to the
    // same few providers first.
    candidates.shuffle(&mut rand::thread_rng());
    candidates.sort_by(|a, b| {
        match (latency.average_ms(a), latency.average_ms(b)) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        }
    });
    if candidates.len() < count {
        return Err(SectorVaultError::TooFewContracts {
            need: count,
            have: candidates.len(),
        });
    }
    Ok(candidates.into_iter().take(count).cloned().collect())
}
