// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Engine-wide tunables. `EngineConfig` is the single place that holds the
//! numeric constants from §6 of the design doc; every subsystem takes its
//! share of this struct (or the whole thing) at construction time instead
//! of hard-coding defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 4 MiB, the spec's example sector size.
pub const DEFAULT_SECTOR_SIZE: u32 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size in bytes of every sector. Fixed for the lifetime of a store.
    pub sector_size: u32,
    /// Data sectors per redundancy set.
    pub ndata: usize,
    /// Parity sectors per redundancy set.
    pub nparity: usize,
    /// Writes smaller than this are coalesced into the in-progress sector.
    /// Defaults to 95% of `sector_size`.
    pub min_size_for_sector: u32,
    /// How long a provider is excluded from placement after a failure.
    #[serde(with = "humantime_duration")]
    pub provider_cooldown: Duration,
    /// Backoff between retries of a failed set upload.
    #[serde(with = "humantime_duration")]
    pub upload_retry_backoff: Duration,
    /// Number of sectors the `SectorCache` keeps in memory.
    pub sector_cache_capacity: usize,
    /// Highest `db` file index before the KV packer's rotation wraps
    /// (`[0, kv_max_db_name]`, modelled on the original's `maxDbName`).
    pub kv_max_db_name: u32,
    /// Max value size accepted by the KV packer before it must flush.
    pub kv_max_value_size: usize,
    /// `ChunkAppender`'s backing cache, in item count.
    pub chunk_cache_max_items: usize,
    /// `ChunkAppender`'s backing cache, in cumulative bytes.
    pub chunk_cache_max_weight_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let sector_size = DEFAULT_SECTOR_SIZE;
        EngineConfig {
            sector_size,
            ndata: 10,
            nparity: 10,
            min_size_for_sector: min_size_for_sector(sector_size),
            provider_cooldown: Duration::from_secs(60),
            upload_retry_backoff: Duration::from_secs(1),
            sector_cache_capacity: 256,
            kv_max_db_name: 9,
            kv_max_value_size: sector_size as usize,
            chunk_cache_max_items: 1024,
            chunk_cache_max_weight_bytes: 256 * 1024 * 1024,
        }
    }
}

/// `sectorSize * 95 / 100`, matching §4.4's `minSizeForSector`.
pub fn min_size_for_sector(sector_size: u32) -> u32 {
    sector_size * 95 / 100
}

impl EngineConfig {
    pub fn with_sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self.min_size_for_sector = min_size_for_sector(sector_size);
        self
    }

    pub fn with_redundancy(mut self, ndata: usize, nparity: usize) -> Self {
        self.ndata = ndata;
        self.nparity = nparity;
        self
    }

    pub fn with_sector_cache_capacity(mut self, capacity: usize) -> Self {
        self.sector_cache_capacity = capacity;
        self
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
