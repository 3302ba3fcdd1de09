// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! spec.md §8 scenario 6: `Put`/`Has`/`Get`/`GetAt`/`Delete` round trip
//! through the key/value packer.

use std::sync::Arc;

use sectorvault::backend::mock::MockBackend;
use sectorvault::kv_packer::KvPacker;
use sectorvault::{EngineConfig, SectorManager};

#[tokio::test]
async fn put_get_get_at_and_delete_round_trip_a_value() {
    let config = EngineConfig::default();
    let backend = MockBackend::new(["01"]);
    let manager = Arc::new(SectorManager::new(config, b"kv-scenario-key", backend).unwrap());
    let packer = KvPacker::new(manager);

    let value = b"123456789";
    assert_eq!(value.len(), 9);

    packer.put("file", value).await.unwrap();
    assert!(packer.has("file"));

    let got = packer.get("file").await.unwrap();
    assert_eq!(got, value);

    let got_at = packer.get_at("file", 1, 2).await.unwrap();
    assert_eq!(got_at, &value[1..3]);

    packer.delete("file").unwrap();
    assert!(!packer.has("file"));
}
