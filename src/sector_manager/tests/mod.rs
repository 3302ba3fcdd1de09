// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::backend::mock::MockBackend;
use crate::config::EngineConfig;

use super::SectorManager;

fn tiny_config() -> EngineConfig {
    EngineConfig::default()
        .with_sector_size(16)
        .with_redundancy(2, 1)
        .with_sector_cache_capacity(64)
}

#[tokio::test]
async fn write_upload_all_pending_then_read_round_trips() {
    let backend = MockBackend::new(["01", "02", "03"]);
    let manager = SectorManager::new(tiny_config(), b"a key", backend).unwrap();

    let a = manager.add_sector(vec![1u8; 16]).unwrap();
    let b = manager.add_sector(vec![2u8; 16]).unwrap();
    manager.upload_all_pending().await.unwrap();
    manager.wait_for_uploading().await.unwrap();

    assert_eq!(manager.read_sector(a).await.unwrap(), vec![1u8; 16]);
    assert_eq!(manager.read_sector(b).await.unwrap(), vec![2u8; 16]);
}

#[tokio::test]
async fn read_survives_loss_of_one_provider_via_reconstruction() {
    let backend = Arc::new(MockBackend::new(["01", "02", "03"]));
    let manager = SectorManager::new(tiny_config(), b"a key", backend.clone()).unwrap();

    let a = manager.add_sector(vec![7u8; 16]).unwrap();
    let _b = manager.add_sector(vec![9u8; 16]).unwrap();
    manager.upload_all_pending().await.unwrap();
    manager.wait_for_uploading().await.unwrap();

    // Whichever of the 3 providers a sector landed on, taking out any one
    // of them still leaves ndata=2 of the 3 (2 data + 1 parity) shards
    // reachable, which is enough to reconstruct.
    backend.set_enabled("01", false);

    assert_eq!(manager.read_sector(a).await.unwrap(), vec![7u8; 16]);
}

#[tokio::test]
async fn dump_and_load_preserve_sector_count_and_ids() {
    let backend = MockBackend::new(["01", "02", "03"]);
    let manager = SectorManager::new(tiny_config(), b"a key", backend).unwrap();
    let a = manager.add_sector(vec![5u8; 16]).unwrap();
    manager.upload_all_pending().await.unwrap();
    manager.wait_for_uploading().await.unwrap();
    let dump = manager.dump_db().unwrap();

    let backend2 = MockBackend::new(["01", "02", "03"]);
    let reloaded = SectorManager::load(tiny_config(), b"a key", backend2, &dump).unwrap();
    assert_eq!(reloaded.shared.state.lock().sectors.len(), 2);
    assert!(reloaded.shared.state.lock().sectors.contains_key(&a));
    assert_eq!(reloaded.config().sector_size, 16);
}
