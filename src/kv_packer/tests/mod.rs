// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::backend::mock::MockBackend;
use crate::config::EngineConfig;
use crate::sector_manager::SectorManager;

use super::KvPacker;

fn packer() -> KvPacker<MockBackend> {
    let backend = MockBackend::new(["01", "02", "03"]);
    let config = EngineConfig::default()
        .with_sector_size(32)
        .with_redundancy(2, 1)
        .with_sector_cache_capacity(64);
    let manager = Arc::new(SectorManager::new(config, b"a key", backend).unwrap());
    KvPacker::new(manager)
}

#[tokio::test]
async fn put_has_get_delete_round_trip() {
    let kv = packer();
    kv.put("a", b"one").await.unwrap();
    assert!(kv.has("a"));
    assert_eq!(kv.get("a").await.unwrap(), b"one");

    kv.delete("a").unwrap();
    assert!(!kv.has("a"));
    assert!(kv.get("a").await.is_err());
}

#[tokio::test]
async fn get_at_reads_part_of_a_value() {
    let kv = packer();
    kv.put("k", b"0123456789").await.unwrap();
    assert_eq!(kv.get_at("k", 3, 4).await.unwrap(), b"3456");
}

#[tokio::test]
async fn history_allows_time_travel_to_an_earlier_revision() {
    let kv = packer();
    kv.put("a", b"v1").await.unwrap();
    kv.put("a", b"v2").await.unwrap();
    kv.delete("a").unwrap();

    let at_0 = kv.table_at_revision(0);
    assert_eq!(at_0.get("a").map(|e| e.size), Some(2));
    let at_1 = kv.table_at_revision(1);
    assert_eq!(at_1.get("a").map(|e| e.size), Some(2));
    let at_2 = kv.table_at_revision(2);
    assert!(!at_2.contains_key("a"));
}

#[tokio::test]
async fn link_shares_the_value_under_a_new_key() {
    let kv = packer();
    kv.put("orig", b"shared").await.unwrap();
    kv.link("orig", "alias").unwrap();
    assert_eq!(kv.get("alias").await.unwrap(), b"shared");
}

#[tokio::test]
async fn dump_db_rotates_through_the_configured_slot_range() {
    let kv = packer();
    kv.put("a", b"v").await.unwrap();
    let (slot0, _) = kv.dump_db().unwrap();
    let (slot1, _) = kv.dump_db().unwrap();
    assert_eq!(slot0, 0);
    assert_eq!(slot1, 1);
}

#[tokio::test]
async fn load_restores_table_and_history() {
    let kv = packer();
    kv.put("a", b"value").await.unwrap();
    let (_, dump) = kv.dump_db().unwrap();

    let reloaded = KvPacker::load(kv.manager.clone(), &dump).unwrap();
    assert_eq!(reloaded.get("a").await.unwrap(), b"value");
    assert_eq!(reloaded.history().len(), 1);
}
