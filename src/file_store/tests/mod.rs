// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::backend::mock::MockBackend;
use crate::config::EngineConfig;
use crate::sector_manager::SectorManager;

use super::FileStore;

fn store() -> FileStore<MockBackend> {
    let backend = MockBackend::new(["01", "02", "03"]);
    let config = EngineConfig::default()
        .with_sector_size(32)
        .with_redundancy(2, 1)
        .with_sector_cache_capacity(64);
    let manager = Arc::new(SectorManager::new(config, b"a key", backend).unwrap());
    FileStore::new(manager)
}

#[tokio::test]
async fn small_writes_coalesce_into_one_sector_and_read_back() {
    let fs = store();
    fs.create("a.txt").unwrap();
    fs.create("b.txt").unwrap();
    fs.put("a.txt", b"hello").await.unwrap();
    fs.put("b.txt", b"world").await.unwrap();
    fs.flush().unwrap();
    fs.manager.upload_all_pending().await.unwrap();

    assert_eq!(fs.get("a.txt").await.unwrap(), b"hello");
    assert_eq!(fs.get("b.txt").await.unwrap(), b"world");
}

#[tokio::test]
async fn large_write_gets_its_own_sector() {
    let fs = store();
    fs.create("big.bin").unwrap();
    let data = vec![42u8; 32];
    fs.put("big.bin", &data).await.unwrap();
    fs.manager.upload_all_pending().await.unwrap();
    assert_eq!(fs.get("big.bin").await.unwrap(), data);
}

#[tokio::test]
async fn get_at_reads_a_sub_range_across_pieces() {
    let fs = store();
    fs.create("f").unwrap();
    fs.put("f", b"0123456789").await.unwrap();
    fs.put("f", b"abcdefghij").await.unwrap();
    fs.flush().unwrap();
    fs.manager.upload_all_pending().await.unwrap();

    let slice = fs.get_at("f", 5, 8).await.unwrap();
    assert_eq!(slice, b"56789abc");
}

#[tokio::test]
async fn rename_and_link_share_or_move_the_piece_list() {
    let fs = store();
    fs.create("orig").unwrap();
    fs.put("orig", b"payload").await.unwrap();
    fs.flush().unwrap();
    fs.manager.upload_all_pending().await.unwrap();

    fs.link("orig", "copy").unwrap();
    assert_eq!(fs.get("copy").await.unwrap(), b"payload");

    fs.rename("orig", "renamed").unwrap();
    assert!(!fs.has("orig"));
    assert_eq!(fs.get("renamed").await.unwrap(), b"payload");
}

#[tokio::test]
async fn delete_removes_the_file_but_not_earlier_reads() {
    let fs = store();
    fs.create("gone").unwrap();
    fs.put("gone", b"bye").await.unwrap();
    fs.delete("gone").unwrap();
    assert!(!fs.has("gone"));
    assert!(fs.get("gone").await.is_err());
}

#[tokio::test]
async fn get_reads_a_small_write_still_sitting_in_the_in_progress_buffer() {
    let fs = store();
    fs.create("a").unwrap();
    fs.put("a", b"hi").await.unwrap();
    // No flush, no upload: the sector backing this piece only exists in
    // the shared in-progress buffer.
    assert_eq!(fs.get("a").await.unwrap(), b"hi");
}

#[tokio::test]
async fn open_file_seek_read_and_write_behave_like_a_posix_handle() {
    let fs = store();
    fs.create("f").unwrap();
    fs.put("f", b"0123456789").await.unwrap();
    fs.flush().unwrap();
    fs.manager.upload_all_pending().await.unwrap();

    let mut handle = fs.open("f").unwrap();
    assert_eq!(handle.seek(std::io::SeekFrom::End(0)).unwrap(), 10);

    let mut buf = [0u8; 4];
    let n = handle.read(&mut buf).await.unwrap();
    // End-of-file: nothing left to read.
    assert_eq!(n, 0);

    handle.seek(std::io::SeekFrom::Start(2)).unwrap();
    let n = handle.read(&mut buf).await.unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf, b"2345");
    assert_eq!(handle.position(), 6);

    let written = handle.write(b"xyz").await;
    // Cursor sits at 6, file size is 10: not an append, must be refused.
    assert!(written.is_err());

    handle.seek(std::io::SeekFrom::End(0)).unwrap();
    handle.write(b"xyz").await.unwrap();
    assert_eq!(fs.get("f").await.unwrap(), b"0123456789xyz");
}

#[tokio::test]
async fn dump_and_load_preserve_the_directory() {
    let fs = store();
    fs.create("kept").unwrap();
    fs.put("kept", b"durable").await.unwrap();
    fs.flush().unwrap();
    fs.manager.upload_all_pending().await.unwrap();
    let dump = fs.dump_db().unwrap();

    let reloaded = FileStore::load(fs.manager.clone(), &dump).unwrap();
    assert_eq!(reloaded.get("kept").await.unwrap(), b"durable");
}
