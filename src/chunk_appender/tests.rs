// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use rstest::rstest;

use super::{ChunkAppender, ChunkStore};
use crate::error::Result;
use crate::sparse::ByteStream;

struct MockChunkStore {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl MockChunkStore {
    fn new(chunks: Vec<Vec<u8>>) -> Self {
        MockChunkStore { chunks: Mutex::new(chunks) }
    }
}

#[async_trait]
impl ChunkStore for MockChunkStore {
    async fn sizes(&self) -> Result<Vec<u64>> {
        Ok(self.chunks.lock().iter().map(|c| c.len() as u64).collect())
    }

    async fn get(&self, index: usize) -> Result<Vec<u8>> {
        Ok(self.chunks.lock()[index].clone())
    }

    async fn put(&self, index: usize, data: &[u8]) -> Result<()> {
        let mut chunks = self.chunks.lock();
        assert_eq!(index, chunks.len(), "backend.put must append the next chunk index");
        chunks.push(data.to_vec());
        Ok(())
    }
}

async fn appender_over(chunks: &[&str]) -> ChunkAppender<MockChunkStore> {
    let backend = MockChunkStore::new(chunks.iter().map(|s| s.as_bytes().to_vec()).collect());
    ChunkAppender::new(backend, 1024, 1024 * 1024).await.unwrap()
}

#[tokio::test]
async fn read_at_returns_the_exact_bytes_for_every_sub_range() {
    let appender = appender_over(&["hello", " ", "world"]).await;
    let whole = "hello world";
    for x in 0..=whole.len() {
        for y in x..=whole.len() {
            let got = appender.read_at(x as u64, (y - x) as u64).await.unwrap();
            assert_eq!(got, whole[x..y].as_bytes(), "range {x}..{y}");
        }
    }
}

#[rstest]
#[case(0, 0)]
#[case(0, 11)]
#[case(5, 5)]
#[case(4, 7)]
#[case(5, 6)]
#[case(11, 11)]
#[tokio::test]
async fn read_at_boundary_pairs_match_the_slice(#[case] x: usize, #[case] y: usize) {
    let appender = appender_over(&["hello", " ", "world"]).await;
    let whole = "hello world";
    let got = appender.read_at(x as u64, (y - x) as u64).await.unwrap();
    assert_eq!(got, whole[x..y].as_bytes(), "range {x}..{y}");
}

#[tokio::test]
async fn write_at_must_be_a_pure_append() {
    let backend = MockChunkStore::new(vec![b"abc".to_vec()]);
    let appender = ChunkAppender::new(backend, 16, 1024).await.unwrap();
    assert!(appender.write_at(b"def", 0).await.is_err());
    appender.write_at(b"def", 3).await.unwrap();
    assert_eq!(appender.read_at(0, 6).await.unwrap(), b"abcdef");
}

#[tokio::test]
async fn truncate_only_grows_by_appending_zeros() {
    let backend = MockChunkStore::new(vec![b"ab".to_vec()]);
    let appender = ChunkAppender::new(backend, 16, 1024).await.unwrap();
    assert!(appender.truncate(1).await.is_err());
    appender.truncate(5).await.unwrap();
    assert_eq!(appender.read_at(0, 5).await.unwrap(), b"ab\0\0\0");
}

#[tokio::test]
async fn reads_are_served_from_cache_after_the_first_fetch() {
    let appender = Arc::new(appender_over(&["hello", "world"]).await);
    let first = appender.read_at(0, 10).await.unwrap();
    let second = appender.read_at(3, 4).await.unwrap();
    assert_eq!(first, b"helloworld");
    assert_eq!(second, b"lowo");
}

#[tokio::test]
async fn byte_stream_append_reports_the_offset_it_started_at() {
    let backend = MockChunkStore::new(vec![b"abc".to_vec()]);
    let mut appender = ChunkAppender::new(backend, 16, 1024).await.unwrap();
    let offset = ByteStream::append(&mut appender, b"def").await.unwrap();
    assert_eq!(offset, 3);
    assert_eq!(ByteStream::read_at(&appender, 0, 6).await.unwrap(), b"abcdef");
}
