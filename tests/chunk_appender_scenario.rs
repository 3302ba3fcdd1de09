// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! spec.md §8 scenario 4: every sub-range read over a three-chunk
//! append-only file must return exactly the corresponding bytes.

use async_trait::async_trait;
use parking_lot::Mutex;

use sectorvault::chunk_appender::{ChunkAppender, ChunkStore};
use sectorvault::error::Result;

struct VecChunkStore {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl VecChunkStore {
    fn new(chunks: &[&str]) -> Self {
        VecChunkStore {
            chunks: Mutex::new(chunks.iter().map(|s| s.as_bytes().to_vec()).collect()),
        }
    }
}

#[async_trait]
impl ChunkStore for VecChunkStore {
    async fn sizes(&self) -> Result<Vec<u64>> {
        Ok(self.chunks.lock().iter().map(|c| c.len() as u64).collect())
    }

    async fn get(&self, index: usize) -> Result<Vec<u8>> {
        Ok(self.chunks.lock()[index].clone())
    }

    async fn put(&self, index: usize, data: &[u8]) -> Result<()> {
        let mut chunks = self.chunks.lock();
        assert_eq!(index, chunks.len());
        chunks.push(data.to_vec());
        Ok(())
    }
}

#[tokio::test]
async fn every_sub_range_of_hello_world_reads_back_exactly() {
    let backend = VecChunkStore::new(&["hello", " ", "world"]);
    let appender = ChunkAppender::new(backend, 64, 4096).await.unwrap();

    let whole = "hello world";
    for x in 0..=whole.len() {
        for y in x..=whole.len() {
            let got = appender.read_at(x as u64, (y - x) as u64).await.unwrap();
            assert_eq!(got, whole[x..y].as_bytes(), "range [{x}, {y})");
        }
    }
}
