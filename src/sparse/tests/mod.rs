// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use pretty_assertions::assert_eq;

use super::{ByteStream, FileStream, SparseFile, VecStream};

fn new_file() -> SparseFile<VecStream, VecStream> {
    SparseFile::new(VecStream::default(), VecStream::default())
}

#[tokio::test]
async fn read_of_never_written_range_is_all_zero() {
    let file = new_file();
    assert_eq!(file.read(0, 16).await.unwrap(), vec![0u8; 16]);
}

#[tokio::test]
async fn overlapping_write_shadows_the_earlier_one() {
    let mut file = new_file();
    file.write(0, &[1u8; 10]).await.unwrap();
    file.write(4, &[2u8; 2]).await.unwrap();
    let data = file.read(0, 10).await.unwrap();
    assert_eq!(data, vec![1, 1, 1, 1, 2, 2, 1, 1, 1, 1]);
}

#[tokio::test]
async fn all_zero_write_is_not_stored_but_reads_back_as_zero() {
    let mut file = new_file();
    file.write(0, &[9u8; 10]).await.unwrap();
    file.write(2, &[0u8; 4]).await.unwrap();
    let data = file.read(0, 10).await.unwrap();
    assert_eq!(data, vec![9, 9, 0, 0, 0, 0, 9, 9, 9, 9]);
}

#[tokio::test]
async fn zero_write_into_virgin_territory_costs_no_storage() {
    let mut file = new_file();
    file.write(100, &[0u8; 50]).await.unwrap();
    assert_eq!(file.read(100, 50).await.unwrap(), vec![0u8; 50]);
}

#[tokio::test]
async fn reopening_from_the_two_streams_reproduces_overlapping_writes_and_holes() {
    let mut file = new_file();
    file.write(0, &[7u8; 20]).await.unwrap();
    file.write(5, &[8u8; 3]).await.unwrap();
    file.write(10, &[0u8; 5]).await.unwrap();
    let (data, offsets) = file.into_streams();
    let reopened = SparseFile::reopen(data, offsets).await.unwrap();
    let result = reopened.read(0, 20).await.unwrap();
    let mut expected = vec![7u8; 20];
    expected[5..8].copy_from_slice(&[8, 8, 8]);
    expected[10..15].copy_from_slice(&[0, 0, 0, 0, 0]);
    assert_eq!(result, expected);
}

#[tokio::test]
async fn len_tracks_the_highest_virtual_end_written() {
    let mut file = new_file();
    file.write(0, &[1u8; 5]).await.unwrap();
    file.write(50, &[2u8; 5]).await.unwrap();
    assert_eq!(file.len(), 55);
}

#[tokio::test]
async fn file_stream_append_and_read_at_round_trip_over_real_files() {
    let data_file = tempfile::tempfile().unwrap();
    let offsets_file = tempfile::tempfile().unwrap();
    let mut file = SparseFile::new(FileStream::open(data_file).unwrap(), FileStream::open(offsets_file).unwrap());
    file.write(0, &[5u8; 20]).await.unwrap();
    file.write(8, &[6u8; 4]).await.unwrap();
    let mut expected = vec![5u8; 20];
    expected[8..12].copy_from_slice(&[6, 6, 6, 6]);
    assert_eq!(file.read(0, 20).await.unwrap(), expected);
}

struct FailingAppendStream(VecStream);

#[async_trait::async_trait]
impl ByteStream for FailingAppendStream {
    async fn append(&mut self, _data: &[u8]) -> crate::error::Result<u64> {
        Err(crate::error::SectorVaultError::Other(anyhow::anyhow!("simulated write failure")))
    }

    async fn read_at(&self, offset: u64, length: u64) -> crate::error::Result<Vec<u8>> {
        self.0.read_at(offset, length).await
    }

    fn len(&self) -> u64 {
        self.0.len()
    }
}

#[tokio::test]
async fn reads_of_existing_intervals_survive_a_broken_write() {
    let mut file = SparseFile::new(VecStream::default(), VecStream::default());
    file.write(0, &[3u8; 10]).await.unwrap();

    let (data, offsets) = file.into_streams();
    let mut file = SparseFile::new(FailingAppendStream(data), offsets);
    assert!(file.write(10, &[4u8; 5]).await.is_err());

    // The earlier write is still readable even though `broken` latched.
    assert_eq!(file.read(0, 10).await.unwrap(), vec![3u8; 10]);
    // Further writes keep failing.
    assert!(file.write(20, &[5u8; 5]).await.is_err());
}

#[tokio::test]
async fn reopen_rejects_a_data_stream_shorter_than_the_offsets_log_expects() {
    let mut file = new_file();
    file.write(0, &[1u8; 10]).await.unwrap();
    let (data, offsets) = file.into_streams();

    // Truncate the data stream as if the last write never made it to disk.
    let mut truncated = VecStream::default();
    let full = data.read_at(0, data.len()).await.unwrap();
    truncated.append(&full[..5]).await.unwrap();

    let err = SparseFile::reopen(truncated, offsets).await.unwrap_err();
    assert!(matches!(err, crate::error::SectorVaultError::Corrupted(_)));
}

#[tokio::test]
async fn file_stream_rejects_reads_past_its_current_length() {
    let stream = FileStream::open(tempfile::tempfile().unwrap()).unwrap();
    assert_eq!(stream.len(), 0);
    assert!(stream.read_at(0, 1).await.is_err());
}

/// For any two overlapping writes, the later one wins on the overlap and
/// the earlier one still shows through everywhere else.
#[quickcheck_macros::quickcheck]
fn latest_overlapping_write_wins(a_offset: u8, a_len: u8, b_offset: u8, b_len: u8) -> quickcheck::TestResult {
    if a_len == 0 || b_len == 0 {
        return quickcheck::TestResult::discard();
    }
    let (a_offset, a_len, b_offset, b_len) = (a_offset as u64, a_len as u64, b_offset as u64, b_len as u64);
    let end = (a_offset + a_len).max(b_offset + b_len);

    let result = tokio_test::block_on(async {
        let mut file = new_file();
        file.write(a_offset, &vec![1u8; a_len as usize]).await.unwrap();
        file.write(b_offset, &vec![2u8; b_len as usize]).await.unwrap();
        file.read(0, end).await.unwrap()
    });

    for i in 0..end {
        let expected = if (b_offset..b_offset + b_len).contains(&i) {
            2u8
        } else if (a_offset..a_offset + a_len).contains(&i) {
            1u8
        } else {
            0u8
        };
        if result[i as usize] != expected {
            return quickcheck::TestResult::failed();
        }
    }
    quickcheck::TestResult::passed()
}
