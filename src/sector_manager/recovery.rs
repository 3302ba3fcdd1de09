// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Reed-Solomon parity generation and reconstruction (§4.3: "a
//! redundancy set tolerates the loss of up to `nparity` sectors").
//! `original_source/siaform/manager/manager.go` only ever kept a single
//! extra "ecc" copy; this crate generalizes that to a full
//! `GF(2^8)` systematic code via `reed-solomon-erasure`.

use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::error::{Result, SectorVaultError};

/// Holds only `nparity`: the data-shard count varies per redundancy set
/// (the final set formed by `UploadAllPending` may be short, per
/// spec.md §4.3's "`ndata'` equal to the remaining count"), so the
/// underlying `ReedSolomon` matrix is built fresh for each call, sized
/// to the shards actually on hand.
pub struct RedundancyCodec {
    nparity: usize,
}

impl RedundancyCodec {
    pub fn new(nparity: usize) -> Result<Self> {
        Ok(RedundancyCodec { nparity })
    }

    /// `None` when either side of the matrix is degenerate: `nparity == 0`
    /// tolerates no losses, and `reed-solomon-erasure` doesn't accept a
    /// zero shard count on either axis.
    fn build(ndata: usize, nparity: usize) -> Result<Option<ReedSolomon>> {
        if nparity == 0 || ndata == 0 {
            return Ok(None);
        }
        Ok(Some(
            ReedSolomon::new(ndata, nparity)
                .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("reed-solomon setup: {e}")))?,
        ))
    }

    /// Computes `nparity` parity sectors from `data_shards.len()` equally
    /// sized data sectors.
    pub fn encode_parity(&self, data_shards: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let ndata = data_shards.len();
        let Some(rs) = Self::build(ndata, self.nparity)? else {
            return Ok(Vec::new());
        };
        let shard_len = data_shards[0].len();
        let mut shards: Vec<Vec<u8>> = data_shards.to_vec();
        shards.extend((0..self.nparity).map(|_| vec![0u8; shard_len]));
        rs.encode(&mut shards)
            .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("reed-solomon encode: {e}")))?;
        Ok(shards.split_off(ndata))
    }

    /// Fills in the `None` slots of `shards` (data followed by parity,
    /// `ndata + nparity` long) given enough surviving shards, where
    /// `ndata` is the number of data sectors in this particular
    /// redundancy set. Errs with [`SectorVaultError::NotEnoughToRecover`]
    /// when too many are missing.
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>], ndata: usize, sector_id_for_error: u64) -> Result<()> {
        let have = shards.iter().filter(|s| s.is_some()).count();
        if have < ndata {
            return Err(SectorVaultError::NotEnoughToRecover {
                sector_id: sector_id_for_error,
                got: have,
                need: ndata,
            });
        }
        let Some(rs) = Self::build(ndata, self.nparity)? else {
            return Ok(());
        };
        rs.reconstruct(shards)
            .map_err(|e| SectorVaultError::Other(anyhow::anyhow!("reed-solomon reconstruct: {e}")))
    }

    pub fn nparity(&self) -> usize {
        self.nparity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_parity_codec_produces_no_shards_and_needs_every_data_shard() {
        let codec = RedundancyCodec::new(0).unwrap();
        assert!(codec.encode_parity(&[vec![9u8; 4]]).unwrap().is_empty());
        let mut shards: Vec<Option<Vec<u8>>> = vec![None];
        assert!(codec.reconstruct(&mut shards, 1, 0).is_err());
        shards[0] = Some(vec![9u8; 4]);
        codec.reconstruct(&mut shards, 1, 0).unwrap();
    }

    #[test]
    fn encode_then_reconstruct_from_any_ndata_survivors() {
        let codec = RedundancyCodec::new(2).unwrap();
        let data = vec![vec![1u8; 8], vec![2u8; 8], vec![3u8; 8]];
        let parity = codec.encode_parity(&data).unwrap();
        assert_eq!(parity.len(), 2);

        let mut shards: Vec<Option<Vec<u8>>> = data
            .iter()
            .cloned()
            .map(Some)
            .chain(parity.iter().cloned().map(Some))
            .collect();
        // Lose two shards total (still exactly ndata=3 survivors).
        shards[0] = None;
        shards[4] = None;
        codec.reconstruct(&mut shards, 3, 0).unwrap();
        assert_eq!(shards[0].as_ref().unwrap(), &data[0]);
    }

    #[test]
    fn too_many_losses_is_an_error() {
        let codec = RedundancyCodec::new(2).unwrap();
        let data = vec![vec![1u8; 8], vec![2u8; 8], vec![3u8; 8]];
        let parity = codec.encode_parity(&data).unwrap();
        let mut shards: Vec<Option<Vec<u8>>> = data
            .iter()
            .cloned()
            .map(Some)
            .chain(parity.iter().cloned().map(Some))
            .collect();
        shards[0] = None;
        shards[1] = None;
        shards[2] = None;
        let err = codec.reconstruct(&mut shards, 3, 42).unwrap_err();
        assert!(matches!(err, SectorVaultError::NotEnoughToRecover { sector_id: 42, .. }));
    }

    #[test]
    fn a_short_final_set_uses_its_own_reduced_ndata() {
        // UploadAllPending's final flush set may have fewer than the
        // configured ndata data sectors (spec.md §4.3's "ndata'").
        let codec = RedundancyCodec::new(4).unwrap();
        let data = vec![vec![7u8; 8]];
        let parity = codec.encode_parity(&data).unwrap();
        assert_eq!(parity.len(), 4);

        let mut shards: Vec<Option<Vec<u8>>> = data
            .iter()
            .cloned()
            .map(Some)
            .chain(parity.iter().cloned().map(Some))
            .collect();
        shards[0] = None;
        shards[1] = None;
        shards[2] = None;
        codec.reconstruct(&mut shards, 1, 0).unwrap();
        assert_eq!(shards[0].as_ref().unwrap(), &data[0]);
    }
}
