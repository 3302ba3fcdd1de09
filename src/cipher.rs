// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deterministic, per-sector stream cipher (§4.1).
//!
//! A direct port of `original_source/siaform/crypto/crypto.go`: the key is
//! hashed down to 256 bits with SHA-256 and used to key AES-256 in CTR
//! mode; the nonce is the sector id, little-endian, zero-padded to the
//! block width. Encryption and decryption are the same XOR-stream
//! operation, so `encrypt` and `decrypt` are aliases of each other.

use aes::Aes256;
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use sha2::{Digest, Sha256};

type Aes256Ctr = Ctr128BE<Aes256>;

pub struct SectorCipher {
    key: [u8; 32],
}

impl SectorCipher {
    pub fn new(key: &[u8]) -> Self {
        let digest = Sha256::digest(key);
        SectorCipher { key: digest.into() }
    }

    /// Encrypts `data` in place. `sector_id` seeds the nonce, so reusing a
    /// key across sectors never reuses a keystream.
    pub fn encrypt(&self, sector_id: u64, data: &mut [u8]) {
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&sector_id.to_le_bytes());
        let mut cipher = Aes256Ctr::new((&self.key).into(), (&iv).into());
        cipher.apply_keystream(data);
    }

    /// CTR mode is involutive: decryption is the same transform.
    pub fn decrypt(&self, sector_id: u64, data: &mut [u8]) {
        self.encrypt(sector_id, data);
    }
}
