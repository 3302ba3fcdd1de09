// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Durable, encrypted, seekable byte-addressable file store over
//! untrusted sector-storage providers.
//!
//! The engine is layered bottom-up:
//! - [`sector_manager`] splits the world into fixed-size, encrypted,
//!   Reed-Solomon-protected sectors spread across remote providers.
//! - [`file_store`] and [`kv_packer`] pack named files and key/value
//!   entries into those sectors.
//! - [`sparse`] and [`chunk_appender`] give byte-addressable, overlay and
//!   append-only views respectively, independent of the sector layer.
//!
//! This crate never initializes a global `tracing` subscriber itself;
//! call [`init_tracing`] from a binary that embeds it.

pub mod backend;
pub mod cache;
pub mod chunk_appender;
pub mod cipher;
pub mod config;
pub mod error;
pub mod file_store;
pub mod gzip;
pub mod kv_packer;
pub mod lru;
pub mod sector_manager;
pub mod sparse;

pub use config::EngineConfig;
pub use error::{Result, SectorVaultError};
pub use sector_manager::SectorManager;

/// Wires `tracing-subscriber`'s `EnvFilter` plus a JSON formatter, the
/// convention embedding binaries in this codebase follow. Defaults to
/// `info` when `RUST_LOG` is unset.
pub fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .with_target(true)
        .init();
    Ok(())
}
