// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Weight-bounded and closer-aware LRU caches (§4.8). Both are built on
//! `hashlink::LinkedHashMap`, which already keeps insertion/access order
//! as a doubly linked list over a hash index — exactly the structure
//! `original_source/inmem/weight.go` and `original_source/inmem/closer.go`
//! hand-roll with `container/list` + `map`.

pub mod closer;
pub mod weight;

pub use closer::CloserLru;
pub use weight::WeightLru;
