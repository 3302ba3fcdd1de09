// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! In-memory interval index mapping virtual file offsets to physical
//! offsets in the data stream (§4.6). A `BTreeMap`-based port of
//! `original_source/siaform/sparse/llrbindex.go`'s left-leaning
//! red-black tree: Rust's `BTreeMap` gives the same ordered,
//! logarithmic insert/overlap-query behavior without hand-rolling
//! tree balancing.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub virtual_offset: u64,
    pub physical_offset: u64,
    pub length: u64,
}

impl Interval {
    fn virtual_end(&self) -> u64 {
        self.virtual_offset + self.length
    }
}

/// Non-overlapping intervals keyed by their starting virtual offset.
/// Inserting a new interval clips or removes any existing intervals it
/// overlaps, so the map always describes a consistent "latest write
/// wins" view — exactly the overwrite semantics a sparse file needs.
#[derive(Debug, Default)]
pub struct IntervalIndex {
    by_start: BTreeMap<u64, Interval>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, interval: Interval) {
        if interval.length == 0 {
            return;
        }
        self.clip_range(interval.virtual_offset, interval.virtual_end());
        self.by_start.insert(interval.virtual_offset, interval);
    }

    /// Removes whatever is currently covering `[start, start+length)`
    /// without inserting a replacement — used to punch a zero-filled
    /// hole (§4.6's zero-trimming optimization skips storing the zero
    /// bytes; the previously-covered range still must stop reading as
    /// the old data).
    pub fn remove_range(&mut self, start: u64, length: u64) {
        if length == 0 {
            return;
        }
        self.clip_range(start, start + length);
    }

    fn clip_range(&mut self, start: u64, end: u64) {
        // Any interval starting before `start` might still overlap.
        if let Some((&prev_start, &prev)) = self.by_start.range(..start).next_back() {
            if prev.virtual_end() > start {
                self.by_start.remove(&prev_start);
                if prev_start < start {
                    self.by_start.insert(
                        prev_start,
                        Interval {
                            virtual_offset: prev_start,
                            physical_offset: prev.physical_offset,
                            length: start - prev_start,
                        },
                    );
                }
                if prev.virtual_end() > end {
                    let tail_offset = prev.physical_offset + (end - prev_start);
                    self.by_start.insert(
                        end,
                        Interval {
                            virtual_offset: end,
                            physical_offset: tail_offset,
                            length: prev.virtual_end() - end,
                        },
                    );
                }
            }
        }

        // Any interval starting within [start, end) is fully or
        // partially overwritten.
        let overlapping: Vec<u64> = self.by_start.range(start..end).map(|(&k, _)| k).collect();
        for key in overlapping {
            let existing = self.by_start.remove(&key).expect("key came from this map");
            if existing.virtual_end() > end {
                let tail_offset = existing.physical_offset + (end - existing.virtual_offset);
                self.by_start.insert(
                    end,
                    Interval {
                        virtual_offset: end,
                        physical_offset: tail_offset,
                        length: existing.virtual_end() - end,
                    },
                );
            }
        }
    }

    /// Returns the intervals (in virtual-offset order) that overlap
    /// `[offset, offset + length)`, each already clipped to that range.
    pub fn query(&self, offset: u64, length: u64) -> Vec<Interval> {
        let end = offset + length;
        let mut out = Vec::new();
        if let Some((&prev_start, &prev)) = self.by_start.range(..offset).next_back() {
            if prev.virtual_end() > offset {
                let clip_start = offset;
                let clip_end = prev.virtual_end().min(end);
                if clip_end > clip_start {
                    out.push(Interval {
                        virtual_offset: clip_start,
                        physical_offset: prev.physical_offset + (clip_start - prev_start),
                        length: clip_end - clip_start,
                    });
                }
            }
        }
        for (_, interval) in self.by_start.range(offset..end) {
            let clip_end = interval.virtual_end().min(end);
            out.push(Interval {
                virtual_offset: interval.virtual_offset,
                physical_offset: interval.physical_offset,
                length: clip_end - interval.virtual_offset,
            });
        }
        out
    }

    pub fn highest_virtual_end(&self) -> u64 {
        self.by_start
            .values()
            .map(Interval::virtual_end)
            .max()
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.by_start.values()
    }
}
