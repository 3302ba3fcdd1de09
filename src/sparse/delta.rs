// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Delta-varint encoding for the offsets log (§4.6). Each record stores
//! its virtual (and, for writes, physical) offset as a signed (zigzag)
//! delta from the previous record of the same stream, rather than the
//! raw 8-byte values `original_source/siaform/sparse/sparse.go` used,
//! since consecutive writes usually land close together in both
//! streams. A one-byte tag distinguishes an actual write from a
//! zero-trimmed hole punch, so reopening a sparse file from its two
//! streams reproduces holes exactly, not just writes.

use integer_encoding::VarInt;

use super::index::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEntry {
    Write(Interval),
    Hole { virtual_offset: u64, length: u64 },
}

const TAG_WRITE: u8 = 0;
const TAG_HOLE: u8 = 1;

pub fn encode_log(entries: &[LogEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut prev_virtual: i64 = 0;
    let mut prev_physical: i64 = 0;
    for entry in entries {
        match entry {
            LogEntry::Write(interval) => {
                buf.push(TAG_WRITE);
                push_varint(&mut buf, interval.virtual_offset as i64 - prev_virtual);
                push_varint(&mut buf, interval.physical_offset as i64 - prev_physical);
                push_varint(&mut buf, interval.length as i64);
                prev_virtual = interval.virtual_offset as i64;
                prev_physical = interval.physical_offset as i64;
            }
            LogEntry::Hole { virtual_offset, length } => {
                buf.push(TAG_HOLE);
                push_varint(&mut buf, *virtual_offset as i64 - prev_virtual);
                push_varint(&mut buf, *length as i64);
                prev_virtual = *virtual_offset as i64;
            }
        }
    }
    buf
}

fn push_varint(buf: &mut Vec<u8>, value: i64) {
    let mut tmp = [0u8; 10];
    let written = value.encode_var(&mut tmp);
    buf.extend_from_slice(&tmp[..written]);
}

/// Parses the whole delta-encoded log back into absolute entries.
/// Panics on truncated/corrupt input — the offsets log is never
/// partially written by `sparse::mod`, which always appends whole
/// records.
pub fn decode_log(mut data: &[u8]) -> Vec<LogEntry> {
    let mut out = Vec::new();
    let mut prev_virtual: i64 = 0;
    let mut prev_physical: i64 = 0;
    while !data.is_empty() {
        let tag = data[0];
        data = &data[1..];
        match tag {
            TAG_WRITE => {
                let (dv, n) = i64::decode_var(data).expect("corrupt offsets log: virtual delta");
                data = &data[n..];
                let (dp, n) = i64::decode_var(data).expect("corrupt offsets log: physical delta");
                data = &data[n..];
                let (len, n) = i64::decode_var(data).expect("corrupt offsets log: length");
                data = &data[n..];
                prev_virtual += dv;
                prev_physical += dp;
                out.push(LogEntry::Write(Interval {
                    virtual_offset: prev_virtual as u64,
                    physical_offset: prev_physical as u64,
                    length: len as u64,
                }));
            }
            TAG_HOLE => {
                let (dv, n) = i64::decode_var(data).expect("corrupt offsets log: virtual delta");
                data = &data[n..];
                let (len, n) = i64::decode_var(data).expect("corrupt offsets log: length");
                data = &data[n..];
                prev_virtual += dv;
                out.push(LogEntry::Hole {
                    virtual_offset: prev_virtual as u64,
                    length: len as u64,
                });
            }
            other => panic!("corrupt offsets log: unknown tag {other}"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_mix_of_writes_and_holes() {
        let entries = vec![
            LogEntry::Write(Interval { virtual_offset: 0, physical_offset: 0, length: 100 }),
            LogEntry::Hole { virtual_offset: 100, length: 50 },
            LogEntry::Write(Interval { virtual_offset: 150, physical_offset: 100, length: 20 }),
        ];
        let encoded = encode_log(&entries);
        assert_eq!(decode_log(&encoded), entries);
    }

    #[test]
    fn empty_log_round_trips() {
        assert_eq!(decode_log(&encode_log(&[])), vec![]);
    }
}
