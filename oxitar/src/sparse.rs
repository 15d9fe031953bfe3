//! GNU sparse file reconstruction.
//!
//! Every GNU sparse variant stores a list of data segments; the bytes between
//! them are holes that read back as zeros. The variants differ only in where
//! the segment list lives:
//!
//! - old GNU: in the header (`S` typeflag) and trailing extension blocks
//! - PAX 0.1: in the `GNU.sparse.map` record
//! - PAX 1.0: in a decimal map at the start of the payload
//!
//! PAX 0.0 (one record pair per segment) cannot survive a key/value map and
//! is left unexpanded.

use log::{trace, warn};
use oxitar_core::{Result, SparseSegment, TarError};
use std::collections::{BTreeMap, VecDeque};

const SPARSE_PREFIX: &str = "GNU.sparse.";
const MAJOR: &str = "GNU.sparse.major";
const MINOR: &str = "GNU.sparse.minor";
const MAP: &str = "GNU.sparse.map";
const NAME: &str = "GNU.sparse.name";
const REALSIZE: &str = "GNU.sparse.realsize";
const SIZE: &str = "GNU.sparse.size";
const OFFSET: &str = "GNU.sparse.offset";
const NUMBYTES: &str = "GNU.sparse.numbytes";

/// A zero-filled range of a sparse file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseHole {
    /// Logical offset of the hole.
    pub offset: u64,
    /// Length of the hole.
    pub length: u64,
}

impl SparseHole {
    fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Convert stored data segments into the holes between them.
///
/// Segments must be in increasing offset order. A gap after the last segment
/// up to `real_size` is a trailing hole.
pub fn holes_from_segments(segments: &[SparseSegment], real_size: u64) -> Vec<SparseHole> {
    let mut holes = Vec::new();
    let mut cursor = 0u64;
    for segment in segments {
        if segment.offset > cursor {
            holes.push(SparseHole {
                offset: cursor,
                length: segment.offset - cursor,
            });
        }
        cursor = cursor.max(segment.offset.saturating_add(segment.length));
    }
    if real_size > cursor {
        holes.push(SparseHole {
            offset: cursor,
            length: real_size - cursor,
        });
    }
    holes
}

/// Total stored bytes described by `segments`.
pub fn stored_len(segments: &[SparseSegment]) -> u64 {
    segments.iter().map(|s| s.length).sum()
}

fn bad_map(message: impl Into<String>) -> TarError {
    TarError::invalid_header(0, format!("invalid sparse map: {}", message.into()))
}

fn parse_number(text: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|_| bad_map(format!("{text:?} is not a number")))
}

fn pair_up(numbers: &[u64]) -> Result<Vec<SparseSegment>> {
    if numbers.len() % 2 != 0 {
        return Err(bad_map("odd number of values"));
    }
    let segments: Vec<SparseSegment> = numbers
        .chunks_exact(2)
        .map(|pair| SparseSegment {
            offset: pair[0],
            length: pair[1],
        })
        .collect();
    if segments.windows(2).any(|w| w[1].offset < w[0].offset) {
        return Err(bad_map("segments out of order"));
    }
    Ok(segments)
}

/// Parse a PAX 0.1 `GNU.sparse.map` value: `offset,length,offset,length...`.
pub fn parse_map_01(text: &str) -> Result<Vec<SparseSegment>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let numbers = text
        .split(',')
        .map(parse_number)
        .collect::<Result<Vec<_>>>()?;
    pair_up(&numbers)
}

/// Parse a PAX 1.0 payload map: a segment count then offset/length pairs,
/// one decimal number per line.
///
/// Returns `None` while `data` does not yet hold the complete map.
pub fn parse_map_10(data: &[u8]) -> Result<Option<Vec<SparseSegment>>> {
    let mut lines = data.split(|&b| b == b'\n');
    let mut complete = Vec::new();
    // The final chunk has no newline yet
    let mut pending = lines.next();
    for next in lines {
        if let Some(line) = pending {
            complete.push(line);
        }
        pending = Some(next);
    }

    let Some(count_line) = complete.first() else {
        return Ok(None);
    };
    let count = parse_number(&String::from_utf8_lossy(count_line))?;
    let needed = count
        .checked_mul(2)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| bad_map("segment count overflow"))?;
    if complete.len() - 1 < needed {
        return Ok(None);
    }

    let numbers = complete[1..=needed]
        .iter()
        .map(|line| parse_number(&String::from_utf8_lossy(line)))
        .collect::<Result<Vec<_>>>()?;
    pair_up(&numbers).map(Some)
}

/// Sparse layout announced by PAX records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaxSparse {
    /// Version 0.1: segments in the `GNU.sparse.map` record.
    V01 {
        /// Stored segments.
        segments: Vec<SparseSegment>,
        /// Logical file size.
        real_size: u64,
        /// Real file name, if recorded.
        name: Option<String>,
    },
    /// Version 1.0: segments at the start of the payload.
    V10 {
        /// Logical file size.
        real_size: u64,
        /// Real file name, if recorded.
        name: Option<String>,
    },
}

/// Detect a PAX sparse layout and consume its `GNU.sparse.*` records.
///
/// Unsupported layouts are logged and their records left in place.
pub fn take_pax_sparse(
    extensions: &mut BTreeMap<String, String>,
    stored_size: u64,
) -> Result<Option<PaxSparse>> {
    if !extensions.keys().any(|k| k.starts_with(SPARSE_PREFIX)) {
        return Ok(None);
    }

    let real_size = match extensions.get(REALSIZE).or_else(|| extensions.get(SIZE)) {
        Some(v) => parse_number(v)?,
        None => stored_size,
    };
    let name = extensions.get(NAME).cloned();

    let major = extensions.get(MAJOR).map(String::as_str);
    let minor = extensions.get(MINOR).map(String::as_str);
    let layout = match (major, minor) {
        (Some("1"), Some("0")) => PaxSparse::V10 { real_size, name },
        (Some(major), Some(minor)) => {
            warn!("unsupported GNU sparse version {major}.{minor}, entry left unexpanded");
            return Ok(None);
        }
        _ => match extensions.get(MAP) {
            Some(map) => PaxSparse::V01 {
                segments: parse_map_01(map)?,
                real_size,
                name,
            },
            None => {
                if extensions.contains_key(OFFSET) || extensions.contains_key(NUMBYTES) {
                    warn!("GNU sparse 0.0 is not supported, entry left unexpanded");
                }
                return Ok(None);
            }
        },
    };

    extensions.retain(|k, _| !k.starts_with(SPARSE_PREFIX));
    Ok(Some(layout))
}

/// Read cursor over a sparse file's logical content.
#[derive(Debug, Clone)]
pub struct SparseMap {
    holes: VecDeque<SparseHole>,
    offset: u64,
    remaining: u64,
}

impl SparseMap {
    /// Create a cursor at offset zero over `size` logical bytes.
    pub fn new(holes: Vec<SparseHole>, size: u64) -> Self {
        Self {
            holes: holes.into_iter().filter(|h| h.length > 0).collect(),
            offset: 0,
            remaining: size,
        }
    }

    /// Logical bytes left.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Logical offset of the cursor.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn drop_passed_holes(&mut self) {
        while self.holes.front().is_some_and(|h| h.end() <= self.offset) {
            self.holes.pop_front();
        }
    }

    /// Zero bytes left in the hole under the cursor, if any.
    fn hole_run(&self) -> Option<u64> {
        self.holes
            .front()
            .filter(|h| h.offset <= self.offset)
            .map(|h| h.end() - self.offset)
    }

    /// Stored bytes before the next hole.
    fn data_run(&self) -> u64 {
        self.holes
            .front()
            .map_or(self.remaining, |h| h.offset - self.offset)
    }

    /// Bytes readable without touching the underlying stream beyond
    /// `buffered` already-buffered stored bytes.
    pub fn available(&mut self, buffered: u64) -> u64 {
        self.drop_passed_holes();
        let run = match self.hole_run() {
            Some(zeros) => zeros,
            None => self.data_run().min(buffered),
        };
        run.min(self.remaining)
    }

    /// Fill `buf` with logical content: zeros inside holes, bytes from
    /// `read_stored` elsewhere.
    pub fn read_with<F>(&mut self, buf: &mut [u8], mut read_stored: F) -> Result<usize>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        if buf.is_empty() || self.remaining == 0 {
            return Ok(0);
        }
        self.drop_passed_holes();
        let want = (buf.len() as u64).min(self.remaining);

        let n = match self.hole_run() {
            Some(zeros) => {
                let n = want.min(zeros) as usize;
                trace!("sparse hole: {n} zero bytes at {}", self.offset);
                buf[..n].fill(0);
                n
            }
            None => {
                let limit = want.min(self.data_run()) as usize;
                let n = read_stored(&mut buf[..limit])?;
                if n == 0 {
                    return Err(TarError::unexpected_eof("sparse entry data"));
                }
                n
            }
        };

        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}
