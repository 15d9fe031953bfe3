//! Streaming archive reader.

use crate::gnu;
use crate::options::ReadOptions;
use crate::pax;
use crate::sparse::{self, PaxSparse, SparseMap};
use log::debug;
use oxitar_core::field::is_zero_block;
use oxitar_core::header::{RawHeader, decode_sparse_extension};
use oxitar_core::{BLOCK_SIZE, Block, Entry, Format, Result, SparseSegment, TarError, TypeFlag};
use std::collections::BTreeMap;
use std::io::{self, BufReader, Read};

/// Round `n` up to a whole number of blocks.
pub(crate) fn padded(n: u64) -> u64 {
    n.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

/// Stored bytes of the current entry still in the stream.
#[derive(Debug, Default, Clone, Copy)]
struct Payload {
    /// Unread payload bytes.
    data: u64,
    /// Unread payload bytes plus block padding.
    record: u64,
}

impl Payload {
    fn new(size: u64) -> Self {
        Self {
            data: size,
            record: padded(size),
        }
    }
}

/// TAR archive reader.
///
/// Entries are produced in stream order by [`next_entry`](Self::next_entry);
/// the payload of the current entry is read through the [`Read`] impl and
/// never crosses into the next header.
///
/// ## Example
///
/// ```rust
/// use oxitar::{TarReader, TarWriter};
/// use std::io::{Cursor, Read};
///
/// let mut writer = TarWriter::new(Vec::new());
/// writer.add_file("hello.txt", b"world").unwrap();
/// let archive = writer.into_inner().unwrap();
///
/// let mut reader = TarReader::new(Cursor::new(archive));
/// let entry = reader.next_entry().unwrap().unwrap();
/// assert_eq!(entry.name(), "hello.txt");
///
/// let mut data = String::new();
/// reader.read_to_string(&mut data).unwrap();
/// assert_eq!(data, "world");
/// assert!(reader.next_entry().unwrap().is_none());
/// ```
pub struct TarReader<R: Read> {
    inner: BufReader<R>,
    options: ReadOptions,
    /// Bytes consumed from the underlying stream.
    position: u64,
    /// Records of every global header seen so far.
    global: BTreeMap<String, String>,
    payload: Payload,
    sparse: Option<SparseMap>,
    finished: bool,
}

/// Continuation state gathered ahead of a real header.
#[derive(Default)]
struct Pending {
    long_name: Option<String>,
    long_link: Option<String>,
    pax: Option<BTreeMap<String, String>>,
}

impl<R: Read> TarReader<R> {
    /// Create a reader with default options.
    pub fn new(reader: R) -> Self {
        let options = ReadOptions::default();
        Self::build(reader, options)
    }

    /// Create a reader with explicit options.
    pub fn with_options(reader: R, options: ReadOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(reader, options))
    }

    fn build(reader: R, options: ReadOptions) -> Self {
        Self {
            inner: BufReader::with_capacity(options.block_size, reader),
            options,
            position: 0,
            global: BTreeMap::new(),
            payload: Payload::default(),
            sparse: None,
            finished: false,
        }
    }

    /// Advance to the next entry, discarding any unread payload of the
    /// current one. Returns `None` at the end of the archive.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.finished {
            return Ok(None);
        }
        self.close_entry()?;

        let mut pending = Pending::default();
        loop {
            let offset = self.position;
            let Some(block) = self.read_header_block()? else {
                self.finished = true;
                return Ok(None);
            };
            let raw = RawHeader::decode(&block).map_err(|e| e.at_offset(offset))?;
            let ustar_family = matches!(raw, RawHeader::Ustar(_) | RawHeader::Schily(_));
            let gnu = matches!(raw, RawHeader::Gnu(_));

            match raw.typeflag() {
                TypeFlag::PAX_GLOBAL if ustar_family => {
                    let data = self.read_extension_data(raw.size())?;
                    let records = pax::parse_records(&data).map_err(|e| e.at_offset(offset))?;
                    debug!("global header at {offset}: {} records", records.len());
                    pax::merge_records(&mut self.global, records);
                }
                TypeFlag::PAX_EXTENDED if ustar_family => {
                    let data = self.read_extension_data(raw.size())?;
                    let records = pax::parse_records(&data).map_err(|e| e.at_offset(offset))?;
                    pending.pax.get_or_insert_with(BTreeMap::new).extend(records);
                }
                TypeFlag::GNU_LONG_NAME if gnu => {
                    let data = self.read_extension_data(raw.size())?;
                    pending.long_name = Some(gnu::decode_long_text(&data));
                }
                TypeFlag::GNU_LONG_LINK if gnu => {
                    let data = self.read_extension_data(raw.size())?;
                    pending.long_link = Some(gnu::decode_long_text(&data));
                }
                _ => {
                    let entry = self
                        .start_entry(raw, pending)
                        .map_err(|e| e.at_offset(offset))?;
                    debug!(
                        "entry {:?} ({} bytes, {}) at {offset}",
                        entry.name(),
                        entry.size(),
                        entry.format()
                    );
                    return Ok(Some(entry));
                }
            }
        }
    }

    /// Build the entry for a real header and position the payload cursor.
    fn start_entry(&mut self, raw: RawHeader, pending: Pending) -> Result<Entry> {
        let ustar_family = matches!(raw, RawHeader::Ustar(_) | RawHeader::Schily(_));
        let old_sparse = match &raw {
            RawHeader::Gnu(h) if h.base.typeflag.is_sparse() => {
                Some((h.sparse.clone(), h.is_extended, h.real_size))
            }
            _ => None,
        };

        let mut entry = raw.into_entry();

        if ustar_family && (pending.pax.is_some() || !self.global.is_empty()) {
            let mut records = self.global.clone();
            if let Some(local) = pending.pax {
                pax::merge_records(&mut records, local);
            }
            let overlay = pax::entry_from_records(&records)?;
            entry.merge(&overlay);
            entry.set_format(Format::Pax);
        }
        if let Some(name) = pending.long_name {
            entry.name = Some(name);
        }
        if let Some(link) = pending.long_link {
            entry.linkname = Some(link);
        }

        let stored = entry.size();
        self.payload = if entry.typeflag.has_payload() {
            Payload::new(stored)
        } else {
            Payload::default()
        };
        self.sparse = None;

        if let Some((mut segments, mut is_extended, real_size)) = old_sparse {
            while is_extended {
                let block = self
                    .read_block()?
                    .ok_or_else(|| TarError::unexpected_eof("sparse extension block"))?;
                let (more, next) = decode_sparse_extension(&block)?;
                segments.extend(more);
                is_extended = next;
            }
            let real_size = real_size.unwrap_or(stored);
            self.begin_sparse(&mut entry, &segments, real_size);
        } else if let Some(layout) = sparse::take_pax_sparse(&mut entry.extensions, stored)? {
            match layout {
                PaxSparse::V01 {
                    segments,
                    real_size,
                    name,
                } => {
                    if let Some(name) = name {
                        entry.name = Some(name);
                    }
                    self.begin_sparse(&mut entry, &segments, real_size);
                }
                PaxSparse::V10 { real_size, name } => {
                    if let Some(name) = name {
                        entry.name = Some(name);
                    }
                    let segments = self.read_sparse_map_10()?;
                    self.begin_sparse(&mut entry, &segments, real_size);
                }
            }
        }

        Ok(entry)
    }

    fn begin_sparse(&mut self, entry: &mut Entry, segments: &[SparseSegment], real_size: u64) {
        let stored = sparse::stored_len(segments);
        if stored != self.payload.data {
            log::warn!(
                "sparse map describes {stored} stored bytes, payload holds {}",
                self.payload.data
            );
        }
        let holes = sparse::holes_from_segments(segments, real_size);
        debug!(
            "sparse entry {:?}: {} segments, {} holes, {real_size} bytes",
            entry.name(),
            segments.len(),
            holes.len()
        );
        entry.size = Some(real_size);
        self.sparse = Some(SparseMap::new(holes, real_size));
    }

    /// Read the decimal map heading a PAX 1.0 sparse payload, block by block.
    fn read_sparse_map_10(&mut self) -> Result<Vec<SparseSegment>> {
        let mut data = Vec::new();
        loop {
            let mut block = [0u8; BLOCK_SIZE];
            let mut filled = 0;
            while filled < BLOCK_SIZE {
                let n = self.read_stored(&mut block[filled..])?;
                if n == 0 {
                    return Err(TarError::unexpected_eof("sparse map"));
                }
                filled += n;
            }
            data.extend_from_slice(&block);
            if let Some(segments) = sparse::parse_map_10(&data)? {
                return Ok(segments);
            }
        }
    }

    /// Read the next header block, handling end-of-archive markers.
    ///
    /// Two zero blocks, or a zero block at the end of the stream, end the
    /// archive. A lone zero block followed by data is an error unless zero
    /// blocks are being ignored.
    fn read_header_block(&mut self) -> Result<Option<Block>> {
        loop {
            let offset = self.position;
            let Some(block) = self.read_block()? else {
                return Ok(None);
            };
            if !is_zero_block(&block) {
                return Ok(Some(block));
            }
            if self.options.ignore_zeros {
                continue;
            }
            return match self.read_block()? {
                None => Ok(None),
                Some(next) if is_zero_block(&next) => Ok(None),
                Some(_) => Err(TarError::UnexpectedZeroBlock { offset }),
            };
        }
    }

    /// Read one whole block. `None` on a clean end of stream.
    fn read_block(&mut self) -> Result<Option<Block>> {
        let mut block = [0u8; BLOCK_SIZE];
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.position += filled as u64;
        match filled {
            0 => Ok(None),
            BLOCK_SIZE => Ok(Some(block)),
            _ => Err(TarError::unexpected_eof("header block")),
        }
    }

    /// Read the payload of an extension entry and its padding.
    fn read_extension_data(&mut self, size: u64) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        (&mut self.inner).take(size).read_to_end(&mut data)?;
        self.position += data.len() as u64;
        if (data.len() as u64) < size {
            return Err(TarError::unexpected_eof("extended header"));
        }
        self.skip_inner(padded(size) - size, "extended header padding")?;
        Ok(data)
    }

    fn skip_inner(&mut self, n: u64, context: &'static str) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())?;
        self.position += skipped;
        if skipped < n {
            return Err(TarError::unexpected_eof(context));
        }
        Ok(())
    }

    /// Read stored payload bytes, bounded by what the entry declares.
    fn read_stored(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = buf.len().min(usize::try_from(self.payload.data).unwrap_or(usize::MAX));
        if limit == 0 {
            return Ok(0);
        }
        let n = loop {
            match self.inner.read(&mut buf[..limit]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if n == 0 {
            return Err(TarError::unexpected_eof("entry payload"));
        }
        self.payload.data -= n as u64;
        self.payload.record -= n as u64;
        self.position += n as u64;
        Ok(n)
    }

    /// Read logical payload bytes of the current entry.
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.sparse.take() {
            Some(mut map) => {
                let result = map.read_with(buf, |b| self.read_stored(b));
                self.sparse = Some(map);
                result
            }
            None => self.read_stored(buf),
        }
    }

    /// Logical payload bytes left in the current entry.
    pub fn remaining(&self) -> u64 {
        match &self.sparse {
            Some(map) => map.remaining(),
            None => self.payload.data,
        }
    }

    /// Bytes readable from the current entry without blocking on the
    /// underlying stream.
    pub fn available(&mut self) -> u64 {
        let buffered = (self.inner.buffer().len() as u64).min(self.payload.data);
        match &mut self.sparse {
            Some(map) => map.available(buffered),
            None => buffered,
        }
    }

    /// Skip up to `n` payload bytes of the current entry.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        if self.sparse.is_none() {
            let n = n.min(self.payload.data);
            self.skip_inner(n, "entry payload")?;
            self.payload.data -= n;
            self.payload.record -= n;
            return Ok(n);
        }
        let mut scratch = [0u8; 8192];
        let mut skipped = 0u64;
        while skipped < n {
            let want = (n - skipped).min(scratch.len() as u64) as usize;
            let got = self.read_payload(&mut scratch[..want])?;
            if got == 0 {
                break;
            }
            skipped += got as u64;
        }
        Ok(skipped)
    }

    /// Discard the rest of the current entry and its padding.
    pub fn close_entry(&mut self) -> Result<()> {
        let rest = self.payload.record;
        self.payload = Payload::default();
        self.sparse = None;
        self.skip_inner(rest, "entry payload")
    }

    /// Read the rest of the current entry.
    pub fn read_entry_data(&mut self) -> Result<Vec<u8>> {
        let hint = usize::try_from(self.remaining()).unwrap_or(0).min(1 << 20);
        let mut data = Vec::with_capacity(hint);
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read_payload(&mut buf)?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&buf[..n]);
        }
    }

    /// Records of the global headers seen so far.
    pub fn global_header(&self) -> &BTreeMap<String, String> {
        &self.global
    }

    /// Offset of the next unread byte in the underlying stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Options in use.
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Return the underlying reader. Buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> Read for TarReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_payload(buf).map_err(io::Error::from)
    }
}
