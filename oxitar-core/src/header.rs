//! Header block layouts.
//!
//! A header block is decoded into exactly one [`RawHeader`] variant, chosen by
//! the magic and version bytes. Each variant carries only the fields its
//! layout defines; extension handling (PAX records, GNU long names, sparse
//! maps) lives a layer above, in the archive crate.

use crate::entry::{Entry, Format, TypeFlag};
use crate::error::{Result, TarError};
use crate::field::{
    self, BLOCK_SIZE, Block, Field, decode_number, decode_string, encode_gnu_number,
    encode_number, encode_string,
};
use crate::time::TarTime;

/// Byte offsets of every header field.
pub mod layout {
    use crate::field::Field;

    /// Entry name.
    pub const NAME: Field = Field::new(0, 100);
    /// Permission bits.
    pub const MODE: Field = Field::new(100, 8);
    /// Owner user ID.
    pub const UID: Field = Field::new(108, 8);
    /// Owner group ID.
    pub const GID: Field = Field::new(116, 8);
    /// Payload size.
    pub const SIZE: Field = Field::new(124, 12);
    /// Modification time.
    pub const MTIME: Field = Field::new(136, 12);
    /// Header checksum.
    pub const CHECKSUM: Field = Field::new(148, 8);
    /// Type flag byte.
    pub const TYPEFLAG: usize = 156;
    /// Link target.
    pub const LINKNAME: Field = Field::new(157, 100);
    /// USTAR magic.
    pub const MAGIC: Field = Field::new(257, 6);
    /// USTAR version.
    pub const VERSION: Field = Field::new(263, 2);
    /// GNU magic, spanning the USTAR magic and version.
    pub const GNU_MAGIC: Field = Field::new(257, 8);
    /// Owner user name.
    pub const UNAME: Field = Field::new(265, 32);
    /// Owner group name.
    pub const GNAME: Field = Field::new(297, 32);
    /// Device major number.
    pub const DEVMAJOR: Field = Field::new(329, 8);
    /// Device minor number.
    pub const DEVMINOR: Field = Field::new(337, 8);
    /// USTAR name prefix.
    pub const PREFIX: Field = Field::new(345, 155);

    /// GNU access time.
    pub const GNU_ATIME: Field = Field::new(345, 12);
    /// GNU status change time.
    pub const GNU_CTIME: Field = Field::new(357, 12);
    /// GNU multi-volume offset.
    pub const GNU_OFFSET: Field = Field::new(369, 12);
    /// GNU sparse map, four entries.
    pub const GNU_SPARSE: Field = Field::new(386, 96);
    /// GNU flag: sparse extension blocks follow.
    pub const GNU_IS_EXTENDED: usize = 482;
    /// GNU logical size of a sparse file.
    pub const GNU_REALSIZE: Field = Field::new(483, 12);
    /// Width of one sparse entry (offset + numbytes).
    pub const SPARSE_ENTRY_LEN: usize = 24;
    /// Sparse entries in the main header.
    pub const SPARSE_HEADER_ENTRIES: usize = 4;
    /// Sparse entries in one extension block.
    pub const SPARSE_EXT_ENTRIES: usize = 21;
    /// Extension block flag: more extension blocks follow.
    pub const SPARSE_EXT_IS_EXTENDED: usize = 504;

    /// Star prefix, shortened to make room for times.
    pub const SCHILY_PREFIX: Field = Field::new(345, 130);
    /// Star access time.
    pub const SCHILY_ATIME: Field = Field::new(476, 12);
    /// Star status change time.
    pub const SCHILY_CTIME: Field = Field::new(488, 12);
    /// Star extended magic.
    pub const SCHILY_XMAGIC: Field = Field::new(508, 4);
}

/// USTAR magic bytes.
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
/// USTAR version bytes.
pub const USTAR_VERSION: &[u8; 2] = b"00";
/// GNU magic and version bytes.
pub const GNU_MAGIC: &[u8; 8] = b"ustar  \0";
/// Star extended magic.
pub const SCHILY_XMAGIC: &[u8; 4] = b"tar\0";

/// Fields shared by every layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct V7Header {
    /// Entry name (or name suffix when a prefix is in use).
    pub name: String,
    /// Permission bits.
    pub mode: Option<u32>,
    /// Owner user ID.
    pub uid: Option<u64>,
    /// Owner group ID.
    pub gid: Option<u64>,
    /// Payload size.
    pub size: Option<u64>,
    /// Modification time in whole seconds.
    pub mtime: Option<i64>,
    /// Stored checksum (decode only).
    pub checksum: Option<u32>,
    /// Type flag.
    pub typeflag: TypeFlag,
    /// Link target.
    pub linkname: String,
}

/// POSIX.1-1988 layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UstarHeader {
    /// Common fields.
    pub base: V7Header,
    /// Owner user name.
    pub uname: String,
    /// Owner group name.
    pub gname: String,
    /// Device major number.
    pub devmajor: Option<u32>,
    /// Device minor number.
    pub devminor: Option<u32>,
    /// Name prefix.
    pub prefix: String,
}

/// One stored data segment of a sparse file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseSegment {
    /// Logical offset of the segment.
    pub offset: u64,
    /// Length of the segment.
    pub length: u64,
}

/// GNU layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GnuHeader {
    /// Common fields.
    pub base: V7Header,
    /// Owner user name.
    pub uname: String,
    /// Owner group name.
    pub gname: String,
    /// Device major number.
    pub devmajor: Option<u32>,
    /// Device minor number.
    pub devminor: Option<u32>,
    /// Access time in whole seconds.
    pub atime: Option<i64>,
    /// Status change time in whole seconds.
    pub ctime: Option<i64>,
    /// Sparse data segments held in the header itself.
    pub sparse: Vec<SparseSegment>,
    /// Whether sparse extension blocks follow.
    pub is_extended: bool,
    /// Logical size of a sparse file.
    pub real_size: Option<u64>,
}

/// A decoded header block, tagged by layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawHeader {
    /// No magic.
    V7(V7Header),
    /// `ustar\0` magic with `00` version.
    Ustar(UstarHeader),
    /// `ustar  \0` magic.
    Gnu(GnuHeader),
    /// Star header; only the USTAR-compatible subset is decoded.
    Schily(UstarHeader),
}

/// Layout selected by the magic bytes of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    V7,
    Ustar,
    Gnu,
    Schily,
}

fn classify(block: &Block) -> Layout {
    if layout::GNU_MAGIC.of(block) == GNU_MAGIC {
        Layout::Gnu
    } else if layout::MAGIC.of(block) == USTAR_MAGIC && layout::VERSION.of(block) == USTAR_VERSION
    {
        if is_schily(block) {
            Layout::Schily
        } else {
            Layout::Ustar
        }
    } else {
        Layout::V7
    }
}

/// Star headers carry an extended magic, or failing that, space-terminated
/// octal atime/ctime where the USTAR prefix would end.
fn is_schily(block: &Block) -> bool {
    if layout::SCHILY_XMAGIC.of(block) == SCHILY_XMAGIC {
        return true;
    }
    let atime = layout::SCHILY_ATIME.of(block);
    let ctime = layout::SCHILY_CTIME.of(block);
    let octal = |b: u8| (b'0'..=b'7').contains(&b);
    block[layout::SCHILY_PREFIX.end()] == b' '
        && octal(atime[0])
        && octal(ctime[0])
        && atime[11] == b' '
        && ctime[11] == b' '
}

impl V7Header {
    fn decode(block: &Block) -> Result<Self> {
        Ok(Self {
            name: decode_string(layout::NAME.of(block)),
            mode: decode_number(layout::MODE.of(block))?,
            uid: decode_number(layout::UID.of(block))?,
            gid: decode_number(layout::GID.of(block))?,
            size: decode_number(layout::SIZE.of(block))?,
            mtime: decode_number(layout::MTIME.of(block))?,
            checksum: decode_number(layout::CHECKSUM.of(block))?,
            typeflag: TypeFlag(block[layout::TYPEFLAG]),
            linkname: decode_string(layout::LINKNAME.of(block)),
        })
    }

    /// Write the common fields. Names are NUL-terminated in the V7 layout
    /// and may fill the whole field in the others.
    fn encode(&self, block: &mut Block, terminated: bool, gnu: bool) -> Result<()> {
        encode_string(&self.name, layout::NAME.of_mut(block), terminated)?;
        let number = if gnu { encode_gnu_number } else { encode_number };
        put(number, self.mode.map(i128::from), layout::MODE, block)?;
        put(number, self.uid.map(i128::from), layout::UID, block)?;
        put(number, self.gid.map(i128::from), layout::GID, block)?;
        put(number, self.size.map(i128::from), layout::SIZE, block)?;
        put(number, self.mtime.map(i128::from), layout::MTIME, block)?;
        block[layout::TYPEFLAG] = self.typeflag.0;
        encode_string(&self.linkname, layout::LINKNAME.of_mut(block), terminated)?;
        Ok(())
    }

    fn into_entry(self, format: Format) -> Entry {
        let mut entry = Entry::default();
        entry.name = Some(self.name);
        entry.mode = self.mode;
        entry.uid = self.uid;
        entry.gid = self.gid;
        entry.size = self.size;
        entry.mtime = self.mtime.map(TarTime::from_secs);
        entry.checksum = self.checksum;
        entry.typeflag = self.typeflag;
        entry.linkname = non_empty(self.linkname);
        entry.set_format(format);
        entry
    }
}

fn put(
    encode: fn(i128, &mut [u8]) -> Result<()>,
    value: Option<i128>,
    field: Field,
    block: &mut Block,
) -> Result<()> {
    match value {
        Some(v) => encode(v, field.of_mut(block)),
        None => Ok(()),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

impl UstarHeader {
    fn decode(block: &Block, prefix: Field) -> Result<Self> {
        Ok(Self {
            base: V7Header::decode(block)?,
            uname: decode_string(layout::UNAME.of(block)),
            gname: decode_string(layout::GNAME.of(block)),
            devmajor: decode_number(layout::DEVMAJOR.of(block))?,
            devminor: decode_number(layout::DEVMINOR.of(block))?,
            prefix: decode_string(prefix.of(block)),
        })
    }

    fn encode(&self, block: &mut Block) -> Result<()> {
        self.base.encode(block, false, false)?;
        layout::MAGIC.of_mut(block).copy_from_slice(USTAR_MAGIC);
        layout::VERSION.of_mut(block).copy_from_slice(USTAR_VERSION);
        encode_string(&self.uname, layout::UNAME.of_mut(block), false)?;
        encode_string(&self.gname, layout::GNAME.of_mut(block), false)?;
        put(encode_number, self.devmajor.map(i128::from), layout::DEVMAJOR, block)?;
        put(encode_number, self.devminor.map(i128::from), layout::DEVMINOR, block)?;
        encode_string(&self.prefix, layout::PREFIX.of_mut(block), false)?;
        Ok(())
    }

    /// Full path: prefix and name joined by `/`.
    pub fn path(&self) -> String {
        if self.prefix.is_empty() {
            self.base.name.clone()
        } else {
            format!("{}/{}", self.prefix, self.base.name)
        }
    }

    fn into_entry(self) -> Entry {
        let name = self.path();
        let mut entry = self.base.into_entry(Format::Ustar);
        entry.name = Some(name);
        entry.uname = non_empty(self.uname);
        entry.gname = non_empty(self.gname);
        entry.devmajor = self.devmajor;
        entry.devminor = self.devminor;
        entry
    }
}

impl GnuHeader {
    fn decode(block: &Block) -> Result<Self> {
        let base = V7Header::decode(block)?;
        let sparse = if base.typeflag.is_sparse() {
            decode_sparse_entries(layout::GNU_SPARSE.of(block))?
        } else {
            Vec::new()
        };
        Ok(Self {
            base,
            uname: decode_string(layout::UNAME.of(block)),
            gname: decode_string(layout::GNAME.of(block)),
            devmajor: decode_number(layout::DEVMAJOR.of(block))?,
            devminor: decode_number(layout::DEVMINOR.of(block))?,
            atime: decode_number(layout::GNU_ATIME.of(block))?,
            ctime: decode_number(layout::GNU_CTIME.of(block))?,
            sparse,
            is_extended: block[layout::GNU_IS_EXTENDED] != 0,
            real_size: decode_number(layout::GNU_REALSIZE.of(block))?,
        })
    }

    fn encode(&self, block: &mut Block) -> Result<()> {
        self.base.encode(block, false, true)?;
        layout::GNU_MAGIC.of_mut(block).copy_from_slice(GNU_MAGIC);
        encode_string(&self.uname, layout::UNAME.of_mut(block), false)?;
        encode_string(&self.gname, layout::GNAME.of_mut(block), false)?;
        put(encode_gnu_number, self.devmajor.map(i128::from), layout::DEVMAJOR, block)?;
        put(encode_gnu_number, self.devminor.map(i128::from), layout::DEVMINOR, block)?;
        put(encode_gnu_number, self.atime.map(i128::from), layout::GNU_ATIME, block)?;
        put(encode_gnu_number, self.ctime.map(i128::from), layout::GNU_CTIME, block)?;
        if self.sparse.len() > layout::SPARSE_HEADER_ENTRIES {
            return Err(TarError::format(format!(
                "{} sparse segments exceed the {} header slots",
                self.sparse.len(),
                layout::SPARSE_HEADER_ENTRIES
            )));
        }
        encode_sparse_entries(&self.sparse, layout::GNU_SPARSE.of_mut(block))?;
        block[layout::GNU_IS_EXTENDED] = u8::from(self.is_extended);
        put(encode_gnu_number, self.real_size.map(i128::from), layout::GNU_REALSIZE, block)?;
        Ok(())
    }

    fn into_entry(self) -> Entry {
        let mut entry = self.base.into_entry(Format::Gnu);
        entry.uname = non_empty(self.uname);
        entry.gname = non_empty(self.gname);
        entry.devmajor = self.devmajor;
        entry.devminor = self.devminor;
        entry.atime = self.atime.map(TarTime::from_secs);
        entry.ctime = self.ctime.map(TarTime::from_secs);
        entry
    }
}

fn decode_sparse_entries(region: &[u8]) -> Result<Vec<SparseSegment>> {
    let mut segments = Vec::new();
    for chunk in region.chunks_exact(layout::SPARSE_ENTRY_LEN) {
        let (offset, length) = chunk.split_at(layout::SPARSE_ENTRY_LEN / 2);
        match (decode_number(offset)?, decode_number(length)?) {
            (Some(offset), Some(length)) => segments.push(SparseSegment { offset, length }),
            _ => break,
        }
    }
    Ok(segments)
}

fn encode_sparse_entries(segments: &[SparseSegment], region: &mut [u8]) -> Result<()> {
    for (segment, chunk) in segments
        .iter()
        .zip(region.chunks_exact_mut(layout::SPARSE_ENTRY_LEN))
    {
        let (offset, length) = chunk.split_at_mut(layout::SPARSE_ENTRY_LEN / 2);
        encode_gnu_number(i128::from(segment.offset), offset)?;
        encode_gnu_number(i128::from(segment.length), length)?;
    }
    Ok(())
}

/// Decode an old GNU sparse extension block.
///
/// Returns the segments it lists and whether another extension block follows.
pub fn decode_sparse_extension(block: &Block) -> Result<(Vec<SparseSegment>, bool)> {
    let region = &block[..layout::SPARSE_EXT_ENTRIES * layout::SPARSE_ENTRY_LEN];
    let segments = decode_sparse_entries(region)?;
    Ok((segments, block[layout::SPARSE_EXT_IS_EXTENDED] != 0))
}

/// Encode an old GNU sparse extension block holding up to 21 segments.
pub fn encode_sparse_extension(segments: &[SparseSegment], is_extended: bool) -> Result<Block> {
    if segments.len() > layout::SPARSE_EXT_ENTRIES {
        return Err(TarError::format(format!(
            "{} sparse segments exceed the {} extension slots",
            segments.len(),
            layout::SPARSE_EXT_ENTRIES
        )));
    }
    let mut block = [0u8; BLOCK_SIZE];
    encode_sparse_entries(
        segments,
        &mut block[..layout::SPARSE_EXT_ENTRIES * layout::SPARSE_ENTRY_LEN],
    )?;
    block[layout::SPARSE_EXT_IS_EXTENDED] = u8::from(is_extended);
    Ok(block)
}

impl RawHeader {
    /// Verify the checksum of `block` and decode it with the layout its
    /// magic selects.
    pub fn decode(block: &Block) -> Result<Self> {
        field::verify_checksum(block)?;
        let header = match classify(block) {
            Layout::V7 => Self::V7(V7Header::decode(block)?),
            Layout::Ustar => Self::Ustar(UstarHeader::decode(block, layout::PREFIX)?),
            Layout::Gnu => Self::Gnu(GnuHeader::decode(block)?),
            Layout::Schily => {
                log::trace!("star header detected, decoding the ustar subset");
                Self::Schily(UstarHeader::decode(block, layout::SCHILY_PREFIX)?)
            }
        };
        Ok(header)
    }

    /// Encode into a fresh block. The checksum is computed last.
    pub fn encode(&self) -> Result<Block> {
        let mut block = [0u8; BLOCK_SIZE];
        match self {
            Self::V7(h) => h.encode(&mut block, true, false)?,
            Self::Ustar(h) => h.encode(&mut block)?,
            Self::Gnu(h) => h.encode(&mut block)?,
            Self::Schily(_) => {
                return Err(TarError::format("star headers are read-only"));
            }
        }
        field::set_checksum(&mut block);
        Ok(block)
    }

    /// Common fields.
    pub fn base(&self) -> &V7Header {
        match self {
            Self::V7(h) => h,
            Self::Ustar(h) | Self::Schily(h) => &h.base,
            Self::Gnu(h) => &h.base,
        }
    }

    /// Type flag.
    pub fn typeflag(&self) -> TypeFlag {
        self.base().typeflag
    }

    /// Declared payload size, zero when unset.
    pub fn size(&self) -> u64 {
        self.base().size.unwrap_or(0)
    }

    /// Format family of the layout.
    pub fn format(&self) -> Format {
        match self {
            Self::V7(_) => Format::V7,
            Self::Ustar(_) | Self::Schily(_) => Format::Ustar,
            Self::Gnu(_) => Format::Gnu,
        }
    }

    /// Convert into the entry model.
    pub fn into_entry(self) -> Entry {
        match self {
            Self::V7(h) => h.into_entry(Format::V7),
            Self::Ustar(h) | Self::Schily(h) => h.into_entry(),
            Self::Gnu(h) => h.into_entry(),
        }
    }
}

/// Split a path into a USTAR `(prefix, name)` pair.
///
/// Names of at most 100 bytes are returned whole with an empty prefix.
/// Otherwise the split is made at the `/` that leaves the longest name of at
/// most 100 bytes, provided the prefix is at most 155 bytes and neither part
/// is empty. Returns `None` when no such split exists.
pub fn split_name(path: &str) -> Option<(&str, &str)> {
    let name_len = layout::NAME.len;
    if path.len() <= name_len {
        return Some(("", path));
    }
    let min_slash = path.len() - name_len - 1;
    let slash = path
        .bytes()
        .enumerate()
        .skip(min_slash.max(1))
        .find(|&(_, b)| b == b'/')
        .map(|(i, _)| i)?;
    if slash > layout::PREFIX.len || slash + 1 == path.len() {
        return None;
    }
    Some((&path[..slash], &path[slash + 1..]))
}
