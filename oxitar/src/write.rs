//! Streaming archive writer.

use crate::gnu;
use crate::options::WriteOptions;
use crate::pax::{self, keys};
use crate::read::padded;
use log::debug;
use oxitar_core::field::max_octal;
use oxitar_core::header::{GnuHeader, RawHeader, UstarHeader, V7Header, layout, split_name};
use oxitar_core::{BLOCK_SIZE, Entry, Format, Result, TarError, TarTime, TypeFlag};
use std::collections::BTreeMap;
use std::io::{self, BufWriter, Write};

/// Largest value of an 8-byte octal field.
const MAX_OCTAL_8: u64 = max_octal(8);
/// Largest value of a 12-byte octal field.
const MAX_OCTAL_12: u64 = max_octal(12);
/// Largest value of an 8-byte base-256 field.
const MAX_GNU_8: u64 = (1 << 56) - 1;

const ZEROS: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Name of global extended headers.
const GLOBAL_HEADER_NAME: &str = "pax_global_header";

/// Payload bookkeeping of the open entry.
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    declared: u64,
    written: u64,
}

/// TAR archive writer.
///
/// Each entry is started with [`put_entry`](Self::put_entry) and its payload
/// written through [`write_payload`](Self::write_payload) or the [`Write`]
/// impl. Unwritten payload is zero-filled when the next entry starts or the
/// archive is finished.
///
/// ## Example
///
/// ```rust
/// use oxitar::TarWriter;
/// use oxitar::prelude::*;
///
/// let mut writer = TarWriter::new(Vec::new());
/// writer.add_directory("docs").unwrap();
///
/// let mut entry = Entry::file("docs/readme.txt", 5).with_format(Format::Gnu);
/// entry.uname = Some("alice".into());
/// writer.put_entry(&entry).unwrap();
/// writer.write_payload(b"hello").unwrap();
///
/// let archive = writer.into_inner().unwrap();
/// assert_eq!(archive.len(), 512 * 5);
/// ```
pub struct TarWriter<W: Write> {
    inner: Option<BufWriter<W>>,
    open: Option<OpenEntry>,
    /// Records of every global header written so far.
    global: BTreeMap<String, String>,
    finished: bool,
}

impl<W: Write> TarWriter<W> {
    /// Create a writer with default options.
    pub fn new(writer: W) -> Self {
        Self::build(writer, WriteOptions::default())
    }

    /// Create a writer with explicit options.
    pub fn with_options(writer: W, options: WriteOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(writer, options))
    }

    fn build(writer: W, options: WriteOptions) -> Self {
        Self {
            inner: Some(BufWriter::with_capacity(options.block_size, writer)),
            open: None,
            global: BTreeMap::new(),
            finished: false,
        }
    }

    fn sink(&mut self) -> Result<&mut BufWriter<W>> {
        if self.finished {
            return Err(TarError::Closed);
        }
        self.inner.as_mut().ok_or(TarError::Closed)
    }

    /// Start a new entry, closing the current one first.
    ///
    /// The entry is validated against its format before anything is written;
    /// fields too wide for a PAX header move into an extended header, and
    /// GNU names and links too long for their field get continuation
    /// entries.
    pub fn put_entry(&mut self, entry: &Entry) -> Result<()> {
        self.sink()?;
        self.close_entry()?;

        let entry = normalize(entry);
        validate(&entry)?;
        let bytes = match entry.format() {
            Format::V7 => RawHeader::V7(base_header(&entry, entry.name(), entry.linkname()))
                .encode()?
                .to_vec(),
            Format::Ustar => ustar_blocks(&entry)?,
            Format::Pax => self.pax_blocks(&entry)?,
            Format::Gnu => gnu_blocks(&entry)?,
        };
        debug!(
            "writing {:?} ({} bytes, {}): {} header bytes",
            entry.name(),
            entry.size(),
            entry.format(),
            bytes.len()
        );

        self.sink()?.write_all(&bytes)?;
        let declared = if entry.typeflag.has_payload() {
            entry.size()
        } else {
            0
        };
        self.open = Some(OpenEntry {
            declared,
            written: 0,
        });
        Ok(())
    }

    /// Write a global extended header. Its records apply to every later
    /// entry read from the archive; an empty value cancels a key.
    pub fn put_global_header(&mut self, records: &BTreeMap<String, String>) -> Result<()> {
        self.sink()?;
        self.close_entry()?;

        let data = pax::encode_records(records.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let header = extension_header(GLOBAL_HEADER_NAME, TypeFlag::PAX_GLOBAL, data.len())?;
        let mut bytes = header.encode()?.to_vec();
        bytes.extend_from_slice(&data);
        bytes.resize(padded(bytes.len() as u64) as usize, 0);

        self.sink()?.write_all(&bytes)?;
        pax::merge_records(&mut self.global, records.clone());
        debug!("global header: {} records", records.len());
        Ok(())
    }

    /// Build the extended header (if any) and the real header of a PAX entry.
    fn pax_blocks(&self, entry: &Entry) -> Result<Vec<u8>> {
        let name = entry.name();
        let linkname = entry.linkname();
        let size = entry.size();
        let uid = entry.uid.unwrap_or(0);
        let gid = entry.gid.unwrap_or(0);
        let mtime = entry.mtime.unwrap_or_default();
        let in_global = |key: &str| self.global.contains_key(key);

        let mut records: Vec<(&str, String)> = Vec::new();
        let split = if name.is_ascii() {
            split_name(name)
        } else {
            None
        };
        if split.is_none() || in_global(keys::PATH) {
            records.push((keys::PATH, name.to_string()));
        }
        if uid > MAX_OCTAL_8 || (entry.uid.is_some() && in_global(keys::UID)) {
            records.push((keys::UID, uid.to_string()));
        }
        if gid > MAX_OCTAL_8 || (entry.gid.is_some() && in_global(keys::GID)) {
            records.push((keys::GID, gid.to_string()));
        }
        if size > MAX_OCTAL_12 || in_global(keys::SIZE) {
            records.push((keys::SIZE, size.to_string()));
        }
        let mtime_fits =
            mtime.secs() >= 0 && mtime.secs() as u64 <= MAX_OCTAL_12 && mtime.nanos() == 0;
        if !mtime_fits || (entry.mtime.is_some() && in_global(keys::MTIME)) {
            records.push((keys::MTIME, mtime.to_pax_string()));
        }
        if let Some(atime) = entry.atime {
            records.push((keys::ATIME, atime.to_pax_string()));
        }
        if let Some(ctime) = entry.ctime {
            records.push((keys::CTIME, ctime.to_pax_string()));
        }
        let link_fits = linkname.len() <= layout::LINKNAME.len && linkname.is_ascii();
        if !link_fits || (entry.linkname.is_some() && in_global(keys::LINKPATH)) {
            records.push((keys::LINKPATH, linkname.to_string()));
        }
        let uname = entry.uname.as_deref().unwrap_or("");
        if !fits_name_field(uname) || (entry.uname.is_some() && in_global(keys::UNAME)) {
            records.push((keys::UNAME, uname.to_string()));
        }
        let gname = entry.gname.as_deref().unwrap_or("");
        if !fits_name_field(gname) || (entry.gname.is_some() && in_global(keys::GNAME)) {
            records.push((keys::GNAME, gname.to_string()));
        }
        if let Some(charset) = entry.charset {
            records.push((keys::CHARSET, charset.pax_name().to_string()));
        }
        if let Some(comment) = &entry.comment {
            records.push((keys::COMMENT, comment.clone()));
        }
        for (key, value) in &entry.extensions {
            if keys::RESERVED.contains(&key.as_str()) {
                debug!("extension {key:?} shadows a typed field, skipped");
                continue;
            }
            records.push((key.as_str(), value.clone()));
        }

        let (prefix, short_name) = match split {
            Some((prefix, short)) => (prefix.to_string(), short.to_string()),
            None => placeholder_path(name),
        };
        let mut base = base_header(entry, &short_name, "");
        base.uid = Some(uid.min(MAX_OCTAL_8));
        base.gid = Some(gid.min(MAX_OCTAL_8));
        base.size = Some(size.min(MAX_OCTAL_12));
        base.mtime = Some(mtime.secs().clamp(0, MAX_OCTAL_12 as i64));
        base.linkname = if link_fits {
            linkname.to_string()
        } else {
            gnu::placeholder(linkname, layout::LINKNAME.len)
        };
        let header = RawHeader::Ustar(UstarHeader {
            base,
            uname: gnu::placeholder(uname, layout::UNAME.len),
            gname: gnu::placeholder(gname, layout::GNAME.len),
            devmajor: entry.devmajor,
            devminor: entry.devminor,
            prefix,
        });

        let mut bytes = Vec::new();
        if !records.is_empty() {
            debug!(
                "extended header for {name:?}: {:?}",
                records.iter().map(|(k, _)| *k).collect::<Vec<_>>()
            );
            let data = pax::encode_records(records.iter().map(|(k, v)| (*k, v.as_str())));
            let xheader =
                extension_header(&pax_header_name(name), TypeFlag::PAX_EXTENDED, data.len())?;
            bytes.extend_from_slice(&xheader.encode()?);
            bytes.extend_from_slice(&data);
            bytes.resize(padded(bytes.len() as u64) as usize, 0);
        }
        bytes.extend_from_slice(&header.encode()?);
        Ok(bytes)
    }

    /// Write payload bytes of the open entry.
    pub fn write_payload(&mut self, data: &[u8]) -> Result<()> {
        self.sink()?;
        let open = self.open.as_ref().ok_or(TarError::NoEntry)?;
        let attempted = open.written + data.len() as u64;
        if attempted > open.declared {
            return Err(TarError::size(open.declared, attempted));
        }
        self.sink()?.write_all(data)?;
        // Counted only once the sink took the bytes
        if let Some(open) = self.open.as_mut() {
            open.written = attempted;
        }
        Ok(())
    }

    /// Close the open entry, zero-filling unwritten payload and padding.
    pub fn close_entry(&mut self) -> Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let fill = padded(open.declared) - open.written;
        self.write_zeros(fill)
    }

    fn write_zeros(&mut self, mut n: u64) -> Result<()> {
        let sink = self.sink()?;
        while n > 0 {
            let chunk = n.min(BLOCK_SIZE as u64) as usize;
            sink.write_all(&ZEROS[..chunk])?;
            n -= chunk as u64;
        }
        Ok(())
    }

    /// Add a regular file.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add_file_with_mode(name, data, 0o644)
    }

    /// Add a regular file with a specific mode.
    pub fn add_file_with_mode(&mut self, name: &str, data: &[u8], mode: u32) -> Result<()> {
        let entry = Entry::file(name, data.len() as u64).with_mode(mode)?;
        self.put_entry(&entry)?;
        self.write_payload(data)?;
        self.close_entry()
    }

    /// Add a directory. A trailing `/` is appended if missing.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        self.add_directory_with_mode(name, 0o755)
    }

    /// Add a directory with a specific mode.
    pub fn add_directory_with_mode(&mut self, name: &str, mode: u32) -> Result<()> {
        let dir_name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        let entry = Entry::directory(dir_name).with_mode(mode)?;
        self.put_entry(&entry)
    }

    /// Add a symbolic link.
    pub fn add_symlink(&mut self, name: &str, target: &str) -> Result<()> {
        let entry = Entry::symlink(name, target).with_mode(0o777)?;
        self.put_entry(&entry)
    }

    /// Finish the archive: close the open entry and write the two zero
    /// end-of-archive blocks. Further calls do nothing.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.close_entry()?;
        self.write_zeros(2 * BLOCK_SIZE as u64)?;
        self.sink()?.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Finish the archive and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        let inner = self.inner.take().ok_or(TarError::Closed)?;
        inner.into_inner().map_err(|e| TarError::Io(e.into_error()))
    }
}

impl<W: Write> Write for TarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_payload(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for TarWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !self.finished {
            let _ = self.finish();
        }
    }
}

/// Fill mode and size defaults and clear sizes of types without payload.
fn normalize(entry: &Entry) -> Entry {
    let mut entry = entry.clone();
    if matches!(
        entry.typeflag,
        TypeFlag::CHAR_DEVICE | TypeFlag::BLOCK_DEVICE | TypeFlag::DIRECTORY | TypeFlag::FIFO
    ) {
        entry.size = Some(0);
    }
    // Owner and mtime stay unset; their header fields fall back to zero.
    let mut defaults = Entry::default();
    defaults.mode = Some(if entry.is_directory() { 0o755 } else { 0o644 });
    defaults.size = Some(0);
    entry.apply(&defaults);
    entry
}

fn format_error(entry: &Entry, message: impl std::fmt::Display) -> TarError {
    TarError::format(format!("{} entry {:?}: {message}", entry.format(), entry.name()))
}

fn fits_name_field(text: &str) -> bool {
    text.len() <= layout::UNAME.len && text.is_ascii()
}

/// Check an entry against the hard limits of its format.
fn validate(entry: &Entry) -> Result<()> {
    let name = entry.name();
    let linkname = entry.linkname();
    let size = entry.size();
    let uid = entry.uid.unwrap_or(0);
    let gid = entry.gid.unwrap_or(0);
    let mtime = entry.mtime.unwrap_or_default().secs();

    if name.is_empty() {
        return Err(format_error(entry, "empty name"));
    }
    if let Some(mode) = entry.mode {
        if mode > 0o7777 {
            return Err(format_error(entry, format_args!("invalid mode {mode:o}")));
        }
    }
    if (entry.is_hard_link() || entry.is_symlink()) && size != 0 {
        return Err(format_error(entry, "links must have size 0"));
    }

    let octal_numbers = |entry: &Entry| -> Result<()> {
        if uid > MAX_OCTAL_8 || gid > MAX_OCTAL_8 {
            return Err(format_error(entry, "uid/gid exceed 7 octal digits"));
        }
        if size > MAX_OCTAL_12 {
            return Err(format_error(entry, "size exceeds 11 octal digits"));
        }
        if mtime < 0 || mtime as u64 > MAX_OCTAL_12 {
            return Err(format_error(entry, "mtime outside the octal range"));
        }
        Ok(())
    };
    let devices = |entry: &Entry| -> Result<()> {
        let too_big = |d: Option<u32>| d.is_some_and(|d| u64::from(d) > MAX_OCTAL_8);
        if too_big(entry.devmajor) || too_big(entry.devminor) {
            return Err(format_error(entry, "device numbers exceed 7 octal digits"));
        }
        Ok(())
    };

    match entry.format() {
        Format::V7 => {
            if !matches!(
                entry.typeflag,
                TypeFlag::REGULAR | TypeFlag::REGULAR_OLD | TypeFlag::HARD_LINK | TypeFlag::SYMLINK
            ) {
                return Err(format_error(
                    entry,
                    format_args!("type {:?} not representable", entry.typeflag.0 as char),
                ));
            }
            if name.len() >= layout::NAME.len || !name.is_ascii() {
                return Err(format_error(entry, "name exceeds 99 ASCII bytes"));
            }
            if linkname.len() >= layout::LINKNAME.len || !linkname.is_ascii() {
                return Err(format_error(entry, "link name exceeds 99 ASCII bytes"));
            }
            octal_numbers(entry)?;
        }
        Format::Ustar => {
            if !name.is_ascii() || split_name(name).is_none() {
                return Err(format_error(entry, "name cannot be split into prefix and name"));
            }
            if linkname.len() > layout::LINKNAME.len || !linkname.is_ascii() {
                return Err(format_error(entry, "link name exceeds 100 ASCII bytes"));
            }
            for owner in [&entry.uname, &entry.gname].into_iter().flatten() {
                if !fits_name_field(owner) {
                    return Err(format_error(entry, "owner name exceeds 32 ASCII bytes"));
                }
            }
            octal_numbers(entry)?;
            devices(entry)?;
        }
        Format::Pax => devices(entry)?,
        Format::Gnu => {
            for owner in [&entry.uname, &entry.gname].into_iter().flatten() {
                if !fits_name_field(owner) {
                    return Err(format_error(entry, "owner name exceeds 32 ASCII bytes"));
                }
            }
            if uid > MAX_GNU_8 || gid > MAX_GNU_8 {
                return Err(format_error(entry, "uid/gid exceed the base-256 range"));
            }
        }
    }
    Ok(())
}

/// Common header fields of `entry` under the given name and link.
fn base_header(entry: &Entry, name: &str, linkname: &str) -> V7Header {
    V7Header {
        name: name.to_string(),
        mode: entry.mode,
        uid: Some(entry.uid.unwrap_or(0)),
        gid: Some(entry.gid.unwrap_or(0)),
        size: Some(entry.size()),
        mtime: Some(entry.mtime.unwrap_or_default().secs()),
        checksum: None,
        typeflag: entry.typeflag,
        linkname: linkname.to_string(),
    }
}

fn ustar_blocks(entry: &Entry) -> Result<Vec<u8>> {
    let (prefix, name) = split_name(entry.name())
        .ok_or_else(|| format_error(entry, "name cannot be split into prefix and name"))?;
    let header = RawHeader::Ustar(UstarHeader {
        base: base_header(entry, name, entry.linkname()),
        uname: entry.uname.clone().unwrap_or_default(),
        gname: entry.gname.clone().unwrap_or_default(),
        devmajor: entry.devmajor,
        devminor: entry.devminor,
        prefix: prefix.to_string(),
    });
    Ok(header.encode()?.to_vec())
}

fn gnu_blocks(entry: &Entry) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut push_long = |typeflag: TypeFlag, text: &str| -> Result<String> {
        if !gnu::needs_long_entry(text) {
            return Ok(text.to_string());
        }
        let (block, data) = gnu::long_entry(typeflag, text)?;
        bytes.extend_from_slice(&block);
        bytes.extend_from_slice(&data);
        bytes.resize(padded(bytes.len() as u64) as usize, 0);
        Ok(gnu::placeholder(text, layout::NAME.len))
    };
    let name = push_long(TypeFlag::GNU_LONG_NAME, entry.name())?;
    let linkname = push_long(TypeFlag::GNU_LONG_LINK, entry.linkname())?;

    let header = RawHeader::Gnu(GnuHeader {
        base: base_header(entry, &name, &linkname),
        uname: entry.uname.clone().unwrap_or_default(),
        gname: entry.gname.clone().unwrap_or_default(),
        devmajor: entry.devmajor,
        devminor: entry.devminor,
        atime: entry.atime.map(|t| t.secs()),
        ctime: entry.ctime.map(|t| t.secs()),
        ..GnuHeader::default()
    });
    bytes.extend_from_slice(&header.encode()?);
    Ok(bytes)
}

/// Header of a `x` or `g` entry holding `size` bytes of records.
fn extension_header(name: &str, typeflag: TypeFlag, size: usize) -> Result<RawHeader> {
    Ok(RawHeader::Ustar(UstarHeader {
        base: V7Header {
            name: gnu::placeholder(name, layout::NAME.len),
            mode: Some(0o444),
            uid: Some(0),
            gid: Some(0),
            size: Some(size as u64),
            mtime: Some(TarTime::now().secs().clamp(0, MAX_OCTAL_12 as i64)),
            checksum: None,
            typeflag,
            linkname: String::new(),
        },
        uname: "root".to_string(),
        gname: "root".to_string(),
        devmajor: Some(0),
        devminor: Some(0),
        prefix: String::new(),
    }))
}

/// `dir/PaxHeaders/base` for an entry path.
fn pax_header_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let (dir, base) = trimmed.rsplit_once('/').unwrap_or((".", trimmed));
    let dir = if dir.is_empty() { "." } else { dir };
    let full = gnu::placeholder(&format!("{dir}/PaxHeaders/{base}"), usize::MAX);
    match split_name(&full) {
        Some(("", name)) => name.to_string(),
        _ => full[full.len().saturating_sub(layout::NAME.len)..].to_string(),
    }
}

/// Best-effort `(prefix, name)` for a path that needs an extended header.
fn placeholder_path(path: &str) -> (String, String) {
    let ascii = gnu::placeholder(path, usize::MAX);
    if let Some((prefix, name)) = split_name(&ascii) {
        return (prefix.to_string(), name.to_string());
    }
    let tail = &ascii[ascii.len().saturating_sub(layout::NAME.len)..];
    (String::new(), tail.to_string())
}
