//! Archive entry metadata.
//!
//! This module defines the [`Entry`] struct that represents one member of a
//! TAR archive, its [`TypeFlag`], and the [`Format`] it is written in.
//!
//! Fields are optional so that "unset" can be told apart from zero: the
//! reader leaves fields empty when the header field was empty, and the PAX
//! layer relies on that to decide what a global header may fill in.

use crate::charset::Charset;
use crate::error::{Result, TarError};
use crate::time::TarTime;
use std::collections::BTreeMap;

/// Permission and mode bits.
pub mod mode {
    /// Set user ID on execution.
    pub const S_ISUID: u32 = 0o4000;
    /// Set group ID on execution.
    pub const S_ISGID: u32 = 0o2000;
    /// Sticky bit.
    pub const S_ISVTX: u32 = 0o1000;
    /// Read by owner.
    pub const S_IRUSR: u32 = 0o400;
    /// Write by owner.
    pub const S_IWUSR: u32 = 0o200;
    /// Execute by owner.
    pub const S_IXUSR: u32 = 0o100;
    /// Read by group.
    pub const S_IRGRP: u32 = 0o040;
    /// Write by group.
    pub const S_IWGRP: u32 = 0o020;
    /// Execute by group.
    pub const S_IXGRP: u32 = 0o010;
    /// Read by others.
    pub const S_IROTH: u32 = 0o004;
    /// Write by others.
    pub const S_IWOTH: u32 = 0o002;
    /// Execute by others.
    pub const S_IXOTH: u32 = 0o001;
    /// All bits a TAR mode field may carry.
    pub const ALL: u32 = 0o7777;
}

/// Header type flag.
///
/// Any byte value is representable so unknown types survive a round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeFlag(pub u8);

impl TypeFlag {
    /// Regular file.
    pub const REGULAR: Self = Self(b'0');
    /// Regular file (pre-POSIX NUL flag).
    pub const REGULAR_OLD: Self = Self(0);
    /// Hard link.
    pub const HARD_LINK: Self = Self(b'1');
    /// Symbolic link.
    pub const SYMLINK: Self = Self(b'2');
    /// Character device.
    pub const CHAR_DEVICE: Self = Self(b'3');
    /// Block device.
    pub const BLOCK_DEVICE: Self = Self(b'4');
    /// Directory.
    pub const DIRECTORY: Self = Self(b'5');
    /// FIFO.
    pub const FIFO: Self = Self(b'6');
    /// Contiguous file.
    pub const CONTIGUOUS: Self = Self(b'7');
    /// PAX extended header for the next entry.
    pub const PAX_EXTENDED: Self = Self(b'x');
    /// PAX global extended header.
    pub const PAX_GLOBAL: Self = Self(b'g');
    /// GNU long name continuation.
    pub const GNU_LONG_NAME: Self = Self(b'L');
    /// GNU long link continuation.
    pub const GNU_LONG_LINK: Self = Self(b'K');
    /// Old GNU sparse file.
    pub const GNU_SPARSE: Self = Self(b'S');
    /// GNU dump directory.
    pub const GNU_DUMPDIR: Self = Self(b'D');
    /// GNU multi-volume continuation.
    pub const GNU_MULTIVOLUME: Self = Self(b'M');
    /// GNU volume header.
    pub const GNU_VOLUME_HEADER: Self = Self(b'V');
    /// Schily inode-only entry.
    pub const SCHILY_INODE: Self = Self(b'I');

    /// Raw byte value.
    pub fn as_byte(&self) -> u8 {
        self.0
    }

    /// Regular file, including the old NUL flag and contiguous files.
    pub fn is_regular_file(&self) -> bool {
        matches!(*self, Self::REGULAR | Self::REGULAR_OLD | Self::CONTIGUOUS)
    }

    /// Hard link.
    pub fn is_hard_link(&self) -> bool {
        *self == Self::HARD_LINK
    }

    /// Symbolic link.
    pub fn is_symlink(&self) -> bool {
        *self == Self::SYMLINK
    }

    /// Directory.
    pub fn is_directory(&self) -> bool {
        *self == Self::DIRECTORY
    }

    /// Old GNU sparse file.
    pub fn is_sparse(&self) -> bool {
        *self == Self::GNU_SPARSE
    }

    /// Whether payload blocks follow a header of this type.
    ///
    /// Links, directories, device nodes and Schily inode entries never carry
    /// payload, whatever their size field says.
    pub fn has_payload(&self) -> bool {
        !matches!(
            *self,
            Self::HARD_LINK
                | Self::SYMLINK
                | Self::DIRECTORY
                | Self::CHAR_DEVICE
                | Self::BLOCK_DEVICE
                | Self::SCHILY_INODE
        )
    }
}

impl Default for TypeFlag {
    fn default() -> Self {
        Self::REGULAR
    }
}

impl From<u8> for TypeFlag {
    fn from(b: u8) -> Self {
        Self(b)
    }
}

/// Header layout an entry is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// Original Unix V7 layout, no magic.
    V7,
    /// POSIX.1-1988 USTAR.
    Ustar,
    /// POSIX.1-2001 PAX: USTAR plus extended header records.
    #[default]
    Pax,
    /// GNU tar layout.
    Gnu,
}

impl Format {
    /// Canonical magic stamp.
    pub fn magic(&self) -> Option<&'static str> {
        match self {
            Self::V7 => None,
            Self::Ustar | Self::Pax => Some("ustar"),
            Self::Gnu => Some("ustar  "),
        }
    }

    /// Canonical version stamp.
    pub fn version(&self) -> Option<&'static str> {
        match self {
            Self::Ustar | Self::Pax => Some("00"),
            Self::V7 | Self::Gnu => None,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::V7 => "v7",
            Self::Ustar => "ustar",
            Self::Pax => "pax",
            Self::Gnu => "gnu",
        };
        f.write_str(name)
    }
}

/// An entry in a TAR archive.
///
/// Created by the caller for writing, or by the reader. Paths always use `/`
/// as separator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entry {
    /// Path within the archive.
    pub name: Option<String>,
    /// Permission bits, within `0..=0o7777`.
    pub mode: Option<u32>,
    /// Owner user ID.
    pub uid: Option<u64>,
    /// Owner group ID.
    pub gid: Option<u64>,
    /// Payload size in bytes.
    pub size: Option<u64>,
    /// Modification time.
    pub mtime: Option<TarTime>,
    /// Access time.
    pub atime: Option<TarTime>,
    /// Status change time.
    pub ctime: Option<TarTime>,
    /// Header checksum (read side only; recomputed on write).
    pub checksum: Option<u32>,
    /// Type flag.
    pub typeflag: TypeFlag,
    /// Link target for hard and symbolic links.
    pub linkname: Option<String>,
    /// Owner user name.
    pub uname: Option<String>,
    /// Owner group name.
    pub gname: Option<String>,
    /// Device major number.
    pub devmajor: Option<u32>,
    /// Device minor number.
    pub devminor: Option<u32>,
    /// Payload character set hint.
    pub charset: Option<Charset>,
    /// Free-text comment.
    pub comment: Option<String>,
    /// Extension records not mapped onto a typed field.
    pub extensions: BTreeMap<String, String>,
    format: Format,
}

impl Entry {
    /// Create an entry with only a name set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Create a regular file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::new(name)
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            typeflag: TypeFlag::DIRECTORY,
            size: Some(0),
            ..Self::new(name)
        }
    }

    /// Create a symbolic link entry.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            typeflag: TypeFlag::SYMLINK,
            size: Some(0),
            linkname: Some(target.into()),
            ..Self::new(name)
        }
    }

    /// Create a hard link entry.
    pub fn hard_link(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            typeflag: TypeFlag::HARD_LINK,
            size: Some(0),
            linkname: Some(target.into()),
            ..Self::new(name)
        }
    }

    /// Set the format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.set_format(format);
        self
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: TarTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Set the mode, failing on bits outside `0o7777`.
    pub fn with_mode(mut self, mode: u32) -> Result<Self> {
        self.set_mode(mode)?;
        Ok(self)
    }

    /// Set owner ids.
    pub fn with_owner(mut self, uid: u64, gid: u64) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    /// Name, or the empty string when unset.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Size, or zero when unset.
    pub fn size(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    /// Link target, or the empty string when unset.
    pub fn linkname(&self) -> &str {
        self.linkname.as_deref().unwrap_or("")
    }

    /// Set the mode, failing on bits outside `0o7777`.
    pub fn set_mode(&mut self, mode: u32) -> Result<()> {
        if mode > mode::ALL {
            return Err(TarError::invalid_argument(format!("invalid mode {mode:o}")));
        }
        self.mode = Some(mode);
        Ok(())
    }

    /// The format tag.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Set the format. This also resets the magic and version stamps.
    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Magic stamp implied by the format.
    pub fn magic(&self) -> Option<&'static str> {
        self.format.magic()
    }

    /// Version stamp implied by the format.
    pub fn version(&self) -> Option<&'static str> {
        self.format.version()
    }

    /// Regular file.
    pub fn is_regular_file(&self) -> bool {
        self.typeflag.is_regular_file()
    }

    /// Hard link.
    pub fn is_hard_link(&self) -> bool {
        self.typeflag.is_hard_link()
    }

    /// Symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.typeflag.is_symlink()
    }

    /// Directory.
    pub fn is_directory(&self) -> bool {
        self.typeflag.is_directory()
    }

    /// Fill fields that are unset on `self` from `defaults`.
    ///
    /// Extension keys already present on `self` win.
    pub fn apply(&mut self, defaults: &Entry) -> &mut Self {
        fill(&mut self.name, &defaults.name);
        fill(&mut self.mode, &defaults.mode);
        fill(&mut self.uid, &defaults.uid);
        fill(&mut self.gid, &defaults.gid);
        fill(&mut self.size, &defaults.size);
        fill(&mut self.mtime, &defaults.mtime);
        fill(&mut self.atime, &defaults.atime);
        fill(&mut self.ctime, &defaults.ctime);
        fill(&mut self.linkname, &defaults.linkname);
        fill(&mut self.uname, &defaults.uname);
        fill(&mut self.gname, &defaults.gname);
        fill(&mut self.devmajor, &defaults.devmajor);
        fill(&mut self.devminor, &defaults.devminor);
        fill(&mut self.charset, &defaults.charset);
        fill(&mut self.comment, &defaults.comment);
        for (key, value) in &defaults.extensions {
            self.extensions
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Overwrite fields of `self` with every field set on `overlay`.
    ///
    /// Extension keys from `overlay` win.
    pub fn merge(&mut self, overlay: &Entry) -> &mut Self {
        replace(&mut self.name, &overlay.name);
        replace(&mut self.mode, &overlay.mode);
        replace(&mut self.uid, &overlay.uid);
        replace(&mut self.gid, &overlay.gid);
        replace(&mut self.size, &overlay.size);
        replace(&mut self.mtime, &overlay.mtime);
        replace(&mut self.atime, &overlay.atime);
        replace(&mut self.ctime, &overlay.ctime);
        replace(&mut self.linkname, &overlay.linkname);
        replace(&mut self.uname, &overlay.uname);
        replace(&mut self.gname, &overlay.gname);
        replace(&mut self.devmajor, &overlay.devmajor);
        replace(&mut self.devminor, &overlay.devminor);
        replace(&mut self.charset, &overlay.charset);
        replace(&mut self.comment, &overlay.comment);
        self.extensions.extend(
            overlay
                .extensions
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, source: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(source);
    }
}

fn replace<T: Clone>(slot: &mut Option<T>, source: &Option<T>) {
    if source.is_some() {
        slot.clone_from(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typeflag_predicates() {
        assert!(TypeFlag::REGULAR.is_regular_file());
        assert!(TypeFlag::REGULAR_OLD.is_regular_file());
        assert!(TypeFlag::CONTIGUOUS.is_regular_file());
        assert!(!TypeFlag::DIRECTORY.is_regular_file());
        assert!(TypeFlag::HARD_LINK.is_hard_link());
        assert!(TypeFlag::SYMLINK.is_symlink());
        assert!(TypeFlag::DIRECTORY.is_directory());

        assert!(TypeFlag::REGULAR.has_payload());
        assert!(TypeFlag::FIFO.has_payload());
        assert!(!TypeFlag::SYMLINK.has_payload());
        assert!(!TypeFlag::SCHILY_INODE.has_payload());

        // Arbitrary bytes are representable
        assert_eq!(TypeFlag::from(b'Z').as_byte(), b'Z');
    }

    #[test]
    fn test_format_stamps() {
        let mut entry = Entry::new("a");
        assert_eq!(entry.format(), Format::Pax);
        assert_eq!(entry.magic(), Some("ustar"));
        assert_eq!(entry.version(), Some("00"));

        entry.set_format(Format::Gnu);
        assert_eq!(entry.magic(), Some("ustar  "));
        assert_eq!(entry.version(), None);

        entry.set_format(Format::V7);
        assert_eq!(entry.magic(), None);
    }

    #[test]
    fn test_set_mode_validates() {
        let mut entry = Entry::new("a");
        entry.set_mode(0o4755).unwrap();
        assert_eq!(entry.mode, Some(0o4755));
        assert!(matches!(
            entry.set_mode(0o10000),
            Err(TarError::InvalidArgument { .. })
        ));
        assert_eq!(entry.mode, Some(0o4755));
    }

    #[test]
    fn test_apply_fills_only_unset() {
        let mut entry = Entry::new("mine");
        entry.uname = Some("bob".to_string());
        entry.extensions.insert("k".into(), "entry".into());

        let mut defaults = Entry::default();
        defaults.name = Some("theirs".into());
        defaults.uname = Some("alice".into());
        defaults.gname = Some("staff".into());
        defaults.extensions.insert("k".into(), "default".into());
        defaults.extensions.insert("other".into(), "1".into());

        entry.apply(&defaults);
        assert_eq!(entry.name(), "mine");
        assert_eq!(entry.uname.as_deref(), Some("bob"));
        assert_eq!(entry.gname.as_deref(), Some("staff"));
        assert_eq!(entry.extensions["k"], "entry");
        assert_eq!(entry.extensions["other"], "1");
    }

    #[test]
    fn test_merge_overwrites_set() {
        let mut entry = Entry::file("short", 10);
        entry.uid = Some(1);
        entry.extensions.insert("k".into(), "entry".into());

        let mut overlay = Entry::default();
        overlay.name = Some("a/much/longer/name".into());
        overlay.size = Some(1 << 40);
        overlay.extensions.insert("k".into(), "overlay".into());

        entry.merge(&overlay);
        assert_eq!(entry.name(), "a/much/longer/name");
        assert_eq!(entry.size(), 1 << 40);
        assert_eq!(entry.uid, Some(1));
        assert_eq!(entry.extensions["k"], "overlay");
    }

    #[test]
    fn test_constructors() {
        let dir = Entry::directory("d/");
        assert!(dir.is_directory());
        assert_eq!(dir.size(), 0);

        let link = Entry::symlink("l", "target");
        assert!(link.is_symlink());
        assert_eq!(link.linkname(), "target");

        let hard = Entry::hard_link("h", "target");
        assert!(hard.is_hard_link());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let mut entry = Entry::file("dir/data.bin", 42)
            .with_format(Format::Gnu)
            .with_mtime(TarTime::new(1_700_000_000, 5));
        entry.charset = Some(Charset::Iso8859_1);
        entry.extensions.insert("SCHILY.xattr.user.k".into(), "v".into());

        let json = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.format(), Format::Gnu);
    }
}
