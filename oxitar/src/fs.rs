//! Bridges between filesystem metadata and [`Entry`].

use filetime::FileTime;
use log::debug;
use oxitar_core::{Entry, Result, TarTime};
use std::fs::{self, Metadata};
use std::path::Path;

/// Build an entry from file metadata.
///
/// Size is only carried for regular files. Directory names get a trailing
/// `/`. On Unix the permission bits, owner IDs and device numbers are
/// copied as well.
pub fn entry_from_metadata(name: &str, metadata: &Metadata) -> Entry {
    let file_type = metadata.file_type();
    let mut entry = if file_type.is_dir() {
        if name.ends_with('/') {
            Entry::directory(name)
        } else {
            Entry::directory(format!("{name}/"))
        }
    } else if file_type.is_symlink() {
        Entry::symlink(name, "")
    } else {
        Entry::file(name, metadata.len())
    };

    entry.mtime = Some(TarTime::from(FileTime::from_last_modification_time(metadata)));
    let atime = FileTime::from_last_access_time(metadata);
    if atime.unix_seconds() != 0 {
        entry.atime = Some(TarTime::from(atime));
    }

    #[cfg(unix)]
    unix::fill(&mut entry, metadata);

    entry
}

/// Build an entry for `path`, stored under `name`. Symbolic links are not
/// followed; their target becomes the link name.
pub fn entry_from_path(path: impl AsRef<Path>, name: &str) -> Result<Entry> {
    let path = path.as_ref();
    let metadata = fs::symlink_metadata(path)?;
    let mut entry = entry_from_metadata(name, &metadata);
    if metadata.file_type().is_symlink() {
        entry.linkname = Some(fs::read_link(path)?.to_string_lossy().into_owned());
    }
    debug!("{} -> {:?} ({} bytes)", path.display(), entry.name(), entry.size());
    Ok(entry)
}

/// Set the modification and access times of `path` from `entry`.
///
/// A missing access time falls back to the modification time; an entry
/// without either leaves the file untouched.
pub fn apply_times(path: impl AsRef<Path>, entry: &Entry) -> Result<()> {
    let Some(mtime) = entry.mtime else {
        return Ok(());
    };
    let atime = entry.atime.unwrap_or(mtime);
    filetime::set_file_times(path, atime.to_file_time(), mtime.to_file_time())?;
    Ok(())
}

#[cfg(unix)]
mod unix {
    use super::*;
    use oxitar_core::TypeFlag;
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    pub(super) fn fill(entry: &mut Entry, metadata: &Metadata) {
        let file_type = metadata.file_type();
        let device = if file_type.is_char_device() {
            Some(TypeFlag::CHAR_DEVICE)
        } else if file_type.is_block_device() {
            Some(TypeFlag::BLOCK_DEVICE)
        } else if file_type.is_fifo() {
            Some(TypeFlag::FIFO)
        } else {
            None
        };
        if let Some(typeflag) = device {
            entry.typeflag = typeflag;
            entry.size = Some(0);
            if typeflag != TypeFlag::FIFO {
                let rdev = metadata.rdev();
                entry.devmajor = Some(major(rdev));
                entry.devminor = Some(minor(rdev));
            }
        }

        entry.mode = Some(metadata.mode() & 0o7777);
        entry.uid = Some(u64::from(metadata.uid()));
        entry.gid = Some(u64::from(metadata.gid()));
        entry.ctime = Some(TarTime::new(
            metadata.ctime(),
            u32::try_from(metadata.ctime_nsec()).unwrap_or(0),
        ));
    }

    // glibc dev_t layout
    fn major(dev: u64) -> u32 {
        (((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff)) as u32
    }

    fn minor(dev: u64) -> u32 {
        ((dev & 0xff) | ((dev >> 12) & !0xff)) as u32
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_dev_numbers() {
            // 8:1 (sda1) and 259:3 (nvme partition)
            assert_eq!((major(0x801), minor(0x801)), (8, 1));
            assert_eq!((major(0x10303), minor(0x10303)), (259, 3));
        }
    }
}
