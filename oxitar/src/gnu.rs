//! GNU long-name and long-link continuation entries.
//!
//! A `L` (or `K`) entry carries the full name (or link target) of the next
//! header as its payload. The real header keeps a truncated copy in its
//! fixed-width field.

use oxitar_core::header::{GnuHeader, RawHeader, V7Header};
use oxitar_core::{Block, Result, TarTime, TypeFlag};

/// Name prefix of continuation entries.
pub const LONG_LINK_NAME: &str = "././@LongLink";

/// Whether `text` needs a continuation entry to be stored in a GNU header.
pub fn needs_long_entry(text: &str) -> bool {
    text.len() > 100 || !text.is_ascii()
}

/// Replace non-ASCII characters and truncate to `max` bytes.
///
/// Used for the fixed-width fields behind a continuation entry or an
/// extended header, which only old readers look at.
pub fn placeholder(text: &str, max: usize) -> String {
    text.chars()
        .map(|c| if c.is_ascii() && c != '\0' { c } else { '_' })
        .take(max)
        .collect()
}

/// Build the header of a `L`/`K` entry and its payload (text plus NUL).
pub fn long_entry(typeflag: TypeFlag, text: &str) -> Result<(Block, Vec<u8>)> {
    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    payload.push(0);

    let base_name = text.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    let name = placeholder(&format!("{LONG_LINK_NAME}/{base_name}"), 100);

    let header = RawHeader::Gnu(GnuHeader {
        base: V7Header {
            name,
            mode: Some(0o444),
            uid: Some(0),
            gid: Some(0),
            size: Some(payload.len() as u64),
            mtime: Some(TarTime::now().secs().max(0)),
            checksum: None,
            typeflag,
            linkname: String::new(),
        },
        uname: "root".to_string(),
        gname: "root".to_string(),
        devmajor: Some(0),
        devminor: Some(0),
        ..GnuHeader::default()
    });
    Ok((header.encode()?, payload))
}

/// Decode a continuation payload: text up to the first NUL.
pub fn decode_long_text(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_long_entry() {
        assert!(!needs_long_entry(&"a".repeat(100)));
        assert!(needs_long_entry(&"a".repeat(101)));
        assert!(needs_long_entry("caf\u{e9}"));
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(placeholder("caf\u{e9}/na\u{ef}ve", 100), "caf_/na_ve");
        assert_eq!(placeholder(&"x".repeat(150), 100).len(), 100);
    }

    #[test]
    fn test_long_entry_header() {
        let name = format!("{}/file.txt", "deep".repeat(40));
        let (block, payload) = long_entry(TypeFlag::GNU_LONG_NAME, &name).unwrap();
        assert_eq!(payload.len(), name.len() + 1);
        assert_eq!(*payload.last().unwrap(), 0);

        match RawHeader::decode(&block).unwrap() {
            RawHeader::Gnu(h) => {
                assert_eq!(h.base.typeflag, TypeFlag::GNU_LONG_NAME);
                assert_eq!(h.base.name, "././@LongLink/file.txt");
                assert_eq!(h.base.size, Some(payload.len() as u64));
                assert_eq!(h.base.mode, Some(0o444));
                assert_eq!(h.uname, "root");
            }
            other => panic!("unexpected layout {other:?}"),
        }
        assert_eq!(decode_long_text(&payload), name);
    }

    #[test]
    fn test_decode_long_text_without_nul() {
        assert_eq!(decode_long_text(b"plain"), "plain");
        assert_eq!(decode_long_text(b"name\0\0\0garbage"), "name");
    }
}
