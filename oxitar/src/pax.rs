//! POSIX.1-2001 extended header records.
//!
//! An extended header payload is a sequence of records
//! `"<len> <key>=<value>\n"` where `<len>` counts every byte of the record,
//! its own digits included.

use log::{trace, warn};
use oxitar_core::{Charset, Entry, Result, TarError, TarTime};
use std::collections::BTreeMap;

/// Record keys.
pub mod keys {
    /// Access time.
    pub const ATIME: &str = "atime";
    /// Payload character set.
    pub const CHARSET: &str = "charset";
    /// Free-text comment.
    pub const COMMENT: &str = "comment";
    /// Status change time.
    pub const CTIME: &str = "ctime";
    /// Owner group ID.
    pub const GID: &str = "gid";
    /// Owner group name.
    pub const GNAME: &str = "gname";
    /// Character set of header values.
    pub const HDRCHARSET: &str = "hdrcharset";
    /// Link target.
    pub const LINKPATH: &str = "linkpath";
    /// Modification time.
    pub const MTIME: &str = "mtime";
    /// Entry path.
    pub const PATH: &str = "path";
    /// Payload size.
    pub const SIZE: &str = "size";
    /// Owner user ID.
    pub const UID: &str = "uid";
    /// Owner user name.
    pub const UNAME: &str = "uname";

    /// Keys the writer derives from typed entry fields.
    pub const RESERVED: [&str; 13] = [
        ATIME, CHARSET, COMMENT, CTIME, GID, GNAME, HDRCHARSET, LINKPATH, MTIME, PATH, SIZE, UID,
        UNAME,
    ];
}

/// Format one record, solving for the self-inclusive length prefix.
pub fn make_record(key: &str, value: &str) -> String {
    // " " + "=" + "\n"
    let base_len = key.len() + value.len() + 3;

    let mut total_len = base_len + 1;
    loop {
        let expected = base_len + decimal_digits(total_len);
        if expected == total_len {
            break;
        }
        total_len = expected;
    }

    format!("{total_len} {key}={value}\n")
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Encode records in order into an extended header payload.
pub fn encode_records<'a>(records: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<u8> {
    let mut data = Vec::new();
    for (key, value) in records {
        data.extend_from_slice(make_record(key, value).as_bytes());
    }
    data
}

/// Parse an extended header payload.
///
/// Parsing stops at the end of `data` or at a NUL, which marks block padding.
/// Later records for the same key replace earlier ones.
pub fn parse_records(data: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut records = BTreeMap::new();
    let mut pos = 0;

    while pos < data.len() && data[pos] != 0 {
        let rest = &data[pos..];
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed(pos, "missing length separator"))?;
        let len_text = std::str::from_utf8(&rest[..space])
            .map_err(|_| malformed(pos, "non-ASCII record length"))?;
        if len_text.is_empty() || !len_text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed(pos, "invalid record length"));
        }
        let record_len: usize = len_text
            .parse()
            .map_err(|_| malformed(pos, "record length overflow"))?;
        if record_len <= space + 1 || record_len > rest.len() {
            return Err(malformed(pos, "record length out of bounds"));
        }

        let record = &rest[space + 1..record_len];
        let Some((&b'\n', body)) = record.split_last() else {
            return Err(malformed(pos, "record not terminated by newline"));
        };
        let eq = body
            .iter()
            .position(|&b| b == b'=')
            .ok_or_else(|| malformed(pos, "record without '='"))?;
        let key = String::from_utf8_lossy(&body[..eq]).into_owned();
        let value = String::from_utf8_lossy(&body[eq + 1..]).into_owned();
        if key.is_empty() {
            return Err(malformed(pos, "empty record key"));
        }
        trace!("pax record {key}={value}");
        records.insert(key, value);

        pos += record_len;
    }

    Ok(records)
}

fn malformed(pos: usize, what: &str) -> TarError {
    TarError::invalid_header(0, format!("malformed PAX record at byte {pos}: {what}"))
}

/// Layer `records` onto `target`. An empty value deletes the key.
pub fn merge_records(target: &mut BTreeMap<String, String>, records: BTreeMap<String, String>) {
    for (key, value) in records {
        if value.is_empty() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

/// Build a partial entry from records.
///
/// Standard keys set the typed field they name; every other key lands in
/// [`Entry::extensions`]. Only fields named by a record are set, so the
/// result can be merged over a decoded header. A `charset` that names no
/// known character set is kept verbatim as an extension.
pub fn entry_from_records(records: &BTreeMap<String, String>) -> Result<Entry> {
    let mut entry = Entry::default();

    for (key, value) in records {
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            keys::PATH => entry.name = Some(value.clone()),
            keys::LINKPATH => entry.linkname = Some(value.clone()),
            keys::UNAME => entry.uname = Some(value.clone()),
            keys::GNAME => entry.gname = Some(value.clone()),
            keys::COMMENT => entry.comment = Some(value.clone()),
            keys::SIZE => entry.size = Some(parse_decimal(key, value)?),
            keys::UID => entry.uid = Some(parse_decimal(key, value)?),
            keys::GID => entry.gid = Some(parse_decimal(key, value)?),
            keys::MTIME => entry.mtime = Some(TarTime::parse_pax(value)?),
            keys::ATIME => entry.atime = Some(TarTime::parse_pax(value)?),
            keys::CTIME => entry.ctime = Some(TarTime::parse_pax(value)?),
            keys::CHARSET => match Charset::from_pax_name(value) {
                Some(charset) => entry.charset = Some(charset),
                None => {
                    warn!("unrecognized PAX charset {value:?}");
                    entry.extensions.insert(key.clone(), value.clone());
                }
            },
            _ => {
                entry.extensions.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(entry)
}

fn parse_decimal(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| TarError::invalid_header(0, format!("invalid PAX {key} value {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pax_record_format() {
        // "17 path=test.txt\n" = 17 bytes
        assert_eq!(make_record("path", "test.txt"), "17 path=test.txt\n");
        assert_eq!(make_record("path", "x"), "9 path=x\n");
    }

    #[test]
    fn test_record_length_is_self_consistent() {
        // Lengths straddling a digit-count boundary
        for value_len in [0, 1, 88, 89, 90, 91, 200, 989, 990, 991, 9990] {
            let value = "v".repeat(value_len);
            let record = make_record("path", &value);
            let (len, _) = record.split_once(' ').unwrap();
            assert_eq!(len.parse::<usize>().unwrap(), record.len(), "value_len {value_len}");
        }
        let long = "a".repeat(200);
        assert!(make_record("path", &long).starts_with("210 path="));
    }

    #[test]
    fn test_parse_roundtrip() {
        let data = encode_records([("path", "x"), ("uname", "alice"), ("SCHILY.fflags", "")]);
        let records = parse_records(&data).unwrap();
        assert_eq!(records["path"], "x");
        assert_eq!(records["uname"], "alice");
        assert_eq!(records["SCHILY.fflags"], "");
    }

    #[test]
    fn test_parse_value_with_equals_and_newline() {
        let data = make_record("comment", "a=b\nc");
        let records = parse_records(data.as_bytes()).unwrap();
        assert_eq!(records["comment"], "a=b\nc");
    }

    #[test]
    fn test_parse_stops_at_padding() {
        let mut data = make_record("path", "padded").into_bytes();
        data.resize(512, 0);
        let records = parse_records(&data).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            &b"abc path=x\n"[..],
            b"99 path=x\n",
            b"10 path=xx",
            b"9 pathx\n\n",
            b"10path=x\n\n",
            b"5 =x\n",
        ] {
            assert!(
                matches!(parse_records(bad), Err(TarError::InvalidHeader { .. })),
                "{:?} parsed",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn test_merge_records_deletes_empty() {
        let mut global = BTreeMap::from([
            ("uname".to_string(), "alice".to_string()),
            ("comment".to_string(), "keep".to_string()),
        ]);
        merge_records(
            &mut global,
            BTreeMap::from([
                ("uname".to_string(), String::new()),
                ("gname".to_string(), "staff".to_string()),
            ]),
        );
        assert!(!global.contains_key("uname"));
        assert_eq!(global["gname"], "staff");
        assert_eq!(global["comment"], "keep");
    }

    #[test]
    fn test_entry_from_records() {
        let records = BTreeMap::from([
            ("path".to_string(), "very/long/path".to_string()),
            ("size".to_string(), "68719476736".to_string()),
            ("uid".to_string(), "4294967296".to_string()),
            ("mtime".to_string(), "1700000000.25".to_string()),
            ("charset".to_string(), "ISO-IR 8859 1 1998".to_string()),
            ("SCHILY.xattr.user.tag".to_string(), "blue".to_string()),
        ]);
        let entry = entry_from_records(&records).unwrap();
        assert_eq!(entry.name(), "very/long/path");
        assert_eq!(entry.size, Some(1 << 36));
        assert_eq!(entry.uid, Some(1 << 32));
        assert_eq!(entry.mtime, Some(TarTime::new(1_700_000_000, 250_000_000)));
        assert_eq!(entry.charset, Some(Charset::Iso8859_1));
        assert_eq!(entry.gid, None);
        assert_eq!(entry.extensions.len(), 1);
        assert_eq!(entry.extensions["SCHILY.xattr.user.tag"], "blue");
    }

    #[test]
    fn test_unknown_charset_kept() {
        let records = BTreeMap::from([(
            "charset".to_string(),
            "ISO-IR 10646 2000 UTF-8".to_string(),
        )]);
        let entry = entry_from_records(&records).unwrap();
        assert_eq!(entry.charset, None);
        assert_eq!(entry.extensions["charset"], "ISO-IR 10646 2000 UTF-8");
    }

    #[test]
    fn test_bad_numeric_value() {
        let records = BTreeMap::from([("size".to_string(), "-1".to_string())]);
        assert!(matches!(
            entry_from_records(&records),
            Err(TarError::InvalidHeader { .. })
        ));
    }
}
