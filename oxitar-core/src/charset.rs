//! PAX `charset` vocabulary.
//!
//! The `charset` record names the encoding of the entry's payload using
//! ISO-IR registry identifiers. Unknown identifiers are not an error: they map
//! to `None` and the raw value stays in the entry's extension map.

use encoding_rs::Encoding;
use std::borrow::Cow;

/// Character sets nameable in a PAX `charset` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Charset {
    /// ISO 646 (US-ASCII).
    Ascii,
    /// ISO-8859-1 (Latin-1).
    Iso8859_1,
    /// ISO-8859-2 (Latin-2).
    Iso8859_2,
    /// ISO-8859-3 (Latin-3).
    Iso8859_3,
    /// ISO-8859-4 (Latin-4).
    Iso8859_4,
    /// ISO-8859-5 (Cyrillic).
    Iso8859_5,
    /// ISO-8859-6 (Arabic).
    Iso8859_6,
    /// ISO-8859-7 (Greek).
    Iso8859_7,
    /// ISO-8859-8 (Hebrew).
    Iso8859_8,
    /// ISO-8859-9 (Latin-5).
    Iso8859_9,
    /// ISO-8859-10 (Latin-6).
    Iso8859_10,
    /// ISO-8859-13 (Latin-7).
    Iso8859_13,
    /// ISO-8859-14 (Latin-8).
    Iso8859_14,
    /// ISO-8859-15 (Latin-9).
    Iso8859_15,
}

/// (charset, PAX identifier) pairs.
const PAX_NAMES: [(Charset, &str); 14] = [
    (Charset::Ascii, "ISO-IR 646 1900"),
    (Charset::Iso8859_1, "ISO-IR 8859 1 1998"),
    (Charset::Iso8859_2, "ISO-IR 8859 2 1999"),
    (Charset::Iso8859_3, "ISO-IR 8859 3 1999"),
    (Charset::Iso8859_4, "ISO-IR 8859 4 1998"),
    (Charset::Iso8859_5, "ISO-IR 8859 5 1999"),
    (Charset::Iso8859_6, "ISO-IR 8859 6 1999"),
    (Charset::Iso8859_7, "ISO-IR 8859 7 1987"),
    (Charset::Iso8859_8, "ISO-IR 8859 8 1999"),
    (Charset::Iso8859_9, "ISO-IR 8859 9 1999"),
    (Charset::Iso8859_10, "ISO-IR 8859 10 1998"),
    (Charset::Iso8859_13, "ISO-IR 8859 13 1998"),
    (Charset::Iso8859_14, "ISO-IR 8859 14 1998"),
    (Charset::Iso8859_15, "ISO-IR 8859 15 1999"),
];

impl Charset {
    /// Look up a PAX `charset` identifier.
    pub fn from_pax_name(name: &str) -> Option<Self> {
        PAX_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(c, _)| *c)
    }

    /// The PAX `charset` identifier.
    pub fn pax_name(&self) -> &'static str {
        PAX_NAMES
            .iter()
            .find(|(c, _)| c == self)
            .map(|(_, n)| *n)
            .unwrap_or("ISO-IR 646 1900")
    }

    /// The `encoding_rs` decoder for this charset.
    ///
    /// ISO-8859-1 and ISO-8859-9 have no standalone WHATWG encoding and use
    /// their supersets windows-1252 and windows-1254. ASCII uses windows-1252,
    /// which is identical over the 7-bit range.
    pub fn encoding(&self) -> &'static Encoding {
        match self {
            Self::Ascii | Self::Iso8859_1 => encoding_rs::WINDOWS_1252,
            Self::Iso8859_2 => encoding_rs::ISO_8859_2,
            Self::Iso8859_3 => encoding_rs::ISO_8859_3,
            Self::Iso8859_4 => encoding_rs::ISO_8859_4,
            Self::Iso8859_5 => encoding_rs::ISO_8859_5,
            Self::Iso8859_6 => encoding_rs::ISO_8859_6,
            Self::Iso8859_7 => encoding_rs::ISO_8859_7,
            Self::Iso8859_8 => encoding_rs::ISO_8859_8,
            Self::Iso8859_9 => encoding_rs::WINDOWS_1254,
            Self::Iso8859_10 => encoding_rs::ISO_8859_10,
            Self::Iso8859_13 => encoding_rs::ISO_8859_13,
            Self::Iso8859_14 => encoding_rs::ISO_8859_14,
            Self::Iso8859_15 => encoding_rs::ISO_8859_15,
        }
    }

    /// Decode payload text written in this charset.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, _) = self.encoding().decode_without_bom_handling(bytes);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pax_name_roundtrip() {
        for (charset, name) in PAX_NAMES {
            assert_eq!(Charset::from_pax_name(name), Some(charset));
            assert_eq!(charset.pax_name(), name);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(Charset::from_pax_name("ISO-IR 10646 2000 UTF-8"), None);
        assert_eq!(Charset::from_pax_name(""), None);
    }

    #[test]
    fn test_decode() {
        assert_eq!(Charset::Iso8859_1.decode(b"caf\xE9"), "café");
        assert_eq!(Charset::Iso8859_15.decode(b"\xA4"), "€");
        assert_eq!(Charset::Ascii.decode(b"plain"), "plain");
    }
}
