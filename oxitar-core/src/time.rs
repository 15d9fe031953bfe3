//! Entry timestamps.
//!
//! Header fields only carry whole seconds; PAX records carry arbitrary
//! precision decimal seconds. [`TarTime`] keeps seconds plus nanoseconds,
//! normalized so that `nanos` is always in `0..1_000_000_000` and the instant
//! is `secs + nanos / 1e9` (floor semantics for negative instants).

use crate::error::{Result, TarError};
use filetime::FileTime;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A timestamp with nanosecond precision relative to the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TarTime {
    secs: i64,
    nanos: u32,
}

impl TarTime {
    /// The Unix epoch.
    pub const UNIX_EPOCH: Self = Self { secs: 0, nanos: 0 };

    /// Create a timestamp, carrying excess nanoseconds into seconds.
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self {
            secs: secs + i64::from(nanos / NANOS_PER_SEC),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Create a timestamp from whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// The current time.
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// Whole seconds (floor).
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Nanoseconds past [`secs`](Self::secs).
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Parse a PAX decimal timestamp such as `1700000000.123456789` or `-1.5`.
    ///
    /// Fraction digits beyond nanosecond precision are floored away.
    pub fn parse_pax(text: &str) -> Result<Self> {
        let bad = || TarError::invalid_header(0, format!("invalid PAX timestamp: {text:?}"));

        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad())?
        };

        // First nine fraction digits, right-padded, and whether anything
        // non-zero follows them.
        let mut nanos: u32 = 0;
        for i in 0..9 {
            let digit = frac_part.as_bytes().get(i).map_or(0, |b| u32::from(b - b'0'));
            nanos = nanos * 10 + digit;
        }
        let tail_nonzero = frac_part.bytes().skip(9).any(|b| b != b'0');

        if !negative {
            return Ok(Self { secs: whole, nanos });
        }

        let exact_zero_fraction = nanos == 0 && !tail_nonzero;
        if exact_zero_fraction {
            return Ok(Self { secs: -whole, nanos: 0 });
        }
        let secs = (-whole).checked_sub(1).ok_or_else(bad)?;
        let nanos = NANOS_PER_SEC - nanos - u32::from(tail_nonzero);
        Ok(Self::new(secs, nanos))
    }

    /// Format as a PAX decimal timestamp with nine fraction digits.
    pub fn to_pax_string(&self) -> String {
        if self.secs < 0 && self.nanos > 0 {
            let whole = -(self.secs + 1);
            format!("-{}.{:09}", whole, NANOS_PER_SEC - self.nanos)
        } else {
            format!("{}.{:09}", self.secs, self.nanos)
        }
    }

    /// Convert to a [`SystemTime`].
    pub fn to_system_time(&self) -> SystemTime {
        if self.secs >= 0 {
            UNIX_EPOCH + Duration::new(self.secs as u64, self.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.secs.unsigned_abs())
                + Duration::from_nanos(u64::from(self.nanos))
        }
    }

    /// Convert to a [`FileTime`].
    pub fn to_file_time(&self) -> FileTime {
        FileTime::from_unix_time(self.secs, self.nanos)
    }
}

impl From<SystemTime> for TarTime {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                let mut secs = -(d.as_secs() as i64);
                let mut nanos = d.subsec_nanos();
                if nanos > 0 {
                    secs -= 1;
                    nanos = NANOS_PER_SEC - nanos;
                }
                Self { secs, nanos }
            }
        }
    }
}

impl From<FileTime> for TarTime {
    fn from(t: FileTime) -> Self {
        Self::new(t.unix_seconds(), t.nanoseconds())
    }
}

impl fmt::Display for TarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pax_string())
    }
}

impl FromStr for TarTime {
    type Err = TarError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_pax(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_seconds() {
        assert_eq!(TarTime::parse_pax("1234").unwrap(), TarTime::from_secs(1234));
        assert_eq!(TarTime::parse_pax("-7").unwrap(), TarTime::from_secs(-7));
        assert_eq!(TarTime::parse_pax("0").unwrap(), TarTime::UNIX_EPOCH);
    }

    #[test]
    fn test_parse_fraction_floors() {
        let t = TarTime::parse_pax("1700000000.123456789999").unwrap();
        assert_eq!(t.secs(), 1_700_000_000);
        assert_eq!(t.nanos(), 123_456_789);

        let t = TarTime::parse_pax("12.5").unwrap();
        assert_eq!((t.secs(), t.nanos()), (12, 500_000_000));
    }

    #[test]
    fn test_parse_negative_fraction() {
        // -1.5 = -2 + 0.5
        let t = TarTime::parse_pax("-1.5").unwrap();
        assert_eq!((t.secs(), t.nanos()), (-2, 500_000_000));

        // Floor across the precision cut
        let t = TarTime::parse_pax("-0.0000000001").unwrap();
        assert_eq!((t.secs(), t.nanos()), (-1, 999_999_999));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "-", ".", "1e5", "12.3.4", "abc", " 12"] {
            assert!(TarTime::parse_pax(bad).is_err(), "{bad:?} parsed");
        }
    }

    #[test]
    fn test_pax_string_roundtrip() {
        for t in [
            TarTime::new(1_700_000_000, 5),
            TarTime::new(-2, 500_000_000),
            TarTime::from_secs(-10),
            TarTime::UNIX_EPOCH,
        ] {
            assert_eq!(TarTime::parse_pax(&t.to_pax_string()).unwrap(), t);
        }
        assert_eq!(TarTime::new(-2, 500_000_000).to_pax_string(), "-1.500000000");
    }

    #[test]
    fn test_system_time_conversion() {
        let t = TarTime::new(1_600_000_000, 42);
        assert_eq!(TarTime::from(t.to_system_time()), t);

        let before_epoch = TarTime::new(-5, 250_000_000);
        assert_eq!(TarTime::from(before_epoch.to_system_time()), before_epoch);
    }

    #[test]
    fn test_file_time_conversion() {
        let t = TarTime::new(1_600_000_000, 7);
        assert_eq!(TarTime::from(t.to_file_time()), t);
    }

    #[test]
    fn test_new_carries_nanos() {
        let t = TarTime::new(1, 2_500_000_000);
        assert_eq!((t.secs(), t.nanos()), (3, 500_000_000));
    }
}
