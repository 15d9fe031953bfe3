//! # OxiTar Core
//!
//! Core components for the OxiTar archive library.
//!
//! This crate provides the building blocks below the streaming reader and
//! writer:
//!
//! - [`field`]: Fixed-width header field codec and checksum
//! - [`header`]: Header block layouts (V7, USTAR, GNU, star) and name splitting
//! - [`entry`]: Archive entry metadata, type flags and formats
//! - [`time`]: Second + nanosecond timestamps
//! - [`charset`]: PAX `charset` vocabulary
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Archive (oxitar)                                    │
//! │     TarReader/TarWriter, PAX records, GNU L/K, sparse   │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Model (this crate)                                  │
//! │     Entry, TypeFlag, Format, TarTime, Charset           │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Block (this crate)                                  │
//! │     RawHeader layouts, field codec, checksum            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxitar_core::field::{decode_number, encode_gnu_number};
//! use oxitar_core::header::split_name;
//!
//! // Values too large for octal switch to base-256
//! let mut field = [0u8; 12];
//! encode_gnu_number(1 << 40, &mut field).unwrap();
//! assert_eq!(decode_number::<u64>(&field).unwrap(), Some(1 << 40));
//!
//! // Long paths split into a USTAR prefix and name
//! let path = format!("{}/file.txt", "dir".repeat(40));
//! let (prefix, name) = split_name(&path).unwrap();
//! assert_eq!(name, "file.txt");
//! assert_eq!(prefix.len(), 120);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod charset;
pub mod entry;
pub mod error;
pub mod field;
pub mod header;
pub mod time;

// Re-exports for convenience
pub use charset::Charset;
pub use entry::{Entry, Format, TypeFlag};
pub use error::{Result, TarError};
pub use field::{BLOCK_SIZE, Block};
pub use header::{RawHeader, SparseSegment, split_name};
pub use time::TarTime;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::charset::Charset;
    pub use crate::entry::{Entry, Format, TypeFlag};
    pub use crate::error::{Result, TarError};
    pub use crate::time::TarTime;
}
