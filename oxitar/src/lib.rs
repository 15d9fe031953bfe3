//! # OxiTar
//!
//! Streaming TAR archive reader and writer.
//!
//! Supported header formats:
//!
//! - **V7**: The original Unix layout, 100-byte names
//! - **USTAR**: POSIX.1-1988, owner names, devices and a 155-byte name prefix
//! - **PAX**: POSIX.1-2001 extended headers (`x` per entry, `g` global)
//! - **GNU**: Base-256 numbers, `L`/`K` long names and links, sparse files
//!
//! Star (Schily) headers are read through their USTAR-compatible subset.
//!
//! ## Example
//!
//! ```rust
//! use oxitar::{TarReader, TarWriter};
//! use oxitar::prelude::*;
//! use std::io::{Cursor, Read};
//!
//! let mut writer = TarWriter::new(Vec::new());
//! writer.add_file("hello.txt", b"world").unwrap();
//! let archive = writer.into_inner().unwrap();
//!
//! let mut reader = TarReader::new(Cursor::new(archive));
//! while let Some(entry) = reader.next_entry().unwrap() {
//!     let mut data = String::new();
//!     reader.read_to_string(&mut data).unwrap();
//!     println!("{} ({:?}): {}", entry.name(), entry.format(), data);
//! }
//! ```
//!
//! ## Choosing a format
//!
//! Entries default to [`Format::Pax`]: the writer emits a plain USTAR
//! header and adds an extended header only when a field does not fit.
//! [`Format::Ustar`] and [`Format::V7`] reject such entries with
//! [`TarError::Format`]; [`Format::Gnu`] stores them with GNU extensions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod fs;
pub mod gnu;
pub mod options;
pub mod pax;
pub mod read;
pub mod sparse;
pub mod write;

// Re-exports
pub use options::{ReadOptions, WriteOptions};
pub use oxitar_core::{
    BLOCK_SIZE, Block, Charset, Entry, Format, Result, SparseSegment, TarError, TarTime,
    TypeFlag,
};
pub use read::TarReader;
pub use write::TarWriter;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::options::{ReadOptions, WriteOptions};
    pub use crate::read::TarReader;
    pub use crate::write::TarWriter;
    pub use oxitar_core::prelude::*;
}
