//! Random-access reader and re-encoder for a single file stored inside an
//! MPQ archive.
//!
//! A file in an MPQ archive may be stored plain, split into fixed-size
//! sectors, compressed sector-by-sector with a combinable set of codecs,
//! and encrypted with a per-file key whose seed may have to be recovered
//! from ciphertext. This crate implements the file-level stream over such
//! a payload:
//!
//! - [`FileEntry`] describes where and how a file is stored.
//! - [`MpqStream`] validates the layout at open time, recovers unknown
//!   encryption keys where possible, and exposes the decoded bytes as a
//!   seekable [`std::io::Read`] implementation.
//! - [`MpqStream::rebuild`] re-emits the same content under a different
//!   compression/encryption/sector configuration.
//!
//! Archive-level concerns (hash table, block table, listfiles) are out of
//! scope; callers hand this crate a [`FileEntry`] and a shared reader over
//! the archive.

pub mod compression;
pub mod entry;
pub mod error;
pub mod sector;
pub mod stream;

mod rebuild;

pub use entry::{FileEntry, FileFlags};
pub use error::{Error, Result};
pub use sector::SectorTable;
pub use stream::MpqStream;

/// Compute the sector size from the archive header's shift value.
#[inline]
pub fn calculate_sector_size(shift: u16) -> usize {
    512 << shift
}
