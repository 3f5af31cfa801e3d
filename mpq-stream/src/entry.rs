//! File entry descriptors.
//!
//! A [`FileEntry`] is the immutable metadata an archive's block table holds
//! for one file: where its payload lives, how large it is, and the storage
//! flags. The encryption seeds travel with it because they are derived from
//! the filename, which the archive layer may or may not know.

use bitflags::bitflags;

use mpq_crypto::{adjust_key, file_key};

bitflags! {
    /// Storage flags for a single file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u32 {
        /// Whole-file PKWARE implode compression (no per-sector codec byte).
        const IMPLODE = 0x0000_0100;
        /// Per-sector multi-codec compression (leading codec byte).
        const COMPRESS = 0x0000_0200;
        /// The payload is encrypted with the per-file key.
        const ENCRYPTED = 0x0001_0000;
        /// The encryption key is adjusted by the file's archive position.
        const FIX_KEY = 0x0002_0000;
        /// The file is stored as one piece, without sector blocking.
        const SINGLE_UNIT = 0x0100_0000;
        /// The sector offset table carries an extra slot for a checksum
        /// block after the data sectors.
        const SECTOR_CRC = 0x0400_0000;
        /// The block table entry is in use.
        const EXISTS = 0x8000_0000;

        /// Either compression scheme.
        const COMPRESSED = Self::IMPLODE.bits() | Self::COMPRESS.bits();
    }
}

/// Metadata for one file inside an archive.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Byte offset of the file payload inside the archive stream.
    pub file_position: u64,
    /// Decoded (logical) size in bytes.
    pub file_size: u32,
    /// Stored size in bytes; equals `file_size` for plain files.
    pub compressed_size: u32,
    /// Storage flags.
    pub flags: FileFlags,
    /// Position-adjusted encryption key, or 0 when unknown.
    pub encryption_seed: u32,
    /// Pre-adjustment encryption key, or 0 when unknown. Required to
    /// re-emit the file at a different archive position.
    pub base_encryption_seed: u32,
}

impl FileEntry {
    /// Create an entry with unknown encryption seeds.
    pub fn new(file_position: u64, file_size: u32, compressed_size: u32, flags: FileFlags) -> Self {
        Self {
            file_position,
            file_size,
            compressed_size,
            flags,
            encryption_seed: 0,
            base_encryption_seed: 0,
        }
    }

    /// Create an entry and derive its encryption seeds from a filename.
    pub fn with_filename(
        file_position: u64,
        file_size: u32,
        compressed_size: u32,
        flags: FileFlags,
        name: &str,
    ) -> Self {
        let mut entry = Self::new(file_position, file_size, compressed_size, flags);
        entry.set_encryption_seed(file_key(name));
        entry
    }

    /// Install a known base key, adjusting it by position when the entry
    /// carries [`FileFlags::FIX_KEY`].
    pub fn set_encryption_seed(&mut self, base_key: u32) {
        self.base_encryption_seed = base_key;
        self.encryption_seed = if self.flags.contains(FileFlags::FIX_KEY) {
            adjust_key(base_key, self.file_position as u32, self.file_size)
        } else {
            base_key
        };
    }

    /// Whether the payload is compressed with either scheme.
    pub fn is_compressed(&self) -> bool {
        self.flags.intersects(FileFlags::COMPRESSED)
    }

    /// Whether the payload is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(FileFlags::ENCRYPTED)
    }

    /// Whether the file is stored as a single unit.
    pub fn is_single_unit(&self) -> bool {
        self.flags.contains(FileFlags::SINGLE_UNIT)
    }

    /// Whether the sector table carries the extra checksum slot.
    pub fn has_sector_crc(&self) -> bool {
        self.flags.contains(FileFlags::SECTOR_CRC)
    }

    /// Whether the block table entry is in use.
    pub fn exists(&self) -> bool {
        self.flags.contains(FileFlags::EXISTS)
    }
}
