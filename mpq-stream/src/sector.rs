//! The sector offset table of a multi-sector compressed file.
//!
//! A compressed multi-sector payload begins with `N + 1` little-endian
//! 32-bit offsets (one more when the checksum slot is present), measured
//! from the start of the payload. The first entry therefore always equals
//! the table's own byte size, which doubles as known plaintext for key
//! recovery.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{Error, Result};

/// Decoded and validated sector offsets.
#[derive(Debug, Clone)]
pub struct SectorTable {
    offsets: Vec<u32>,
}

impl SectorTable {
    /// Number of table entries for a file of `file_size` logical bytes.
    pub fn entry_count(file_size: u32, sector_size: usize, has_crc: bool) -> usize {
        let sectors = (file_size as usize).div_ceil(sector_size);
        sectors + 1 + usize::from(has_crc)
    }

    /// The value the first entry must decode to: the table's byte size.
    pub fn expected_first(entry_count: usize) -> u32 {
        (entry_count * 4) as u32
    }

    /// Parse `entry_count` offsets from raw (already decrypted) bytes.
    pub fn parse(data: &[u8], entry_count: usize) -> Result<Self> {
        let needed = entry_count * 4;
        if data.len() < needed {
            return Err(Error::TruncatedData {
                expected: needed,
                actual: data.len(),
            });
        }

        let mut offsets = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            offsets.push(LittleEndian::read_u32(&data[i * 4..i * 4 + 4]));
        }
        Ok(Self { offsets })
    }

    /// Check the structural invariants: the first entry equals the table's
    /// own size and every consecutive delta is positive and at most one
    /// sector. Returns `false` (with a debug note) instead of erroring, so
    /// open-time validation can stay quiet.
    pub fn validate(&self, sector_size: usize) -> bool {
        if self.offsets.is_empty() {
            debug!("sector table holds no entries");
            return false;
        }

        let expected = Self::expected_first(self.offsets.len());
        if self.offsets[0] != expected {
            debug!(
                "sector table starts with {:#010x}, expected {expected:#010x}",
                self.offsets[0]
            );
            return false;
        }

        for i in 1..self.offsets.len() {
            let previous = self.offsets[i - 1];
            let current = self.offsets[i];
            if current <= previous || (current - previous) as usize > sector_size {
                debug!(
                    "sector {} spans {previous:#010x}..{current:#010x}, outside (0, {sector_size}]",
                    i - 1
                );
                return false;
            }
        }

        true
    }

    /// Payload-relative offset and stored length of sector `index`, or
    /// `None` when the table has no entry pair for it.
    pub fn sector_range(&self, index: usize) -> Option<(u64, usize)> {
        let start = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        Some((u64::from(start), end.saturating_sub(start) as usize))
    }

    /// Number of table entries.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Raw offsets, in payload order.
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }
}
