//! Re-encoding a file under a different storage policy.
//!
//! The stream is drained into memory, re-partitioned and re-compressed
//! according to the target flags, then re-encrypted per sector. The result
//! is a complete payload byte sequence a caller can place at
//! `target_position` in a new archive (or reopen standalone through a
//! fresh [`FileEntry`](crate::FileEntry)).

use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use mpq_crypto::{adjust_key, encrypt_block};

use crate::compression;
use crate::entry::FileFlags;
use crate::error::{Error, Result};
use crate::stream::MpqStream;

impl<R: Read + Seek> MpqStream<R> {
    /// Re-emit the file's content under `target_flags`.
    ///
    /// `method` is the compression flag byte used when the target is
    /// compressed (each sector falls back to verbatim storage when
    /// compression does not shrink it). `target_position` only matters for
    /// [`FileFlags::FIX_KEY`] targets, where the encryption key is
    /// position-adjusted. Encrypting requires the stream to know its base
    /// encryption seed.
    pub fn rebuild(
        &mut self,
        target_flags: FileFlags,
        method: u8,
        target_position: u64,
        target_sector_size: usize,
    ) -> Result<Vec<u8>> {
        if target_sector_size == 0 {
            return Err(Error::NotSupported("sector size must be non-zero"));
        }

        // Materialize the logical content.
        self.seek(SeekFrom::Start(0))?;
        let mut content = vec![0u8; self.len()? as usize];
        self.read_exact(&mut content)?;

        let single_unit = target_flags.contains(FileFlags::SINGLE_UNIT);
        let compressed = target_flags.intersects(FileFlags::COMPRESSED);

        // Compress. `table_len` is the byte length of the leading sector
        // offset table; `bounds` are the payload slices holding data
        // sectors, in order.
        let mut payload: Vec<u8>;
        let mut table_len = 0usize;
        let mut bounds: Vec<(usize, usize)> = Vec::new();

        if !compressed {
            payload = content.clone();
            if !single_unit {
                // No offset table exists for plain files; boundaries are
                // implied by the sector size.
                let mut start = 0;
                while start < payload.len() {
                    let end = (start + target_sector_size).min(payload.len());
                    bounds.push((start, end));
                    start = end;
                }
            }
        } else if single_unit {
            let packed = compression::compress(&content, method)?;
            if packed.len() + 1 >= content.len() {
                payload = content.clone();
            } else {
                payload = Vec::with_capacity(packed.len() + 1);
                payload.push(method);
                payload.extend_from_slice(&packed);
            }
        } else {
            let sectors = content.len().div_ceil(target_sector_size);
            table_len = 4 * (sectors + 1);
            payload = vec![0u8; table_len];

            let mut offsets = Vec::with_capacity(sectors + 1);
            offsets.push(table_len as u32);
            for chunk in content.chunks(target_sector_size) {
                let start = payload.len();
                let packed = compression::compress(chunk, method)?;
                if packed.len() + 1 >= chunk.len() {
                    payload.extend_from_slice(chunk);
                } else {
                    payload.push(method);
                    payload.extend_from_slice(&packed);
                }
                bounds.push((start, payload.len()));
                offsets.push(payload.len() as u32);
            }
            for (i, offset) in offsets.iter().enumerate() {
                LittleEndian::write_u32(&mut payload[i * 4..i * 4 + 4], *offset);
            }
        }

        debug!(
            "rebuilt {} bytes into {} ({} sectors, table {table_len} bytes)",
            content.len(),
            payload.len(),
            bounds.len(),
        );

        // Encrypt.
        if target_flags.contains(FileFlags::ENCRYPTED) {
            let base = self.base_encryption_seed();
            if base == 0 {
                return Err(Error::MissingEncryptionKey);
            }

            if single_unit {
                // The single-unit payload is one block under the base
                // (non-position-adjusted) key, mirroring the read path.
                if payload.len() >= 4 {
                    encrypt_block(&mut payload, base);
                }
            } else {
                let seed = if target_flags.contains(FileFlags::FIX_KEY) {
                    adjust_key(base, target_position as u32, content.len() as u32)
                } else {
                    base
                };

                if table_len > 0 {
                    encrypt_block(&mut payload[..table_len], seed.wrapping_sub(1));
                }
                for (index, &(start, end)) in bounds.iter().enumerate() {
                    if end - start >= 4 {
                        encrypt_block(
                            &mut payload[start..end],
                            seed.wrapping_add(index as u32),
                        );
                    }
                }
            }
        }

        Ok(payload)
    }
}
