//! The file-level stream state machine.
//!
//! [`MpqStream`] validates a file's layout when constructed, lazily
//! materializes sectors into a seekable byte stream, and keeps exactly one
//! decoded sector cached. Layout problems found at open time do not raise:
//! they leave the stream in a sticky unreadable state that callers probe
//! with [`MpqStream::is_readable`], after which every operation fails with
//! [`Error::NotSupported`].

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use tracing::{debug, trace};

use mpq_crypto::{decrypt_block, decrypt_dword, detect_file_key, unadjust_key};

use crate::compression;
use crate::entry::{FileEntry, FileFlags};
use crate::error::{Error, Result};
use crate::sector::SectorTable;

/// Random-access reader over one file inside an archive.
///
/// The underlying archive reader is shared behind a mutex: any number of
/// streams may be open over one archive as long as they share the lock.
/// A stream itself is single-owner; its position and cache are not meant
/// for concurrent use.
pub struct MpqStream<R: Read + Seek> {
    source: Arc<Mutex<R>>,
    entry: FileEntry,
    sector_size: usize,
    /// Position-adjusted encryption key; 0 while unknown.
    seed: u32,
    /// Pre-adjustment encryption key; 0 while unknown.
    base_seed: u32,
    sectors: Option<SectorTable>,
    position: u64,
    cached_index: Option<usize>,
    cache: Vec<u8>,
    readable: bool,
}

impl<R: Read + Seek> MpqStream<R> {
    /// Open a file over a shared archive reader.
    ///
    /// Validation happens here; IO problems surface as errors, while
    /// layout violations quietly produce an unreadable stream.
    pub fn open(source: Arc<Mutex<R>>, entry: FileEntry, sector_size: usize) -> Result<Self> {
        if sector_size == 0 {
            return Err(Error::NotSupported("sector size must be non-zero"));
        }

        let seed = entry.encryption_seed;
        let base_seed = if entry.base_encryption_seed != 0 {
            entry.base_encryption_seed
        } else if seed != 0 && entry.flags.contains(FileFlags::FIX_KEY) {
            unadjust_key(seed, entry.file_position as u32, entry.file_size)
        } else {
            seed
        };

        let mut stream = Self {
            source,
            entry,
            sector_size,
            seed,
            base_seed,
            sectors: None,
            position: 0,
            cached_index: None,
            cache: Vec::new(),
            readable: true,
        };
        stream.validate()?;

        debug!(
            "opened file at {:#x}: {} -> {} bytes, flags {:?}, readable: {}",
            stream.entry.file_position,
            stream.entry.compressed_size,
            stream.entry.file_size,
            stream.entry.flags,
            stream.readable,
        );
        Ok(stream)
    }

    /// Open a standalone payload, taking ownership of the reader.
    pub fn from_reader(reader: R, entry: FileEntry, sector_size: usize) -> Result<Self> {
        Self::open(Arc::new(Mutex::new(reader)), entry, sector_size)
    }

    /// Logical file length in bytes.
    ///
    /// Like reads and seeks, this is refused on an unreadable stream.
    pub fn len(&self) -> Result<u64> {
        self.ensure_readable()?;
        Ok(self.file_size())
    }

    pub(crate) fn file_size(&self) -> u64 {
        u64::from(self.entry.file_size)
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether open-time validation succeeded. When `false` the stream is
    /// inert and every read or seek fails with [`Error::NotSupported`].
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    /// The entry this stream was opened over.
    pub fn entry(&self) -> &FileEntry {
        &self.entry
    }

    /// Sector size the stream was opened with.
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// The position-adjusted encryption key, possibly recovered at open
    /// time; 0 when unknown.
    pub fn encryption_seed(&self) -> u32 {
        self.seed
    }

    /// The pre-adjustment encryption key, possibly recovered at open time;
    /// 0 when unknown.
    pub fn base_encryption_seed(&self) -> u32 {
        self.base_seed
    }

    /// Read the next byte, or `None` at end of file.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let read = self.read_internal(&mut byte)?;
        Ok(if read == 0 { None } else { Some(byte[0]) })
    }

    /// Copy the stored payload (still compressed/encrypted) verbatim.
    ///
    /// Available regardless of readability, so archive re-packers can pass
    /// through files they cannot decode.
    pub fn copy_raw_to<W: Write>(&self, sink: &mut W) -> Result<u64> {
        let total = u64::from(self.entry.compressed_size);
        let mut source = self.source.lock();
        source.seek(SeekFrom::Start(self.entry.file_position))?;

        let mut buf = [0u8; 8192];
        let mut remaining = total;
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            let read = source.read(&mut buf[..chunk])?;
            if read == 0 {
                return Err(Error::TruncatedData {
                    expected: total as usize,
                    actual: (total - remaining) as usize,
                });
            }
            sink.write_all(&buf[..read])?;
            remaining -= read as u64;
        }
        Ok(total)
    }

    fn ensure_readable(&self) -> Result<()> {
        if self.readable {
            Ok(())
        } else {
            Err(Error::NotSupported("stream failed open-time validation"))
        }
    }

    /// Read `len` bytes at `offset` into the payload, under the shared
    /// stream's lock.
    fn read_raw(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut source = self.source.lock();
        source.seek(SeekFrom::Start(self.entry.file_position + offset))?;

        let mut filled = 0;
        while filled < len {
            let read = source.read(&mut buf[filled..])?;
            if read == 0 {
                return Err(Error::TruncatedData {
                    expected: len,
                    actual: filled,
                });
            }
            filled += read;
        }
        Ok(buf)
    }

    fn expected_sector_len(&self, index: usize) -> usize {
        let start = index * self.sector_size;
        (self.entry.file_size as usize - start).min(self.sector_size)
    }

    fn data_sector_count(&self) -> usize {
        (self.entry.file_size as usize).div_ceil(self.sector_size)
    }

    // Open-time validation.

    fn validate(&mut self) -> Result<()> {
        if self.entry.is_single_unit() {
            self.validate_single_unit()
        } else if self.entry.is_compressed() {
            self.validate_sector_table()
        } else {
            if self.entry.is_encrypted() && self.entry.file_size >= 4 && self.seed == 0 {
                debug!("plain encrypted file with no key; marking unreadable");
                self.readable = false;
            }
            Ok(())
        }
    }

    fn validate_single_unit(&mut self) -> Result<()> {
        if self.entry.is_encrypted() && self.entry.file_size >= 4 && self.base_seed == 0 {
            debug!("encrypted single unit with no key; marking unreadable");
            self.readable = false;
            return Ok(());
        }

        let stored = self.entry.compressed_size as usize;
        if self.entry.flags.contains(FileFlags::COMPRESS)
            && stored != self.entry.file_size as usize
            && stored > 0
        {
            let peek_len = stored.min(4);
            let raw = self.read_raw(0, peek_len)?;
            let method = if self.entry.is_encrypted() && peek_len == 4 {
                let word = LittleEndian::read_u32(&raw);
                (decrypt_dword(word, self.base_seed) & 0xFF) as u8
            } else {
                raw[0]
            };

            if !compression::is_supported(method) {
                debug!("single unit uses unknown compression {method:#04x}; marking unreadable");
                self.readable = false;
            }
        }
        Ok(())
    }

    fn validate_sector_table(&mut self) -> Result<()> {
        let count = SectorTable::entry_count(
            self.entry.file_size,
            self.sector_size,
            self.entry.has_sector_crc(),
        );
        let mut raw = self.read_raw(0, count * 4)?;

        if self.entry.is_encrypted() {
            if self.seed == 0 {
                if raw.len() < 8 {
                    debug!("sector table too small for key recovery; marking unreadable");
                    self.readable = false;
                    return Ok(());
                }

                let expected_first = SectorTable::expected_first(count);
                let max_second = expected_first + self.sector_size as u32;
                let recovered = detect_file_key(
                    LittleEndian::read_u32(&raw[0..4]),
                    LittleEndian::read_u32(&raw[4..8]),
                    expected_first,
                    max_second,
                );

                match recovered {
                    Ok(key) => {
                        self.seed = key;
                        self.base_seed = if self.entry.flags.contains(FileFlags::FIX_KEY) {
                            unadjust_key(key, self.entry.file_position as u32, self.entry.file_size)
                        } else {
                            key
                        };
                        debug!("recovered encryption key {key:#010x} from sector table");
                    }
                    Err(_) => {
                        debug!("encryption key unrecoverable; marking unreadable");
                        self.readable = false;
                        return Ok(());
                    }
                }
            }
            decrypt_block(&mut raw, self.seed.wrapping_sub(1));
        }

        let table = SectorTable::parse(&raw, count)?;
        if !table.validate(self.sector_size) {
            debug!("sector table failed validation; marking unreadable");
            self.readable = false;
            return Ok(());
        }

        if self.entry.flags.contains(FileFlags::COMPRESS) {
            for index in 0..self.data_sector_count() {
                let Some((offset, stored_len)) = table.sector_range(index) else {
                    debug!("sector table has no entry for sector {index}; marking unreadable");
                    self.readable = false;
                    return Ok(());
                };
                if stored_len == self.expected_sector_len(index) {
                    // Stored verbatim, no compression byte to check.
                    continue;
                }

                let peek_len = stored_len.min(4);
                let peek = self.read_raw(offset, peek_len)?;
                let method = if self.entry.is_encrypted() && peek_len == 4 {
                    let word = LittleEndian::read_u32(&peek);
                    (decrypt_dword(word, self.seed.wrapping_add(index as u32)) & 0xFF) as u8
                } else {
                    peek[0]
                };

                if !compression::is_supported(method) {
                    debug!(
                        "sector {index} uses unknown compression {method:#04x}; marking unreadable"
                    );
                    self.readable = false;
                    return Ok(());
                }
            }
        }

        self.sectors = Some(table);
        Ok(())
    }

    // Lazy loading.

    fn load_sector(&mut self, index: usize) -> Result<()> {
        let expected = self.expected_sector_len(index);
        let (offset, stored_len) = match &self.sectors {
            Some(table) => table.sector_range(index).ok_or_else(|| {
                Error::CorruptData(format!("no offset table entry for sector {index}"))
            })?,
            None => ((index * self.sector_size) as u64, expected),
        };

        trace!("loading sector {index}: {stored_len} stored bytes at payload offset {offset}");
        let mut raw = self.read_raw(offset, stored_len)?;

        if self.entry.is_encrypted() {
            if self.seed == 0 && self.entry.file_size >= 4 {
                return Err(Error::MissingEncryptionKey);
            }
            if raw.len() >= 4 {
                decrypt_block(&mut raw, self.seed.wrapping_add(index as u32));
            }
        }

        let data = if self.entry.is_compressed() && stored_len != expected {
            if self.entry.flags.contains(FileFlags::COMPRESS) {
                compression::decompress(&raw, expected)?
            } else {
                compression::pkware::decompress(&raw, expected)?
            }
        } else {
            raw
        };

        if data.len() != expected {
            return Err(Error::CorruptData(format!(
                "sector {index} decoded to {} bytes, expected {expected}",
                data.len()
            )));
        }

        self.cache = data;
        self.cached_index = Some(index);
        Ok(())
    }

    fn load_single_unit(&mut self) -> Result<()> {
        let stored = self.entry.compressed_size as usize;
        let expected = self.entry.file_size as usize;

        trace!("loading single unit: {stored} stored bytes");
        let mut raw = self.read_raw(0, stored)?;

        if self.entry.is_encrypted() {
            if self.base_seed == 0 && self.entry.file_size >= 4 {
                return Err(Error::MissingEncryptionKey);
            }
            if raw.len() >= 4 {
                decrypt_block(&mut raw, self.base_seed);
            }
        }

        let data = if self.entry.is_compressed() && stored != expected {
            if self.entry.flags.contains(FileFlags::COMPRESS) {
                compression::decompress(&raw, expected)?
            } else {
                compression::pkware::decompress(&raw, expected)?
            }
        } else {
            raw
        };

        if data.len() != expected {
            return Err(Error::CorruptData(format!(
                "single unit decoded to {} bytes, expected {expected}",
                data.len()
            )));
        }

        self.cache = data;
        self.cached_index = Some(0);
        Ok(())
    }

    pub(crate) fn read_internal(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_readable()?;

        let file_size = self.file_size();
        let mut total = 0;
        while total < buf.len() && self.position < file_size {
            let (index, cache_offset) = if self.entry.is_single_unit() {
                (0, self.position as usize)
            } else {
                (
                    self.position as usize / self.sector_size,
                    self.position as usize % self.sector_size,
                )
            };

            if self.cached_index != Some(index) {
                if self.entry.is_single_unit() {
                    self.load_single_unit()?;
                } else {
                    self.load_sector(index)?;
                }
            }

            let available = self.cache.len() - cache_offset;
            let to_copy = available.min(buf.len() - total);
            buf[total..total + to_copy]
                .copy_from_slice(&self.cache[cache_offset..cache_offset + to_copy]);
            self.position += to_copy as u64;
            total += to_copy;
        }
        Ok(total)
    }
}

impl<R: Read + Seek> Read for MpqStream<R> {
    /// Reads across sector boundaries until the buffer is full or the end
    /// of the file is reached.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_internal(buf).map_err(Into::into)
    }
}

impl<R: Read + Seek> Seek for MpqStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.ensure_readable().map_err(std::io::Error::from)?;

        let file_size = i128::from(self.file_size());
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => file_size + i128::from(delta),
        };

        if target < 0 || target > file_size {
            return Err(Error::NotSupported("seek outside the file").into());
        }

        self.position = target as u64;
        Ok(self.position)
    }
}
