//! Compression and decompression for sector payloads.
//!
//! A compressed sector starts with a one-byte bit-set naming the codecs
//! that were applied; decompression undoes them outermost-first. The set
//! of meaningful combinations is closed and small, so dispatch is a plain
//! `match` over the byte.

pub mod adpcm;
pub mod huffman;
pub mod pkware;

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tracing::trace;

use crate::error::{Error, Result};

/// Compression flag byte constants.
pub mod flags {
    /// Adaptive Huffman coding.
    pub const HUFFMAN: u8 = 0x01;
    /// zlib (deflate with zlib wrapper).
    pub const ZLIB: u8 = 0x02;
    /// PKWARE DCL implode.
    pub const PKWARE: u8 = 0x08;
    /// bzip2.
    pub const BZIP2: u8 = 0x10;
    /// LZMA. A literal byte value, not a bit combination; unimplemented.
    pub const LZMA: u8 = 0x12;
    /// Sparse/RLE. Unimplemented.
    pub const SPARSE: u8 = 0x20;
    /// IMA ADPCM, one channel.
    pub const ADPCM_MONO: u8 = 0x40;
    /// IMA ADPCM, two channels.
    pub const ADPCM_STEREO: u8 = 0x80;
}

const HUFFMAN_ADPCM_MONO: u8 = flags::HUFFMAN | flags::ADPCM_MONO;
const HUFFMAN_ADPCM_STEREO: u8 = flags::HUFFMAN | flags::ADPCM_STEREO;
const PKWARE_ADPCM_MONO: u8 = flags::PKWARE | flags::ADPCM_MONO;
const PKWARE_ADPCM_STEREO: u8 = flags::PKWARE | flags::ADPCM_STEREO;

/// Whether a compression byte names a pipeline this crate can decode.
///
/// This is the predicate open-time validation uses when peeking at sector
/// headers; it accepts exactly the combinations [`decompress`] handles.
pub fn is_supported(method: u8) -> bool {
    matches!(
        method,
        flags::HUFFMAN
            | flags::ZLIB
            | flags::PKWARE
            | flags::BZIP2
            | flags::ADPCM_MONO
            | flags::ADPCM_STEREO
            | HUFFMAN_ADPCM_MONO
            | HUFFMAN_ADPCM_STEREO
            | PKWARE_ADPCM_MONO
            | PKWARE_ADPCM_STEREO
    )
}

/// Decompress a multi-codec sector.
///
/// `data` starts with the compression byte; the decoded output must be
/// exactly `expected_size` bytes.
pub fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(Error::TruncatedData {
            expected: 1,
            actual: 0,
        });
    }

    let method = data[0];
    let payload = &data[1..];
    trace!("decompressing {} bytes with method {method:#04x}", payload.len());

    let output = match method {
        flags::HUFFMAN => huffman::decompress(payload)?,
        flags::ZLIB => zlib_decompress(payload)?,
        flags::PKWARE => pkware::explode(payload)?,
        flags::BZIP2 => bzip2_decompress(payload)?,
        flags::ADPCM_MONO => adpcm::decompress(payload, 1)?,
        flags::ADPCM_STEREO => adpcm::decompress(payload, 2)?,
        HUFFMAN_ADPCM_MONO => adpcm::decompress(&huffman::decompress(payload)?, 1)?,
        HUFFMAN_ADPCM_STEREO => adpcm::decompress(&huffman::decompress(payload)?, 2)?,
        PKWARE_ADPCM_MONO => adpcm::decompress(&pkware::explode(payload)?, 1)?,
        PKWARE_ADPCM_STEREO => adpcm::decompress(&pkware::explode(payload)?, 2)?,
        other => return Err(Error::UnsupportedCompression(other)),
    };

    if output.len() != expected_size {
        return Err(Error::CorruptData(format!(
            "decompressed to {} bytes, expected {expected_size}",
            output.len()
        )));
    }

    Ok(output)
}

/// Compress a buffer with a single codec.
///
/// The output carries no compression byte; the caller prepends one only
/// when compression actually shrank the data. Re-encoding supports the
/// general-purpose codecs; the audio and PKWARE paths are decode-only.
pub fn compress(data: &[u8], method: u8) -> Result<Vec<u8>> {
    match method {
        flags::ZLIB => zlib_compress(data),
        flags::BZIP2 => bzip2_compress(data),
        other => Err(Error::UnsupportedCompression(other)),
    }
}

fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::CorruptData(format!("zlib: {e}")))?;
    Ok(output)
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(Error::Io)?;
    encoder.finish().map_err(Error::Io)
}

fn bzip2_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = bzip2::read::BzDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::CorruptData(format!("bzip2: {e}")))?;
    Ok(output)
}

fn bzip2_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).map_err(Error::Io)?;
    encoder.finish().map_err(Error::Io)
}
