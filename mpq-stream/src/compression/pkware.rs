//! PKWARE DCL decompression paths.
//!
//! Two distinct entry points exist: [`explode`] is the plain codec used
//! inside multi-codec sectors, while [`decompress`] is the whole-file path
//! selected by the IMPLODE storage flag. The whole-file path additionally
//! honors a historical escape: a three-zero-byte prefix introduces a
//! little-endian length word and a payload that is either raw or a nested
//! zlib stream.

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use super::flags;
use crate::error::{Error, Result};

/// Plain PKWARE DCL explode.
pub fn explode(data: &[u8]) -> Result<Vec<u8>> {
    ::explode::explode(data).map_err(|e| Error::CorruptData(format!("pkware explode: {e}")))
}

/// Decompress a whole-file PKWARE payload.
///
/// The escape layout is `00 00 00`, a 4-byte total stream length that must
/// equal the stored length, then either `expected_size` raw bytes (when the
/// declared length is `expected_size + 8`) or a codec byte introducing a
/// nested zlib stream.
pub fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    if data.len() >= 7 && data[0] == 0 && data[1] == 0 && data[2] == 0 {
        let declared = LittleEndian::read_u32(&data[3..7]) as usize;
        trace!("pkware escape prefix, declared length {declared}");
        if declared != data.len() {
            return Err(Error::CorruptData(format!(
                "pkware length header says {declared}, stream holds {}",
                data.len()
            )));
        }
        if data.len() < 8 {
            // A bare prefix-plus-length carries no payload at all.
            return Err(Error::CorruptData(format!(
                "pkware escape stream of {} bytes holds no payload",
                data.len()
            )));
        }

        if expected_size + 8 == declared {
            // Stored raw behind the length header.
            return Ok(data[7..7 + expected_size].to_vec());
        }

        let method = data[7];
        if method != flags::ZLIB {
            return Err(Error::UnsupportedCompression(method));
        }
        let mut decoder = flate2::read::ZlibDecoder::new(&data[8..]);
        let mut output = Vec::with_capacity(expected_size);
        std::io::Read::read_to_end(&mut decoder, &mut output)
            .map_err(|e| Error::CorruptData(format!("nested zlib: {e}")))?;
        return Ok(output);
    }

    explode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_escape_raw_payload() {
        let payload = b"raw bytes hiding behind the zero prefix";
        let mut data = vec![0u8, 0, 0];
        data.extend_from_slice(&((payload.len() + 8) as u32).to_le_bytes());
        data.extend_from_slice(payload);
        data.push(0); // trailing slack byte covered by the declared length

        assert_eq!(decompress(&data, payload.len()).unwrap(), payload);
    }

    #[test]
    fn test_escape_nested_zlib() {
        let payload = b"nested zlib stream behind the zero prefix, nested zlib stream";
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let total = 3 + 4 + 1 + compressed.len();
        let mut data = vec![0u8, 0, 0];
        data.extend_from_slice(&(total as u32).to_le_bytes());
        data.push(flags::ZLIB);
        data.extend_from_slice(&compressed);

        assert_eq!(decompress(&data, payload.len()).unwrap(), payload);
    }

    #[test]
    fn test_escape_stream_with_no_payload() {
        // Exactly the prefix and length word: the declared length matches,
        // but there is nothing behind it to interpret.
        let mut data = vec![0u8, 0, 0];
        data.extend_from_slice(&7u32.to_le_bytes());

        assert!(matches!(
            decompress(&data, 0),
            Err(Error::CorruptData(_))
        ));
    }

    #[test]
    fn test_escape_length_mismatch() {
        let mut data = vec![0u8, 0, 0];
        data.extend_from_slice(&999u32.to_le_bytes());
        data.extend_from_slice(b"short");

        assert!(matches!(
            decompress(&data, 5),
            Err(Error::CorruptData(_))
        ));
    }

    #[test]
    fn test_escape_unknown_nested_codec() {
        let total = 3 + 4 + 1 + 4;
        let mut data = vec![0u8, 0, 0];
        data.extend_from_slice(&(total as u32).to_le_bytes());
        data.push(flags::BZIP2);
        data.extend_from_slice(&[1, 2, 3, 4]);

        assert!(matches!(
            decompress(&data, 100),
            Err(Error::UnsupportedCompression(m)) if m == flags::BZIP2
        ));
    }

    #[test]
    fn test_garbage_implode_stream_is_corrupt() {
        // No zero prefix, so this goes straight to the explode codec.
        assert!(matches!(
            decompress(&[0xAB, 0xCD, 0xEF, 0x01], 16),
            Err(Error::CorruptData(_))
        ));
    }
}
