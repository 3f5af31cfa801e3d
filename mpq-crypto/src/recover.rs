//! Brute-force key recovery from an encrypted sector offset table.
//!
//! A multi-sector compressed file starts with its sector offset table, and
//! the first table entry always equals the table's own byte size. That known
//! plaintext pins the cipher state down to 256 candidates (one per possible
//! low key byte), which are each checked against the second entry.

use tracing::{debug, trace};

use crate::error::CryptoError;
use crate::table::{CIPHER_REGION, CRYPT_TABLE};
use crate::Result;

/// Attempt to recover a file's encryption key from the first two encrypted
/// words of its sector offset table.
///
/// `expected_first` is the known plaintext of the first word (four times the
/// table entry count); `max_second` bounds the second word (first entry plus
/// one sector's worth of bytes). The sector table itself is encrypted with
/// `file_key - 1`, so on success the returned value is the recovered table
/// key plus one: the file key.
pub fn detect_file_key(
    encrypted_first: u32,
    encrypted_second: u32,
    expected_first: u32,
    max_second: u32,
) -> Result<u32> {
    // encrypted ^ plain == key + 0xEEEEEEEE + table[0x400 + (key & 0xFF)]
    let key_plus_entry = (encrypted_first ^ expected_first).wrapping_sub(0xEEEE_EEEE);

    for low_byte in 0u32..256 {
        let candidate = key_plus_entry.wrapping_sub(CRYPT_TABLE[CIPHER_REGION + low_byte as usize]);
        if candidate & 0xFF != low_byte {
            continue;
        }

        // Replay the cipher over the first word, then decrypt the second
        // and test it against the bound.
        let mut seed2 =
            0xEEEE_EEEEu32.wrapping_add(CRYPT_TABLE[CIPHER_REGION + low_byte as usize]);
        let first = encrypted_first ^ candidate.wrapping_add(seed2);
        if first != expected_first {
            continue;
        }

        let seed1 = ((!candidate << 0x15).wrapping_add(0x1111_1111)) | (candidate >> 0x0B);
        seed2 = first
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
        seed2 = seed2.wrapping_add(CRYPT_TABLE[CIPHER_REGION + (seed1 & 0xFF) as usize]);

        let second = encrypted_second ^ seed1.wrapping_add(seed2);
        trace!("key candidate {candidate:#010x}: second word {second:#010x}");
        if second <= max_second {
            let file_key = candidate.wrapping_add(1);
            debug!("recovered file key {file_key:#010x}");
            return Ok(file_key);
        }
    }

    debug!("no key candidate matched the sector table");
    Err(CryptoError::KeyRecoveryFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::encrypt_block;

    fn encrypted_table_words(offsets: &[u32], table_key: u32) -> (u32, u32) {
        let mut bytes = Vec::new();
        for off in offsets {
            bytes.extend_from_slice(&off.to_le_bytes());
        }
        encrypt_block(&mut bytes, table_key);
        (
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        )
    }

    #[test]
    fn test_recovers_known_key() {
        let file_key = crate::hash::file_key("war3map.w3e");
        let offsets = [16u32, 2048, 5000, 7000];
        let (enc0, enc1) = encrypted_table_words(&offsets, file_key.wrapping_sub(1));

        let recovered = detect_file_key(enc0, enc1, 16, 4096 + 16).unwrap();
        assert_eq!(recovered, file_key);
    }

    #[test]
    fn test_rejects_implausible_second_word() {
        let file_key: u32 = 0x1357_9BDF;
        // Second offset far beyond one sector's worth of data.
        let offsets = [16u32, 0x7FFF_FFFF, 0x7FFF_FFFF, 0x7FFF_FFFF];
        let (enc0, enc1) = encrypted_table_words(&offsets, file_key.wrapping_sub(1));

        assert!(detect_file_key(enc0, enc1, 16, 4096 + 16).is_err());
    }

    #[test]
    fn test_recovery_over_many_keys() {
        for key in [1u32, 0xFF, 0xDEAD_BEEF, 0x8000_0001, 0x0BAD_F00D] {
            let offsets = [12u32, 1000, 2000];
            let (enc0, enc1) = encrypted_table_words(&offsets, key.wrapping_sub(1));
            let recovered = detect_file_key(enc0, enc1, 12, 4096 + 12)
                .expect("key should be recoverable");
            // A colliding candidate may be found first, but it must at
            // least decrypt the known plaintext identically.
            let mut probe = Vec::new();
            for off in &offsets {
                probe.extend_from_slice(&off.to_le_bytes());
            }
            encrypt_block(&mut probe, key.wrapping_sub(1));
            crate::block::decrypt_block(&mut probe, recovered.wrapping_sub(1));
            assert_eq!(
                u32::from_le_bytes([probe[0], probe[1], probe[2], probe[3]]),
                12
            );
        }
    }
}
