//! Filename hashing and encryption key derivation.

use crate::table::CRYPT_TABLE;

/// The four hash variants, each selecting a 256-entry region of the
/// crypt table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// Bucket index into a hash table.
    TableOffset = 0,
    /// First verification hash of a filename.
    NameA = 1,
    /// Second verification hash of a filename.
    NameB = 2,
    /// Per-file encryption key.
    FileKey = 3,
}

/// Hash a string with the given variant.
///
/// Characters are uppercased before hashing, so lookups are
/// case-insensitive.
pub fn hash_string(input: &str, hash_type: HashType) -> u32 {
    let region = hash_type as usize * 256;

    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for ch in input.chars() {
        let ch = ch.to_ascii_uppercase() as u32;
        seed1 = CRYPT_TABLE[region + (ch & 0xFF) as usize] ^ seed1.wrapping_add(seed2);
        seed2 = ch
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

/// Derive the encryption key for a file from its full path.
///
/// Only the basename participates; both separator styles are accepted.
pub fn file_key(path: &str) -> u32 {
    let name = path
        .rsplit(|c| c == '\\' || c == '/')
        .next()
        .unwrap_or(path);
    hash_string(name, HashType::FileKey)
}

/// Derive the position-adjusted key used when the "fix key" flag is set.
pub fn adjust_key(key: u32, file_position: u32, file_size: u32) -> u32 {
    key.wrapping_add(file_position) ^ file_size
}

/// Invert [`adjust_key`], recovering the base key from an adjusted one.
pub fn unadjust_key(key: u32, file_position: u32, file_size: u32) -> u32 {
    (key ^ file_size).wrapping_sub(file_position)
}
