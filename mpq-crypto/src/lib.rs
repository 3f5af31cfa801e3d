//! Encryption and decryption support for MPQ archive files.
//!
//! This crate provides:
//! - The MPQ symmetric block cipher over 32-bit little-endian words
//! - Filename hashing and per-file key derivation
//! - Position-adjusted ("fix key") key computation and its inverse
//! - Brute-force key recovery from an encrypted sector offset table

pub mod block;
pub mod error;
pub mod hash;
pub mod recover;
pub mod table;

pub use block::{decrypt_block, decrypt_dword, encrypt_block};
pub use error::CryptoError;
pub use hash::{HashType, adjust_key, file_key, hash_string, unadjust_key};
pub use recover::detect_file_key;

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
