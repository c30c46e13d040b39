//! VNC authentication primitives.
//!
//! VNC authentication is DES with one twist: each key byte is used with its
//! bit order reversed. The same cipher, keyed with a fixed well-known key,
//! obfuscates passwords stored on disk.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use des::Des;

/// Size of the server's random challenge.
pub const CHALLENGE_SIZE: usize = 16;

/// Only this many password bytes take part in the DES key.
pub const MAX_PASSWORD_LEN: usize = 8;

/// Key used to obfuscate password files, before bit reversal.
const FIXED_KEY: [u8; 8] = [23, 82, 107, 6, 35, 78, 88, 7];

/// Build a DES cipher from up to eight key bytes, zero padded and with each
/// byte's bit order reversed.
fn vnc_cipher(key_bytes: &[u8]) -> Des {
    let mut key = [0u8; 8];
    for (slot, b) in key.iter_mut().zip(key_bytes.iter().take(MAX_PASSWORD_LEN)) {
        *slot = b.reverse_bits();
    }
    Des::new(&GenericArray::from(key))
}

/// Encrypt the server challenge with the password as key.
///
/// The password is truncated to [`MAX_PASSWORD_LEN`] bytes; shorter passwords
/// are padded with zeros.
pub fn encrypt_challenge(challenge: &[u8; CHALLENGE_SIZE], password: &str) -> [u8; CHALLENGE_SIZE] {
    let cipher = vnc_cipher(password.as_bytes());
    let mut response = *challenge;
    for block in response.chunks_exact_mut(8) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    response
}

/// Obfuscate a password into the 8-byte form kept in password files.
pub fn obfuscate_password(password: &str) -> [u8; 8] {
    let mut block = [0u8; 8];
    for (slot, b) in block.iter_mut().zip(password.bytes().take(MAX_PASSWORD_LEN)) {
        *slot = b;
    }
    vnc_cipher(&FIXED_KEY).encrypt_block(GenericArray::from_mut_slice(&mut block));
    block
}

/// Recover a password from its obfuscated form. Decoding stops at the first
/// NUL byte.
pub fn reveal_password(obfuscated: &[u8; 8]) -> String {
    let mut block = *obfuscated;
    vnc_cipher(&FIXED_KEY).decrypt_block(GenericArray::from_mut_slice(&mut block));
    let end = block.iter().position(|&b| b == 0).unwrap_or(block.len());
    String::from_utf8_lossy(&block[..end]).into_owned()
}
