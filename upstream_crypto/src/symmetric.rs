// vidsme_bridge/upstream_crypto/src/symmetric.rs

//! AES-128-CBC with PKCS#7 padding, as expected by the upstream verifier.
//!
//! The upstream protocol uses the same 16 bytes as key *and* IV. That makes
//! the first ciphertext block a deterministic function of the key, which is
//! weaker than a random IV. It is kept as is because the verifier derives the
//! IV from the recovered key.

use aes::Aes128;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};

use crate::error::{CryptoError, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

pub const KEY_LEN: usize = 16;

/// Encrypts `plaintext` under `key`, reusing `key` as the IV.
pub fn encrypt_cbc(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "symmetric key must be {} bytes, got {}",
            KEY_LEN,
            key.len()
        )));
    }
    let cipher = Aes128CbcEnc::new_from_slices(key, key)
        .map_err(|e| CryptoError::Encryption(format!("cipher init failed: {}", e)))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Same as [`encrypt_cbc`], base64 encoded.
pub fn encrypt_cbc_base64(plaintext: &str, key: &str) -> Result<String> {
    let ciphertext = encrypt_cbc(plaintext.as_bytes(), key.as_bytes())?;
    Ok(STANDARD.encode(ciphertext))
}
