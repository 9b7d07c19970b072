// vidsme_bridge/upstream_crypto/src/rsa.rs

use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::der::PublicKeyMaterial;
use crate::error::{CryptoError, Result};

/// `0x00 || 0x02 || PS || 0x00` framing overhead of PKCS#1 v1.5 encryption.
pub const PKCS1_V1_5_OVERHEAD: usize = 11;

/// Largest message that fits into one block of a `k`-byte modulus.
pub fn max_message_len(k: usize) -> usize {
    k.saturating_sub(PKCS1_V1_5_OVERHEAD)
}

/// Builds `0x00 || 0x02 || PS || 0x00 || M` with a non-zero random `PS`.
fn eme_pkcs1_v1_5_encode<R: RngCore + CryptoRng>(
    message: &[u8],
    k: usize,
    rng: &mut R,
) -> Result<Vec<u8>> {
    if k < PKCS1_V1_5_OVERHEAD {
        return Err(CryptoError::Encryption(format!(
            "modulus of {} bytes is too small for PKCS#1 v1.5",
            k
        )));
    }
    if message.len() > max_message_len(k) {
        return Err(CryptoError::Encryption(format!(
            "message of {} bytes exceeds the {}-byte limit for a {}-byte modulus",
            message.len(),
            max_message_len(k),
            k
        )));
    }

    let ps_len = k - 3 - message.len();
    let mut ps = vec![0u8; ps_len];
    rng.fill_bytes(&mut ps);
    for byte in ps.iter_mut() {
        while *byte == 0 {
            let mut redraw = [0u8; 1];
            rng.fill_bytes(&mut redraw);
            *byte = redraw[0];
        }
    }

    let mut em = Vec::with_capacity(k);
    em.push(0x00);
    em.push(0x02);
    em.extend_from_slice(&ps);
    em.push(0x00);
    em.extend_from_slice(message);
    debug_assert_eq!(em.len(), k);
    Ok(em)
}

/// Serializes `value` as exactly `k` big-endian bytes, left-padded with zeros.
fn i2osp(value: &BigUint, k: usize) -> Result<Vec<u8>> {
    let bytes = value.to_bytes_be();
    if bytes.len() > k {
        return Err(CryptoError::Encryption(format!(
            "integer needs {} bytes, block is {}",
            bytes.len(),
            k
        )));
    }
    let mut out = vec![0u8; k - bytes.len()];
    out.extend_from_slice(&bytes);
    Ok(out)
}

/// RSAES-PKCS1-v1_5 encryption. Output is always exactly `k` bytes.
pub fn encrypt_pkcs1_v1_5_with_rng<R: RngCore + CryptoRng>(
    key: &PublicKeyMaterial,
    message: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>> {
    let k = key.block_len();
    let em = eme_pkcs1_v1_5_encode(message, k, rng)?;
    let m = BigUint::from_bytes_be(&em);
    if m >= key.modulus {
        return Err(CryptoError::Encryption(
            "encoded message is not smaller than the modulus".to_string(),
        ));
    }
    let c = m.modpow(&key.exponent, &key.modulus);
    i2osp(&c, k)
}

pub fn encrypt_pkcs1_v1_5(key: &PublicKeyMaterial, message: &[u8]) -> Result<Vec<u8>> {
    encrypt_pkcs1_v1_5_with_rng(key, message, &mut OsRng)
}
