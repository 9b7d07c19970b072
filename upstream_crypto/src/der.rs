// vidsme_bridge/upstream_crypto/src/der.rs

//! Minimal DER reader for an RSA `SubjectPublicKeyInfo`.
//!
//! Only the exact shape used by the upstream key is accepted:
//!
//! ```text
//! SEQUENCE {
//!     SEQUENCE { algorithm OID, parameters }   -- skipped
//!     BIT STRING {
//!         SEQUENCE { INTEGER modulus, INTEGER exponent }
//!     }
//! }
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::{CryptoError, Result};

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_SEQUENCE: u8 = 0x30;

const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_FOOTER: &str = "-----END PUBLIC KEY-----";

/// `AlgorithmIdentifier { rsaEncryption, NULL }`, used when re-exporting.
const RSA_ALGORITHM_IDENTIFIER: [u8; 15] = [
    0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];

/// RSA public key components recovered from the DER structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyMaterial {
    pub modulus: BigUint,
    pub exponent: BigUint,
}

impl PublicKeyMaterial {
    pub fn new(modulus: BigUint, exponent: BigUint) -> Result<Self> {
        if modulus.is_zero() || exponent.is_zero() {
            return Err(CryptoError::Parse(
                "modulus and exponent must be strictly positive".to_string(),
            ));
        }
        Ok(PublicKeyMaterial { modulus, exponent })
    }

    /// Parses a PEM-armored `SubjectPublicKeyInfo`.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let der = pem_to_der(pem)?;
        Self::from_der(&der)
    }

    /// Parses a DER-encoded `SubjectPublicKeyInfo`.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let mut outer = DerReader::new(der);
        let spki = outer.read_tlv(TAG_SEQUENCE, "SubjectPublicKeyInfo")?;
        outer.expect_end("SubjectPublicKeyInfo")?;

        let mut spki = DerReader::new(spki);
        // The algorithm identifier is skipped by its declared length.
        spki.read_tlv(TAG_SEQUENCE, "AlgorithmIdentifier")?;
        let bit_string = spki.read_tlv(TAG_BIT_STRING, "subjectPublicKey")?;
        spki.expect_end("SubjectPublicKeyInfo")?;

        let (&unused_bits, key_bytes) = bit_string
            .split_first()
            .ok_or_else(|| CryptoError::Parse("empty BIT STRING".to_string()))?;
        if unused_bits != 0 {
            return Err(CryptoError::Parse(format!(
                "BIT STRING declares {} unused bits",
                unused_bits
            )));
        }

        let mut key = DerReader::new(key_bytes);
        let rsa_key = key.read_tlv(TAG_SEQUENCE, "RSAPublicKey")?;
        key.expect_end("BIT STRING")?;

        let mut rsa_key = DerReader::new(rsa_key);
        let modulus = rsa_key.read_unsigned_integer("modulus")?;
        let exponent = rsa_key.read_unsigned_integer("exponent")?;
        rsa_key.expect_end("RSAPublicKey")?;

        Self::new(modulus, exponent)
    }

    /// Byte length `k` of the modulus, i.e. the RSA block size.
    pub fn block_len(&self) -> usize {
        ((self.modulus.bits() + 7) / 8) as usize
    }

    /// Re-encodes the key as a DER `SubjectPublicKeyInfo`.
    pub fn to_der(&self) -> Vec<u8> {
        let mut rsa_key = encode_integer(&self.modulus);
        rsa_key.extend(encode_integer(&self.exponent));
        let rsa_key = encode_tlv(TAG_SEQUENCE, &rsa_key);

        let mut bit_string = Vec::with_capacity(rsa_key.len() + 1);
        bit_string.push(0x00);
        bit_string.extend(rsa_key);

        let mut spki = RSA_ALGORITHM_IDENTIFIER.to_vec();
        spki.extend(encode_tlv(TAG_BIT_STRING, &bit_string));
        encode_tlv(TAG_SEQUENCE, &spki)
    }

    pub fn to_pem(&self) -> String {
        let body = STANDARD.encode(self.to_der());
        let mut pem = String::from(PEM_HEADER);
        pem.push('\n');
        for line in body.as_bytes().chunks(64) {
            // base64 output is ASCII
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str(PEM_FOOTER);
        pem
    }
}

/// Strips the PEM armor and whitespace and decodes the base64 body.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let body: String = pem
        .replace(PEM_HEADER, "")
        .replace(PEM_FOOTER, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Err(CryptoError::Pem("no key material between armor lines".to_string()));
    }
    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::Pem(e.to_string()))
}

/// Cursor over a DER buffer. Every read is bounds checked.
struct DerReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> DerReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        DerReader { bytes, offset: 0 }
    }

    fn read_byte(&mut self, what: &str) -> Result<u8> {
        let byte = *self.bytes.get(self.offset).ok_or_else(|| {
            CryptoError::Parse(format!("unexpected end of input while reading {}", what))
        })?;
        self.offset += 1;
        Ok(byte)
    }

    /// Short form (`< 0x80`) or long form (`0x80 | n` followed by `n` bytes).
    fn read_length(&mut self, what: &str) -> Result<usize> {
        let first = self.read_byte(what)?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }

        let count = (first & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<u32>() {
            return Err(CryptoError::Parse(format!(
                "unsupported length encoding 0x{:02x} for {}",
                first, what
            )));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.read_byte(what)? as usize;
        }
        Ok(len)
    }

    /// Reads one tag/length/value triple and returns the value bytes.
    fn read_tlv(&mut self, expected_tag: u8, what: &str) -> Result<&'a [u8]> {
        let tag = self.read_byte(what)?;
        if tag != expected_tag {
            return Err(CryptoError::Parse(format!(
                "expected tag 0x{:02x} for {}, found 0x{:02x}",
                expected_tag, what, tag
            )));
        }
        let len = self.read_length(what)?;
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                CryptoError::Parse(format!(
                    "{} declares {} bytes but only {} remain",
                    what,
                    len,
                    self.bytes.len() - self.offset
                ))
            })?;
        let value = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(value)
    }

    fn read_unsigned_integer(&mut self, what: &str) -> Result<BigUint> {
        let mut value = self.read_tlv(TAG_INTEGER, what)?;
        match value.first() {
            None => {
                return Err(CryptoError::Parse(format!("empty INTEGER for {}", what)));
            }
            // Sign byte that keeps a high-bit value non-negative.
            Some(0x00) => value = &value[1..],
            Some(b) if b & 0x80 != 0 => {
                return Err(CryptoError::Parse(format!("negative INTEGER for {}", what)));
            }
            Some(_) => {}
        }
        Ok(BigUint::from_bytes_be(value))
    }

    fn expect_end(&self, what: &str) -> Result<()> {
        if self.offset != self.bytes.len() {
            return Err(CryptoError::Parse(format!(
                "{} trailing bytes after {}",
                self.bytes.len() - self.offset,
                what
            )));
        }
        Ok(())
    }
}

fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|b| *b == 0)
        .collect();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0x80 | bytes.len() as u8);
    out.extend(bytes);
    out
}

fn encode_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_length(value.len()));
    out.extend_from_slice(value);
    out
}

fn encode_integer(value: &BigUint) -> Vec<u8> {
    let mut bytes = value.to_bytes_be();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    encode_tlv(TAG_INTEGER, &bytes)
}
