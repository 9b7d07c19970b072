// vidsme_bridge/upstream_crypto/src/error.rs

use thiserror::Error;

/// Errors raised while building a request signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The PEM armor or its base64 body could not be decoded.
    #[error("Invalid PEM public key: {0}")]
    Pem(String),

    /// The DER structure did not match SubjectPublicKeyInfo / RSAPublicKey.
    #[error("Malformed DER public key: {0}")]
    Parse(String),

    /// The message does not fit into a single RSA block.
    #[error("RSA encryption failed: {0}")]
    Encryption(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
