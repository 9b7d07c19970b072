// vidsme_bridge/upstream_crypto/src/lib.rs

//! Request signing for the upstream image-generation API.

pub mod der;
pub mod error;
pub mod models;
pub mod rsa;
pub mod signature;
pub mod symmetric;

pub use der::PublicKeyMaterial;
pub use error::{CryptoError, Result};
pub use models::SignaturePayload;
pub use rsa::{encrypt_pkcs1_v1_5, max_message_len};
pub use signature::{EphemeralKey, RequestSigner, SignerConfig};
pub use symmetric::encrypt_cbc_base64;
