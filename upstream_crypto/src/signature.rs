// vidsme_bridge/upstream_crypto/src/signature.rs

//! Per-request signature for the upstream image API.
//!
//! 1. A fresh 16-character ephemeral key is drawn.
//! 2. The key is RSA-wrapped under the upstream public key (`secret_key`).
//! 3. `app_id:salt:t:nonce:secret_key` is AES-CBC encrypted under the
//!    ephemeral key (`sign`).
//!
//! Only the holder of the private key can recover the ephemeral key and
//! check `sign`. A payload must never be reused for a second request.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use tracing::debug;

use crate::der::PublicKeyMaterial;
use crate::error::Result;
use crate::models::SignaturePayload;
use crate::rsa::encrypt_pkcs1_v1_5_with_rng;
use crate::symmetric::{encrypt_cbc_base64, KEY_LEN};

pub const UPSTREAM_APP_ID: &str = "chatsweetie";
pub const UPSTREAM_STATIC_SALT: &str = "NHGNy5YFz7HeFb";
pub const UPSTREAM_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQDa2oPxMZe71V4dw2r8rHWt59gH
W5INRmlhepe6GUanrHykqKdlIB4kcJiu8dHC/FJeppOXVoKz82pvwZCmSUrF/1yr
rnmUDjqUefDu8myjhcbio6CnG5TtQfwN2pz3g6yHkLgp8cFfyPSWwyOCMMMsTU9s
snOjvdDb4wiZI8x3UwIDAQAB
-----END PUBLIC KEY-----";

/// Single-use alphanumeric key, used as both AES key and IV.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralKey(String);

impl EphemeralKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let key: String = (0..KEY_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect();
        EphemeralKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralKey(<redacted>)")
    }
}

/// Static inputs of the signing protocol.
#[derive(Clone, Debug)]
pub struct SignerConfig {
    pub app_id: String,
    pub static_salt: String,
    pub public_key_pem: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        SignerConfig {
            app_id: UPSTREAM_APP_ID.to_string(),
            static_salt: UPSTREAM_STATIC_SALT.to_string(),
            public_key_pem: UPSTREAM_PUBLIC_KEY_PEM.to_string(),
        }
    }
}

/// Produces [`SignaturePayload`]s. The public key is parsed once at construction.
#[derive(Clone, Debug)]
pub struct RequestSigner {
    app_id: String,
    static_salt: String,
    public_key: PublicKeyMaterial,
}

impl RequestSigner {
    pub fn new(config: &SignerConfig) -> Result<Self> {
        let public_key = PublicKeyMaterial::from_pem(&config.public_key_pem)?;
        debug!(
            modulus_bits = public_key.modulus.bits(),
            "parsed upstream public key"
        );
        Ok(RequestSigner {
            app_id: config.app_id.clone(),
            static_salt: config.static_salt.clone(),
            public_key,
        })
    }

    pub fn public_key(&self) -> &PublicKeyMaterial {
        &self.public_key
    }

    /// Signs one request issued at `unix_seconds`.
    pub fn sign(&self, unix_seconds: u64) -> Result<SignaturePayload> {
        self.sign_with_rng(unix_seconds, &mut OsRng)
    }

    pub fn sign_with_rng<R: RngCore + CryptoRng>(
        &self,
        unix_seconds: u64,
        rng: &mut R,
    ) -> Result<SignaturePayload> {
        let ephemeral = EphemeralKey::generate(rng);

        let wrapped =
            encrypt_pkcs1_v1_5_with_rng(&self.public_key, ephemeral.as_str().as_bytes(), rng)?;
        let secret_key = STANDARD.encode(wrapped);

        let t = unix_seconds.to_string();
        let mut nonce_bytes = [0u8; 16];
        rng.fill_bytes(&mut nonce_bytes);
        let nonce = uuid::Builder::from_random_bytes(nonce_bytes)
            .into_uuid()
            .to_string();

        let message = format!(
            "{}:{}:{}:{}:{}",
            self.app_id, self.static_salt, t, nonce, secret_key
        );
        let sign = encrypt_cbc_base64(&message, ephemeral.as_str())?;

        Ok(SignaturePayload {
            app_id: self.app_id.clone(),
            t,
            nonce,
            sign,
            secret_key,
        })
    }
}
