// vidsme_bridge/upstream_crypto/src/models.rs

use serde::{Deserialize, Serialize};

/// Authentication fields attached to every upstream call.
///
/// Each payload authenticates exactly one HTTP request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignaturePayload {
    pub app_id: String,     // Constant application id
    pub t: String,          // Unix seconds
    pub nonce: String,      // Random UUID
    pub sign: String,       // AES-CBC ciphertext (base64)
    pub secret_key: String, // RSA-wrapped ephemeral key (base64)
}

impl SignaturePayload {
    /// Query parameters in their stable wire order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("app_id", self.app_id.clone()),
            ("t", self.t.clone()),
            ("nonce", self.nonce.clone()),
            ("sign", self.sign.clone()),
            ("secret_key", self.secret_key.clone()),
        ]
    }
}
