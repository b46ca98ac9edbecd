// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cryptographic utilities: SHA-256 digests, Ed25519 signing and key parsing.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::engine_core::constants::ledger::HASH_LENGTH;
use crate::engine_core::errors::CryptoError;

type HmacSha256 = Hmac<Sha256>;

pub type Digest256 = [u8; HASH_LENGTH];

/// SHA-256 over the concatenation of `parts`.
pub fn digest256(parts: &[&[u8]]) -> Digest256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; HASH_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hex-encoded SHA-256 of `data` (64 lowercase characters)
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest256(&[data]))
}

/// HMAC-SHA256 keyed with `key` over `parts`.
pub fn hmac256(key: &[u8], parts: &[&[u8]]) -> Digest256 {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(m) => m,
        Err(_) => return digest256(parts),
    };
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; HASH_LENGTH];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Decode a 64-char hex digest.
pub fn decode_digest(hex_str: &str) -> Option<Digest256> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

/// Signs ledger hashes with an Ed25519 key.
#[derive(Clone)]
pub struct LedgerSigner {
    signing_key: SigningKey,
}

impl LedgerSigner {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Create a signer with a fresh random key
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::rng().fill(&mut secret);
        Self {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    /// Parse a hex-encoded 32-byte secret key
    pub fn from_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid hex: {}", e)))?;
        let secret: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidKey(format!(
                "Invalid Ed25519 key length: expected 32 bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded secret key, for key files handed to operators.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Sign a digest. Returns the hex-encoded 64-byte signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        sign_hex(&self.signing_key, message)
    }
}

impl std::fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSigner")
            .field("public_key", &hex::encode(self.verifying_key().as_bytes()))
            .finish()
    }
}

pub fn sign_hex(key: &SigningKey, message: &[u8]) -> String {
    hex::encode(key.sign(message).to_bytes())
}

/// Verify a hex-encoded Ed25519 signature.
pub fn verify_hex(key: &VerifyingKey, message: &[u8], signature_hex: &str) -> bool {
    let bytes = match hex::decode(signature_hex) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(&bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };
    key.verify(message, &signature).is_ok()
}

/// Parse a hex-encoded 32-byte Ed25519 public key
pub fn parse_verifying_key(public_hex: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = hex::decode(public_hex.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid hex: {}", e)))?;
    let raw: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        CryptoError::InvalidKey(format!(
            "Invalid Ed25519 public key length: expected 32 bytes, got {}",
            b.len()
        ))
    })?;
    VerifyingKey::from_bytes(&raw).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}
