//! Cryptographic primitives for emberchain
//!
//! Addresses are hex-encoded uncompressed secp256k1 public keys (`04 || X || Y`,
//! 130 hex characters). Signatures are hex-encoded DER ECDSA signatures over a
//! 32-byte digest, which for transactions is the decoded transaction id.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{SECRET_KEY_SIZE, UNCOMPRESSED_PUBLIC_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Hex-encoded uncompressed public key.
pub type Address = String;

/// Length of an address in hex characters.
pub const ADDRESS_HEX_LEN: usize = UNCOMPRESSED_PUBLIC_KEY_SIZE * 2;

/// SHA-256 of `data`, lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A valid address is `04` followed by the X and Y coordinates, hex only.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_LEN
        && address.bytes().all(|b| b.is_ascii_hexdigit())
        && address.starts_with("04")
}

fn digest_message(digest_hex: &str) -> Result<Message, ChainError> {
    let digest = hex::decode(digest_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid digest hex: {}", e)))?;
    Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// The address owned by this key pair.
    pub fn address(&self) -> Address {
        hex::encode(self.public_key.serialize_uncompressed())
    }

    /// Signs a hex-encoded 32-byte digest and returns the DER signature as hex.
    pub fn sign_digest(&self, digest_hex: &str) -> Result<String, ChainError> {
        let message = digest_message(digest_hex)?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(&*signature.serialize_der()))
    }
}

/// Verifies a hex DER signature over a hex digest against an address.
pub fn verify_signature(
    address: &str,
    digest_hex: &str,
    signature_hex: &str,
) -> Result<(), ChainError> {
    if !is_valid_address(address) {
        return Err(ChainError::CryptoError(format!(
            "Address must be {} hex characters starting with 04",
            ADDRESS_HEX_LEN
        )));
    }

    let key_bytes = hex::decode(address)
        .map_err(|e| ChainError::CryptoError(format!("Invalid address hex: {}", e)))?;
    let public_key = PublicKey::from_slice(&key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;

    let message = digest_message(digest_hex)?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature hex: {}", e)))?;
    let mut signature = Signature::from_der(&signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;
    // libsecp256k1 only accepts low-S; other signers may emit either form.
    signature.normalize_s();

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}
