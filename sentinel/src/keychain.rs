//! Durable P-256 identity: signing, signature verification, and
//! ephemeral-key encryption.
//!
//! Ciphertext format: `hex(iv) || hex(aes-256-cbc(plaintext))`, where the key
//! is SHA-256 of the ECDH shared secret rendered as lowercase hex without
//! leading zeros, and the IV is the first 16 bytes of SHA-256 of the current
//! Unix time in milliseconds (decimal). The IV is predictable and may repeat
//! for calls within the same millisecond; existing peers depend on this
//! layout, so it is kept as is.

use std::io::Write;
use std::path::Path;

use aes::Aes256;
use anyhow::{Context, Result};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sentinel_common::KeyPair;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::application::ports::Signer;
use crate::domain::error::KeychainError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Hex characters of the IV prefix in a ciphertext.
const IV_HEX_LEN: usize = 32;

/// Output of [`Keychain::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub encrypted: String,
    #[serde(rename = "ephemPublicKey")]
    pub ephemeral_public_key: String,
}

pub struct Keychain {
    key_pair: KeyPair,
    secret: SecretKey,
    public: PublicKey,
}

impl std::fmt::Debug for Keychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keychain")
            .field("public_key", &self.key_pair.public_key)
            .finish_non_exhaustive()
    }
}

impl Keychain {
    /// Fresh random key pair; nothing is persisted.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        let key_pair = KeyPair {
            public_key: encode_public_key(&public),
            private_key: hex::encode(secret.to_bytes()),
        };
        Self {
            key_pair,
            secret,
            public,
        }
    }

    /// Rebuild a keychain from persisted key material.
    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self, KeychainError> {
        let secret = decode_secret_key(&key_pair.private_key)?;
        let public = secret.public_key();
        let stored = decode_public_key(&key_pair.public_key)?;
        if stored != public {
            return Err(KeychainError::MalformedKey(
                "public key does not match private key".to_string(),
            ));
        }
        Ok(Self {
            key_pair,
            secret,
            public,
        })
    }

    /// Load the key pair at `path`, generating and persisting one on first run.
    ///
    /// A new key file is created with mode 0600.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading key file {}", path.display()))?;
            let key_pair: KeyPair = serde_json::from_str(&content)
                .with_context(|| format!("parsing key file {}", path.display()))?;
            let keychain = Self::from_key_pair(key_pair)
                .with_context(|| format!("loading key pair from {}", path.display()))?;
            tracing::debug!(public_key = %keychain.public_key(), "loaded key pair");
            return Ok(keychain);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let keychain = Self::generate();
        let content =
            serde_json::to_string_pretty(&keychain.key_pair).context("serializing key pair")?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .with_context(|| format!("creating key file {}", path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("writing key file {}", path.display()))?;

        tracing::info!(public_key = %keychain.public_key(), path = %path.display(), "generated new key pair");
        Ok(keychain)
    }

    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.key_pair.public_key
    }

    /// Sign SHA-256(`message`); returns the DER signature as hex.
    pub fn sign(&self, message: &str) -> Result<String, KeychainError> {
        let digest = Sha256::digest(message.as_bytes());
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key
            .sign_prehash(&digest)
            .map_err(|e| KeychainError::SigningFailed(e.to_string()))?;
        Ok(hex::encode(signature.to_der().as_bytes()))
    }

    /// Encrypt `plaintext` to this keychain's own public key.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedPayload, KeychainError> {
        let ephemeral = EphemeralSecret::random(&mut OsRng);
        let shared = ephemeral.diffie_hellman(&self.public);
        let key = symmetric_key(shared.raw_secret_bytes());
        let iv = timestamp_iv(chrono::Utc::now().timestamp_millis());

        let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
            .map_err(|e| KeychainError::MalformedKey(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(EncryptedPayload {
            encrypted: format!("{}{}", hex::encode(iv), hex::encode(ciphertext)),
            ephemeral_public_key: encode_public_key(&ephemeral.public_key()),
        })
    }

    /// Inverse of [`Keychain::encrypt`].
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<String, KeychainError> {
        let (iv_hex, body_hex) = match (
            payload.encrypted.get(..IV_HEX_LEN),
            payload.encrypted.get(IV_HEX_LEN..),
        ) {
            (Some(iv), Some(body)) => (iv, body),
            _ => {
                return Err(KeychainError::MalformedCiphertext(
                    "shorter than the IV prefix".to_string(),
                ));
            }
        };
        let iv = hex::decode(iv_hex).map_err(|e| KeychainError::MalformedCiphertext(e.to_string()))?;
        let body =
            hex::decode(body_hex).map_err(|e| KeychainError::MalformedCiphertext(e.to_string()))?;

        let ephemeral = decode_public_key(&payload.ephemeral_public_key)?;
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), ephemeral.as_affine());
        let key = symmetric_key(shared.raw_secret_bytes());

        let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
            .map_err(|e| KeychainError::MalformedCiphertext(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&body)
            .map_err(|_| KeychainError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| KeychainError::NotUtf8)
    }
}

impl Signer for Keychain {
    fn public_key(&self) -> &str {
        Keychain::public_key(self)
    }

    fn sign(&self, message: &str) -> Result<String> {
        Ok(Keychain::sign(self, message)?)
    }
}

/// Verify a hex DER signature over SHA-256(`message`) against a hex SEC1
/// public key. Any malformed input yields `false`.
#[must_use]
pub fn is_valid_signature(message: &str, public_key: &str, signature: &str) -> bool {
    match verify_signature(message, public_key, signature) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "signature verification failed");
            false
        }
    }
}

fn verify_signature(message: &str, public_key: &str, signature: &str) -> Result<(), KeychainError> {
    let key_bytes =
        hex::decode(public_key.trim()).map_err(|e| KeychainError::MalformedKey(e.to_string()))?;
    let verifying_key = VerifyingKey::from_sec1_bytes(&key_bytes)
        .map_err(|e| KeychainError::MalformedKey(e.to_string()))?;
    let sig_bytes = hex::decode(signature.trim())
        .map_err(|e| KeychainError::SigningFailed(e.to_string()))?;
    let signature =
        Signature::from_der(&sig_bytes).map_err(|e| KeychainError::SigningFailed(e.to_string()))?;
    let digest = Sha256::digest(message.as_bytes());
    verifying_key
        .verify_prehash(&digest, &signature)
        .map_err(|e| KeychainError::SigningFailed(e.to_string()))
}

fn encode_public_key(key: &PublicKey) -> String {
    hex::encode(key.to_encoded_point(true).as_bytes())
}

fn decode_public_key(hex_key: &str) -> Result<PublicKey, KeychainError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| KeychainError::MalformedKey(e.to_string()))?;
    PublicKey::from_sec1_bytes(&bytes).map_err(|e| KeychainError::MalformedKey(e.to_string()))
}

/// Private scalars written by other tools may drop leading zero bytes.
fn decode_secret_key(hex_key: &str) -> Result<SecretKey, KeychainError> {
    let trimmed = hex_key.trim();
    let normalized = if trimmed.len() % 2 == 1 {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    };
    let bytes = hex::decode(&normalized).map_err(|e| KeychainError::MalformedKey(e.to_string()))?;
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(KeychainError::MalformedKey(format!(
            "private key is {} bytes, expected at most 32",
            bytes.len()
        )));
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(&bytes);
    SecretKey::from_slice(&padded).map_err(|e| KeychainError::MalformedKey(e.to_string()))
}

/// Lowercase hex of the shared secret with leading zeros stripped.
fn shared_secret_hex(shared: &[u8]) -> String {
    let full = hex::encode(shared);
    let trimmed = full.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn symmetric_key(shared: &[u8]) -> Vec<u8> {
    Sha256::digest(shared_secret_hex(shared).as_bytes()).to_vec()
}

fn timestamp_iv(unix_millis: i64) -> [u8; 16] {
    let digest = Sha256::digest(unix_millis.to_string().as_bytes());
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}
