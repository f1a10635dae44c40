//! Key agreement, authenticated encryption and signatures.
//!
//! Every task gets a fresh secp256k1 [`KeyPair`]. Its secret half is combined
//! with the worker's published encryption key through ECDH, and the shared
//! point is run through SHA-256 to produce a [`SymmetricKey`]. Payloads are
//! sealed with AES-256-GCM. Worker results are signed Ethereum-style
//! (recoverable ECDSA over keccak256), so a worker identity is an [`Address`].
//!
//! All functions are pure: nothing is cached between tasks.
//!
//! # Ciphertext layout
//!
//! ```text
//! ciphertext || tag (16 bytes) || nonce (12 bytes)
//! ```
//!
//! # Examples
//!
//! ```
//! use sealed_compute::crypto::{self, KeyPair};
//!
//! let client = KeyPair::generate();
//! let worker = KeyPair::generate();
//!
//! let key = crypto::derive_shared_key(client.secret_key(), worker.public_key());
//! let same = crypto::derive_shared_key(worker.secret_key(), client.public_key());
//! assert_eq!(key.as_bytes(), same.as_bytes());
//!
//! let sealed = crypto::encrypt(&key, b"add(uint256,uint256)").unwrap();
//! assert_eq!(crypto::decrypt(&same, &sealed).unwrap(), b"add(uint256,uint256)");
//! ```

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{ecdh, Message, PublicKey, SecretKey, SECP256K1};
use sha2::Digest as _;
use zeroize::{Zeroize, ZeroizeOnDrop};

use sealed_compute_types::hex::encode_prefixed;
use sealed_compute_types::{Address, Result, TaskError};

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Recoverable signature length (`r || s || v`).
pub const SIGNATURE_LEN: usize = 65;

const KDF_DOMAIN: &[u8] = b"sealed-compute/ecdh-aes256gcm/v1";

/// A secp256k1 key pair.
///
/// Used both for the per-task ephemeral client key and for long-lived worker
/// keys. The secret scalar is erased when the pair is dropped, and `Debug`
/// never prints it.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut bytes);
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                bytes.zeroize();
                let public = PublicKey::from_secret_key_global(&secret);
                return Self { secret, public };
            }
        }
    }

    /// Restores a key pair from a 32-byte secret.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| TaskError::Crypto(format!("invalid secret key: {e}")))?;
        let public = PublicKey::from_secret_key_global(&secret);
        Ok(Self { secret, public })
    }

    /// The secret half.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// The public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The public key as 64 uncompressed bytes without the `0x04` prefix.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        public_key_bytes(&self.public)
    }

    /// Ethereum-style address of the public key.
    pub fn address(&self) -> Address {
        address_of(&self.public)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &encode_prefixed(&self.public_key_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Exposes the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Derives the symmetric key shared between `local_private` and
/// `remote_public`.
///
/// Both sides of the exchange obtain the same key: ECDH yields the shared
/// curve point, whose x-coordinate is hashed with SHA-256 under a fixed
/// domain tag.
pub fn derive_shared_key(local_private: &SecretKey, remote_public: &PublicKey) -> SymmetricKey {
    let mut point = ecdh::shared_secret_point(remote_public, local_private);

    let mut hasher = sha2::Sha256::new();
    hasher.update(KDF_DOMAIN);
    hasher.update(&point[..32]);
    let digest = hasher.finalize();
    point.zeroize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&digest[..]);
    SymmetricKey(key)
}

/// Seals `plaintext` under `key` with a random nonce.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| TaskError::Crypto(format!("invalid key length: {e}")))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| TaskError::Crypto("encryption failed".to_string()))?;
    sealed.extend_from_slice(&nonce);
    Ok(sealed)
}

/// Opens a ciphertext produced by [`encrypt`].
///
/// Fails with [`TaskError::Decryption`] if the input is shorter than a tag
/// plus nonce, or if the authentication tag does not match.
pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN + NONCE_LEN {
        return Err(TaskError::decryption(format!(
            "ciphertext truncated: {} bytes, need at least {}",
            ciphertext.len(),
            TAG_LEN + NONCE_LEN
        )));
    }

    let (body, nonce) = ciphertext.split_at(ciphertext.len() - NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| TaskError::Crypto(format!("invalid key length: {e}")))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), body)
        .map_err(|_| TaskError::decryption("authentication tag mismatch"))
}

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::Digest as _;

    let digest = sha3::Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Signs `keccak256(message)` and returns `r || s || v` with `v` in `{27, 28}`.
pub fn sign(secret: &SecretKey, message: &[u8]) -> Vec<u8> {
    let digest = Message::from_digest(keccak256(message));
    let signature = SECP256K1.sign_ecdsa_recoverable(&digest, secret);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.extend_from_slice(&compact);
    out.push(27 + recovery_id.to_i32() as u8);
    out
}

/// Recovers the public key that produced `signature` over `message`.
pub fn recover_public_key(message: &[u8], signature: &[u8]) -> Result<PublicKey> {
    if signature.len() != SIGNATURE_LEN {
        return Err(TaskError::Crypto(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }

    let v = signature[64];
    let recovery = match v {
        27 | 28 => i32::from(v - 27),
        0 | 1 => i32::from(v),
        other => {
            return Err(TaskError::Crypto(format!("invalid recovery byte {other}")));
        },
    };
    let recovery_id = RecoveryId::from_i32(recovery)
        .map_err(|e| TaskError::Crypto(format!("invalid recovery id: {e}")))?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| TaskError::Crypto(format!("malformed signature: {e}")))?;

    let digest = Message::from_digest(keccak256(message));
    SECP256K1
        .recover_ecdsa(&digest, &signature)
        .map_err(|e| TaskError::Crypto(format!("signature recovery failed: {e}")))
}

/// Recovers the signer address of `signature` over `message`.
pub fn recover_address(message: &[u8], signature: &[u8]) -> Result<Address> {
    recover_public_key(message, signature).map(|key| address_of(&key))
}

/// Returns `true` iff `signature` over `message` was produced by `pub_key`.
///
/// Malformed signatures verify as `false`.
pub fn verify_signature(pub_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    matches!(recover_public_key(message, signature), Ok(recovered) if &recovered == pub_key)
}

/// Ethereum-style address: the last 20 bytes of keccak256 over the
/// uncompressed public key without its prefix.
pub fn address_of(pub_key: &PublicKey) -> Address {
    let hash = keccak256(&public_key_bytes(pub_key));
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from(bytes)
}

/// Serializes a public key as 64 uncompressed bytes without prefix.
pub fn public_key_bytes(pub_key: &PublicKey) -> Vec<u8> {
    pub_key.serialize_uncompressed()[1..].to_vec()
}

/// Parses a public key in compressed (33), raw (64) or uncompressed (65)
/// form.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    let parsed = match bytes.len() {
        64 => {
            let mut prefixed = [0u8; 65];
            prefixed[0] = 0x04;
            prefixed[1..].copy_from_slice(bytes);
            PublicKey::from_slice(&prefixed)
        },
        33 | 65 => PublicKey::from_slice(bytes),
        other => {
            return Err(TaskError::Crypto(format!(
                "public key must be 33, 64 or 65 bytes, got {other}"
            )));
        },
    };
    parsed.map_err(|e| TaskError::Crypto(format!("invalid public key: {e}")))
}
