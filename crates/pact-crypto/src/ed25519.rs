/// Ed25519 Signing Adapter
///
/// Thin, length-validated wrappers around `ed25519-dalek`. The protocol core
/// never constructs or parses raw key material itself; it receives wrapped
/// keys at startup and invokes exactly three operations:
/// - sign(octets) -> Signature
/// - verify(public_key, octets, signature) -> bool
/// - sha256(octets) -> 32-octet digest
///
/// SAFETY GUARANTEES:
/// - Explicit error propagation (no panics on malformed input)
/// - Byte lengths validated at the boundary (32-octet keys, 64-octet sigs)
/// - Verification failure is a value, never an exception path

use ed25519_dalek::{Signer as DalekSigner, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Ed25519 public key length in octets.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 signature length in octets.
pub const SIGNATURE_SIZE: usize = 64;

// ==================== ERROR TYPES ====================

/// Error type for cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CryptoError {
    /// Key bytes are the wrong length or not a valid curve point
    InvalidKeyFormat(String),

    /// Signature bytes are the wrong length
    InvalidSignatureFormat(String),

    /// Key derivation failed
    KeyDerivationFailed(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidKeyFormat(msg) => write!(f, "Invalid key format: {}", msg),
            CryptoError::InvalidSignatureFormat(msg) => {
                write!(f, "Invalid signature format: {}", msg)
            }
            CryptoError::KeyDerivationFailed(msg) => write!(f, "Key derivation failed: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

pub type CryptoResult<T> = Result<T, CryptoError>;

// ==================== HASHING ====================

/// SHA-256 digest of an octet sequence.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

// ==================== PUBLIC KEY ====================

/// Ed25519 public key wrapper (exactly 32 octets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Create from raw bytes (must be exactly 32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "Ed25519 public key must be {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Verify a signature over a message.
    ///
    /// Returns false on any failure: bad curve point, wrong length, or a
    /// signature that does not verify. Verification never panics.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let key_bytes: [u8; PUBLIC_KEY_SIZE] = match self.bytes.as_slice().try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        };
        let verifying_key = match ed25519_dalek::VerifyingKey::from_bytes(&key_bytes) {
            Ok(vk) => vk,
            Err(_) => return false,
        };
        let sig_bytes: [u8; SIGNATURE_SIZE] = match signature.as_bytes().try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.bytes[..8]))
    }
}

// ==================== SIGNATURE ====================

/// Ed25519 signature wrapper (exactly 64 octets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: Vec<u8>,
}

impl Signature {
    /// Create from raw bytes (must be exactly 64 bytes).
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignatureFormat(format!(
                "Ed25519 signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

// ==================== KEYPAIR ====================

/// Capability trait for producing signatures over arbitrary octet sequences.
///
/// The protocol core takes `&dyn Signer` at artifact-construction sites, so
/// key storage (in-memory, HSM, remote signer) is a caller concern.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Signature;

    fn public_key(&self) -> PublicKey;
}

/// In-memory Ed25519 keypair.
pub struct Keypair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the given RNG.
    pub fn generate<R: rand::CryptoRng + rand::RngCore>(rng: &mut R) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Intended for tests and
    /// reproducible simulations.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }
}

impl Signer for Keypair {
    fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature {
            bytes: sig.to_bytes().to_vec(),
        }
    }

    fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.public_key())
    }
}
