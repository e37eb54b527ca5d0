//! Cryptographic adapter for the PACT coordination protocol.
//!
//! The protocol core consumes exactly three capabilities: sign bytes, verify
//! bytes, and hash bytes. Key generation and everything else cryptographic
//! (DH session establishment, AEAD framing) live outside the core; this
//! crate is the thin boundary through which pre-generated material enters.

pub mod ed25519;
pub mod session;
pub mod threshold;

pub use ed25519::{sha256, CryptoError, CryptoResult, Keypair, PublicKey, Signature, Signer};
pub use session::derive_session_salt;
pub use threshold::{ThresholdScheme, ThresholdSignature};
