//! Session-salt derivation hook.
//!
//! After a successful run the protocol core emits a bilateral receipt whose
//! 32-octet hash both participants compute identically. The post-agreement
//! session layer (X25519 + AEAD, external to this workspace) consumes that
//! hash through this single hook to bind its key schedule to the agreement.

use hkdf::Hkdf;
use sha2::Sha256;

/// Domain separation for session salt derivation.
const SESSION_SALT_DOMAIN: &[u8] = b"PACT-SESSION-SALT-V1";

/// Derive a 32-octet session salt from the bilateral receipt hash.
///
/// Both participants hold the same receipt hash, so both derive the same
/// salt. `context` lets a deployment bind the salt to an application label
/// (empty is fine).
pub fn derive_session_salt(receipt_hash: &[u8; 32], context: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(SESSION_SALT_DOMAIN), receipt_hash);
    let mut salt = [0u8; 32];
    // 32 octets is always a valid HKDF-SHA256 output length.
    hk.expand(context, &mut salt)
        .unwrap_or_else(|_| unreachable!("32-octet HKDF output is within bounds"));
    salt
}
