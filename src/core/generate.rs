//! # Generate
//!
//! Random values for nonces, salts, transaction identifiers and `state`.
//! All values are drawn from the operating system's CSPRNG.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::rngs::OsRng;
use rand::RngCore;

// 256 bits
const NONCE_LEN: usize = 32;
// 128 bits
const SALT_LEN: usize = 16;

/// Generates a base64url encoded random string for a server nonce.
#[must_use]
pub fn nonce() -> String {
    random_b64(NONCE_LEN)
}

/// Generates a base64url encoded random salt for a disclosure.
#[must_use]
pub fn salt() -> String {
    random_b64(SALT_LEN)
}

/// Generates a base64url encoded random presentation transaction identifier.
#[must_use]
pub fn transaction_id() -> String {
    random_b64(NONCE_LEN)
}

/// Generates a base64url encoded random `state` value.
#[must_use]
pub fn state_key() -> String {
    random_b64(NONCE_LEN)
}

fn random_b64(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy() {
        let salt = Base64UrlUnpadded::decode_vec(&salt()).expect("should decode");
        assert_eq!(salt.len(), 16);
        assert_ne!(nonce(), nonce());
    }
}
