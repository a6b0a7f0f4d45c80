//! Time-based guard-code derivation for the bot account login.
//!
//! The shared secret is base64-encoded key material; the code is derived
//! from an HMAC-SHA1 over the current 30-second interval and rendered in
//! the network's reduced alphabet. Codes are derived fresh for every login
//! attempt, never cached.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Alphabet the network expects guard codes to be drawn from.
const CODE_ALPHABET: &[u8] = b"23456789BCDFGHJKMNPQRTVWXY";

const CODE_LENGTH: usize = 5;
const INTERVAL_SECS: i64 = 30;

pub fn generate_auth_code(shared_secret: &str, unix_time: i64) -> Result<String> {
    let key = BASE64_STANDARD
        .decode(shared_secret)
        .map_err(|e| Error::Auth(format!("shared secret is not valid base64: {e}")))?;

    let mut mac = HmacSha1::new_from_slice(&key)
        .map_err(|e| Error::Auth(format!("shared secret is unusable as a key: {e}")))?;
    mac.update(&((unix_time / INTERVAL_SECS) as u64).to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let start = (digest[19] & 0x0f) as usize;
    let mut fragment = u32::from_be_bytes([
        digest[start],
        digest[start + 1],
        digest[start + 2],
        digest[start + 3],
    ]) & 0x7fff_ffff;

    let mut code = String::with_capacity(CODE_LENGTH);
    for _ in 0..CODE_LENGTH {
        code.push(CODE_ALPHABET[fragment as usize % CODE_ALPHABET.len()] as char);
        fragment /= CODE_ALPHABET.len() as u32;
    }
    Ok(code)
}

pub fn generate_auth_code_now(shared_secret: &str) -> Result<String> {
    generate_auth_code(shared_secret, Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "zvIJKf0QOsnoU9EWmi3yEPyQCpE=";

    #[test]
    fn codes_are_deterministic_within_an_interval() {
        let a = generate_auth_code(SECRET, 1_700_000_010).unwrap();
        let b = generate_auth_code(SECRET, 1_700_000_020).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn codes_use_the_reduced_alphabet() {
        let code = generate_auth_code(SECRET, 1_700_000_000).unwrap();
        assert_eq!(code.len(), 5);
        assert!(code.bytes().all(|c| CODE_ALPHABET.contains(&c)));
    }

    #[test]
    fn invalid_secret_is_an_auth_error() {
        let err = generate_auth_code("!!not base64!!", 1_700_000_000).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
