//! ECHKDF1L / ECHKDF2L: deriving symmetric key material from one or two
//! Diffie-Hellman shared points (spec component 4.B).
//!
//! Both variants are HKDF-SHA-256 over the zero-padded x-coordinate(s) of
//! the shared point(s), with a fixed, protocol-wide salt and a caller-chosen
//! output length (64 bytes by default: 16 for the AES key, 16 for an IV seed
//! the caller discards in favor of AES1L's own random IV, and 32 held in
//! reserve for future layers — only the first [`crate::aes::KEY_BYTES`]
//! bytes are used as the AES1L key today).

use hkdf::Hkdf;
use sha2::Sha256;

use crate::group::{Point, FIELD_BYTES};

/// Default derived key material length in bytes.
pub const DEFAULT_OUTPUT_LEN: usize = 64;

/// Fixed, protocol-wide HKDF salt. Not secret: its purpose is domain
/// separation between this scheme's KDF and any other HKDF use in a host
/// application, not confidentiality.
const SALT: &[u8] = b"tresor/echkdf/v1";

#[derive(Debug, thiserror::Error)]
pub enum HkdfError {
    /// The requested output length exceeds HKDF-SHA-256's 255*32 byte limit.
    #[error("requested output length {0} exceeds HKDF-SHA-256 limit")]
    OutputTooLong(usize),
}

fn expand(ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, HkdfError> {
    let hk = Hkdf::<Sha256>::new(Some(SALT), ikm);
    let mut out = vec![0u8; len];
    hk.expand(info, &mut out)
        .map_err(|_| HkdfError::OutputTooLong(len))?;
    Ok(out)
}

/// Derives key material from a single shared point (one-layer handshake /
/// single-owner-layer decryption key agreement).
pub fn echkdf1l(shared: &Point, len: usize) -> Result<Vec<u8>, HkdfError> {
    let mut ikm = vec![0u8; FIELD_BYTES];
    let x = shared.x_bytes();
    ikm[FIELD_BYTES - x.len()..].copy_from_slice(&x);
    expand(&ikm, b"echkdf1l", len)
}

/// Derives key material from two shared points (the two-layer hybrid
/// ElGamal encryption/decryption path).
pub fn echkdf2l(shared1: &Point, shared2: &Point, len: usize) -> Result<Vec<u8>, HkdfError> {
    let mut ikm = vec![0u8; 2 * FIELD_BYTES];
    let x1 = shared1.x_bytes();
    let x2 = shared2.x_bytes();
    ikm[FIELD_BYTES - x1.len()..FIELD_BYTES].copy_from_slice(&x1);
    ikm[2 * FIELD_BYTES - x2.len()..].copy_from_slice(&x2);
    expand(&ikm, b"echkdf2l", len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Scalar;

    #[test]
    fn echkdf1l_is_deterministic_in_the_shared_point() {
        let mut rng = rand::thread_rng();
        let s = Scalar::sample(&mut rng);
        let p = Point::from_scalar(&s);
        let a = echkdf1l(&p, DEFAULT_OUTPUT_LEN).unwrap();
        let b = echkdf1l(&p, DEFAULT_OUTPUT_LEN).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn echkdf2l_differs_from_echkdf1l() {
        let mut rng = rand::thread_rng();
        let p = Point::from_scalar(&Scalar::sample(&mut rng));
        let q = Point::from_scalar(&Scalar::sample(&mut rng));
        let one = echkdf1l(&p, DEFAULT_OUTPUT_LEN).unwrap();
        let two = echkdf2l(&p, &q, DEFAULT_OUTPUT_LEN).unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn distinct_points_derive_distinct_keys() {
        let mut rng = rand::thread_rng();
        let p = Point::from_scalar(&Scalar::sample(&mut rng));
        let q = Point::from_scalar(&Scalar::sample(&mut rng));
        assert_ne!(
            echkdf1l(&p, DEFAULT_OUTPUT_LEN).unwrap(),
            echkdf1l(&q, DEFAULT_OUTPUT_LEN).unwrap()
        );
    }
}
