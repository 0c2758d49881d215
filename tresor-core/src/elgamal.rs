//! Two-layer hybrid ElGamal encryption (spec component 4.C).
//!
//! A ciphertext is encrypted against two independent public keys — the
//! "registry" layer and the "owner" layer — so that decryption requires
//! cooperation of both layers' key holders. Each layer contributes its own
//! ephemeral Diffie-Hellman point (`c1`, `c2`); the AES1L key is derived from
//! both shared points via [`crate::hkdf::echkdf2l`]. Decryption never needs
//! to reconstruct either secret key in one place: [`crate::shamir`] combines
//! per-shard partial decryptions of `c1`/`c2` directly.

use rand::{CryptoRng, RngCore};

use crate::aes::{self, AesError};
use crate::group::{GroupError, Point, Scalar};
use crate::hkdf::{self, HkdfError};

/// A keypair for one ElGamal layer.
#[derive(Clone)]
pub struct KeyPair {
    pub sk: Scalar,
    pub pk: Point,
}

impl KeyPair {
    /// Samples a fresh keypair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let sk = Scalar::sample(rng);
        let pk = Point::from_scalar(&sk);
        Self { sk, pk }
    }
}

/// A two-layer hybrid ElGamal ciphertext.
#[derive(Debug, Clone)]
pub struct Ciphertext {
    /// Ephemeral point for the registry layer: `g^r1`.
    pub c1: Point,
    /// Ephemeral point for the owner layer: `g^r2`.
    pub c2: Point,
    /// AES1L IV.
    pub prefix: Vec<u8>,
    /// AES1L ciphertext body.
    pub body: Vec<u8>,
}

/// Errors from encryption/decryption.
#[derive(Debug, thiserror::Error)]
pub enum ElGamalError {
    #[error(transparent)]
    Aes(#[from] AesError),
    #[error(transparent)]
    Hkdf(#[from] HkdfError),
    #[error(transparent)]
    Group(#[from] GroupError),
}

/// Computes a party's contribution to a shared DH point: `point * sk`.
///
/// This is also the building block for distributed decryption: a holder of
/// a Shamir shard of `sk` computes `point * shard.value` instead (see
/// [`crate::shamir::partial_decrypt`]), and the shares are combined
/// afterwards without ever materializing `sk`.
pub fn dh_point(sk: &Scalar, point: &Point) -> Point {
    *point * sk
}

/// Encrypts `plaintext` under the two layer public keys.
pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    pk1: &Point,
    pk2: &Point,
    plaintext: &[u8],
) -> Result<Ciphertext, ElGamalError> {
    let r1 = Scalar::sample(rng);
    let r2 = Scalar::sample(rng);
    let c1 = Point::from_scalar(&r1);
    let c2 = Point::from_scalar(&r2);
    let shared1 = dh_point(&r1, pk1);
    let shared2 = dh_point(&r2, pk2);
    let key_material = hkdf::echkdf2l(&shared1, &shared2, hkdf::DEFAULT_OUTPUT_LEN)?;
    let (prefix, body) = aes::encrypt(rng, &key_material[..aes::KEY_BYTES], plaintext)?;
    Ok(Ciphertext {
        c1,
        c2,
        prefix,
        body,
    })
}

/// Decrypts a ciphertext given the two layers' shared DH points, already
/// reconstructed (directly, or via Shamir combination of partial
/// decryptions).
pub fn decrypt_with_shared(
    shared1: &Point,
    shared2: &Point,
    ciphertext: &Ciphertext,
) -> Result<Vec<u8>, ElGamalError> {
    let key_material = hkdf::echkdf2l(shared1, shared2, hkdf::DEFAULT_OUTPUT_LEN)?;
    aes::decrypt(
        &key_material[..aes::KEY_BYTES],
        &ciphertext.prefix,
        &ciphertext.body,
    )
    .map_err(Into::into)
}

/// Decrypts a ciphertext given both layers' secret keys directly. A
/// convenience for tests and for single-party (non-threshold) setups; the
/// server never holds a full `sk` and always goes through
/// [`decrypt_with_shared`].
pub fn decrypt(
    sk1: &Scalar,
    sk2: &Scalar,
    ciphertext: &Ciphertext,
) -> Result<Vec<u8>, ElGamalError> {
    let shared1 = dh_point(sk1, &ciphertext.c1);
    let shared2 = dh_point(sk2, &ciphertext.c2);
    decrypt_with_shared(&shared1, &shared2, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_direct_decrypt() {
        let mut rng = rand::thread_rng();
        let kp1 = KeyPair::generate(&mut rng);
        let kp2 = KeyPair::generate(&mut rng);
        let msg = b"transfer 10 shares to alice";
        let ct = encrypt(&mut rng, &kp1.pk, &kp2.pk, msg).unwrap();
        let pt = decrypt(&kp1.sk, &kp2.sk, &ct).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn wrong_layer_key_fails_to_recover_plaintext() {
        let mut rng = rand::thread_rng();
        let kp1 = KeyPair::generate(&mut rng);
        let kp2 = KeyPair::generate(&mut rng);
        let other = KeyPair::generate(&mut rng);
        let msg = b"secret message";
        let ct = encrypt(&mut rng, &kp1.pk, &kp2.pk, msg).unwrap();
        let result = decrypt(&other.sk, &kp2.sk, &ct);
        match result {
            Ok(pt) => assert_ne!(pt, msg),
            Err(_) => {}
        }
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let mut rng = rand::thread_rng();
        let kp1 = KeyPair::generate(&mut rng);
        let kp2 = KeyPair::generate(&mut rng);
        let ct = encrypt(&mut rng, &kp1.pk, &kp2.pk, b"").unwrap();
        let pt = decrypt(&kp1.sk, &kp2.sk, &ct).unwrap();
        assert!(pt.is_empty());
    }
}
