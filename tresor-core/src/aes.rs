//! AES1L: the single symmetric primitive used to encrypt message bodies
//! under a hybrid-ElGamal-derived key (spec component 4.B).
//!
//! Ciphertexts are represented as `(prefix, body)`, matching the
//! `Ciphertext` data model's two length-prefixed byte strings: `prefix` is
//! the random IV, `body` is the AES-128-CBC ciphertext with PKCS#7 padding.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{CryptoRng, RngCore};

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Size in bytes of an AES-128 key.
pub const KEY_BYTES: usize = 16;
/// Size in bytes of an AES1L IV.
pub const IV_BYTES: usize = 16;

/// Errors from AES1L operations.
#[derive(Debug, thiserror::Error)]
pub enum AesError {
    /// The key was not exactly [`KEY_BYTES`] bytes.
    #[error("AES1L key must be {KEY_BYTES} bytes, got {0}")]
    BadKeyLength(usize),
    /// The IV was not exactly [`IV_BYTES`] bytes.
    #[error("AES1L iv must be {IV_BYTES} bytes, got {0}")]
    BadIvLength(usize),
    /// Padding was invalid or the ciphertext was malformed.
    #[error("AES1L ciphertext padding is invalid")]
    BadPadding,
}

/// Encrypts `plaintext` under `key`, sampling a fresh random IV.
///
/// Returns `(iv, ciphertext_body)` — callers store these as the `prefix` and
/// `body` halves of a `Ciphertext`.
pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), AesError> {
    if key.len() != KEY_BYTES {
        return Err(AesError::BadKeyLength(key.len()));
    }
    let mut iv = [0u8; IV_BYTES];
    rng.fill_bytes(&mut iv);
    let body = Encryptor::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Ok((iv.to_vec(), body))
}

/// Decrypts `(iv, body)` under `key`.
pub fn decrypt(key: &[u8], iv: &[u8], body: &[u8]) -> Result<Vec<u8>, AesError> {
    if key.len() != KEY_BYTES {
        return Err(AesError::BadKeyLength(key.len()));
    }
    if iv.len() != IV_BYTES {
        return Err(AesError::BadIvLength(iv.len()));
    }
    Decryptor::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| AesError::BadPadding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_plaintext() {
        let mut rng = rand::thread_rng();
        let key = [7u8; KEY_BYTES];
        for len in [0, 1, 15, 16, 17, 200] {
            let plaintext = vec![0xab; len];
            let (iv, body) = encrypt(&mut rng, &key, &plaintext).unwrap();
            let decrypted = decrypt(&key, &iv, &body).unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn rejects_wrong_key_length() {
        let mut rng = rand::thread_rng();
        assert!(encrypt(&mut rng, &[0u8; 5], b"hi").is_err());
    }

    #[test]
    fn distinct_encryptions_use_distinct_ivs() {
        let mut rng = rand::thread_rng();
        let key = [3u8; KEY_BYTES];
        let (iv1, _) = encrypt(&mut rng, &key, b"same plaintext").unwrap();
        let (iv2, _) = encrypt(&mut rng, &key, b"same plaintext").unwrap();
        assert_ne!(iv1, iv2);
    }
}
