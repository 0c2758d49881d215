//! PBKDF2: derives the AES key protecting a client's profile-at-rest file
//! (spec §6 persistent state). Not used anywhere in the wire protocol.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

/// Derives `len` bytes of key material from `password` and `salt` using
/// PBKDF2-HMAC-SHA256 with `iterations` rounds.
pub fn derive(password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}
