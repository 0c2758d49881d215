//! Client-side profile-at-rest storage (spec §6): a flat sequence of
//! records, each `{u8 enc_a_size, u8 enc_b_size, enc_a, enc_b}`, where
//! `(enc_a, enc_b)` is an AES1L `(iv, body)` pair decrypting, under a
//! PBKDF2-derived key, to a plaintext `{u8 flags, UUID user_set_id,
//! Point pub_reg, Point pub_own, Shard reg_shard, [Shard owner_shard if
//! flags.is_owner]}`.
//!
//! Concrete file encryption at rest is listed as out of scope for the core
//! (spec §1) and left to a collaborator — here, the [`ProfileStore`] trait
//! — but spec §6 gives the exact record layout, so that part is implemented
//! directly rather than left abstract. Grounded on the file's existence in
//! `examples/original_source/senc/client_api/storage/` (referenced via
//! `_INDEX.md`; the exact byte layout is spec §6's, not transcribed from
//! that source, which this crate never reads verbatim per the no-
//! translation rule).

use rand::{CryptoRng, RngCore};

use tresor_core::aes::{self, AesError};
use tresor_core::group::{GroupError, Point, Scalar};
use tresor_core::pbkdf2;
use tresor_core::shamir::Shard;
use tresor_types::ids::{ShardId, UserSetId};
use tresor_types::wire::{WireDecode, WireEncode, WireError};

/// PBKDF2 iteration count for the profile-at-rest key, matching
/// `tresor-service::services::storage`'s password-hash iteration count
/// (OWASP's 2023 minimum recommendation for PBKDF2-HMAC-SHA256).
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// The AES1L key length a profile-at-rest key is derived to.
pub const KEY_LEN: usize = aes::KEY_BYTES;

/// Errors from reading or writing the profile-at-rest format.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// The record failed to decrypt (wrong password, or a tampered file).
    #[error(transparent)]
    Aes(#[from] AesError),
    /// A decoded point or scalar was malformed.
    #[error(transparent)]
    Group(#[from] GroupError),
    /// The decrypted plaintext did not follow the normative record layout.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// An encrypted record's `iv` or ciphertext body exceeded the 255-byte
    /// size-prefix width the file format allows.
    #[error("record's encrypted part exceeds 255 bytes")]
    RecordTooLarge,
    /// The file ended in the middle of a record.
    #[error("truncated profile file")]
    Truncated,
    /// The backing store's I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const FLAG_IS_OWNER: u8 = 0b0000_0001;

/// One userset's key material, as stored at rest.
#[derive(Debug, Clone)]
pub struct ProfileRecord {
    /// The userset this record's keys belong to.
    pub user_set_id: UserSetId,
    /// Registry layer public key.
    pub pub_reg: Point,
    /// Owner layer public key.
    pub pub_own: Point,
    /// This profile's registry-layer shard.
    pub reg_shard: Shard,
    /// This profile's owner-layer shard, if it is an owner of the userset.
    pub owner_shard: Option<Shard>,
}

impl ProfileRecord {
    fn encode_plaintext(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let flags: u8 = if self.owner_shard.is_some() {
            FLAG_IS_OWNER
        } else {
            0
        };
        flags.encode(&mut out);
        self.user_set_id.encode(&mut out);
        self.pub_reg.encode(&mut out);
        self.pub_own.encode(&mut out);
        ShardId(self.reg_shard.id).encode(&mut out);
        self.reg_shard.value.encode(&mut out);
        if let Some(owner_shard) = &self.owner_shard {
            ShardId(owner_shard.id).encode(&mut out);
            owner_shard.value.encode(&mut out);
        }
        out
    }

    fn decode_plaintext(buf: &[u8]) -> Result<Self, ProfileError> {
        let mut rest = buf;
        let flags = u8::decode(&mut rest)?;
        let user_set_id = UserSetId::decode(&mut rest)?;
        let pub_reg = Point::decode(&mut rest)?;
        let pub_own = Point::decode(&mut rest)?;
        let reg_id = ShardId::decode(&mut rest)?;
        let reg_value = Scalar::decode(&mut rest)?;
        let owner_shard = if flags & FLAG_IS_OWNER != 0 {
            let owner_id = ShardId::decode(&mut rest)?;
            let owner_value = Scalar::decode(&mut rest)?;
            Some(Shard {
                id: owner_id.0,
                value: owner_value,
            })
        } else {
            None
        };
        Ok(Self {
            user_set_id,
            pub_reg,
            pub_own,
            reg_shard: Shard {
                id: reg_id.0,
                value: reg_value,
            },
            owner_shard,
        })
    }

    /// Encrypts this record under `key`, returning its `(enc_a, enc_b)`
    /// on-disk representation.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        key: &[u8; KEY_LEN],
    ) -> Result<(Vec<u8>, Vec<u8>), ProfileError> {
        let plaintext = self.encode_plaintext();
        let (iv, body) = aes::encrypt(rng, key, &plaintext)?;
        if iv.len() > u8::MAX as usize || body.len() > u8::MAX as usize {
            return Err(ProfileError::RecordTooLarge);
        }
        Ok((iv, body))
    }

    /// Decrypts a stored `(enc_a, enc_b)` pair back into a record.
    pub fn decrypt(key: &[u8; KEY_LEN], enc_a: &[u8], enc_b: &[u8]) -> Result<Self, ProfileError> {
        let plaintext = aes::decrypt(key, enc_a, enc_b)?;
        Self::decode_plaintext(&plaintext)
    }
}

/// Derives the profile-at-rest AES1L key from a username and password (spec
/// §4.B: PBKDF2-HMAC-SHA256), salting with the username so two accounts
/// sharing a password still derive distinct keys.
pub fn derive_key(username: &str, password: &str) -> [u8; KEY_LEN] {
    let material = pbkdf2::derive(
        password.as_bytes(),
        username.as_bytes(),
        PBKDF2_ITERATIONS,
        KEY_LEN,
    );
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&material);
    key
}

/// Serializes a flat sequence of `(enc_a, enc_b)` pairs as
/// `{u8 enc_a_size, u8 enc_b_size, enc_a, enc_b}*`.
fn encode_records(records: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (enc_a, enc_b) in records {
        out.push(enc_a.len() as u8);
        out.push(enc_b.len() as u8);
        out.extend_from_slice(enc_a);
        out.extend_from_slice(enc_b);
    }
    out
}

/// Parses a flat sequence of `(enc_a, enc_b)` pairs from bytes.
fn decode_records(mut buf: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ProfileError> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        if buf.len() < 2 {
            return Err(ProfileError::Truncated);
        }
        let a_len = buf[0] as usize;
        let b_len = buf[1] as usize;
        buf = &buf[2..];
        if buf.len() < a_len + b_len {
            return Err(ProfileError::Truncated);
        }
        out.push((buf[..a_len].to_vec(), buf[a_len..a_len + b_len].to_vec()));
        buf = &buf[a_len + b_len..];
    }
    Ok(out)
}

/// A backing store for the flat profile-record file. A pluggable
/// collaborator (spec §1: profile-file encryption at rest is out of scope
/// for the core) — trivially implementable over a filesystem path; tests
/// use an in-memory `Vec<u8>`.
pub trait ProfileStore {
    /// Reads the raw bytes of the profile file, or `Ok(Vec::new())` if it
    /// does not exist yet.
    fn read(&self) -> std::io::Result<Vec<u8>>;
    /// Overwrites the profile file with `bytes`.
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// Loads every record from `store`, decrypting each under `key`.
pub fn load<S: ProfileStore>(
    store: &S,
    key: &[u8; KEY_LEN],
) -> Result<Vec<ProfileRecord>, ProfileError> {
    let bytes = store.read()?;
    decode_records(&bytes)?
        .into_iter()
        .map(|(a, b)| ProfileRecord::decrypt(key, &a, &b))
        .collect()
}

/// Encrypts `records` under `key` and writes them to `store`, replacing
/// its current contents.
pub fn save<S: ProfileStore, R: RngCore + CryptoRng>(
    store: &mut S,
    key: &[u8; KEY_LEN],
    records: &[ProfileRecord],
    rng: &mut R,
) -> Result<(), ProfileError> {
    let mut encrypted = Vec::with_capacity(records.len());
    for record in records {
        encrypted.push(record.encrypt(rng, key)?);
    }
    store.write(&encode_records(&encrypted))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore(Mutex<Vec<u8>>);

    impl ProfileStore for MemoryStore {
        fn read(&self) -> std::io::Result<Vec<u8>> {
            Ok(self.0.lock().unwrap().clone())
        }
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            *self.0.lock().unwrap() = bytes.to_vec();
            Ok(())
        }
    }

    fn dummy_point() -> Point {
        Point::from_scalar(&Scalar::sample(&mut rand::thread_rng()))
    }

    #[test]
    fn owner_record_round_trips_through_store() {
        let mut rng = rand::thread_rng();
        let key = derive_key("alice", "hunter2");
        let record = ProfileRecord {
            user_set_id: UserSetId::new_v4(),
            pub_reg: dummy_point(),
            pub_own: dummy_point(),
            reg_shard: Shard {
                id: 3,
                value: Scalar::sample(&mut rng),
            },
            owner_shard: Some(Shard {
                id: 7,
                value: Scalar::sample(&mut rng),
            }),
        };

        let mut store = MemoryStore::default();
        save(&mut store, &key, std::slice::from_ref(&record), &mut rng).unwrap();
        let loaded = load(&store, &key).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].user_set_id, record.user_set_id);
        assert_eq!(loaded[0].reg_shard.id, 3);
        assert_eq!(loaded[0].owner_shard.unwrap().id, 7);
    }

    #[test]
    fn member_only_record_has_no_owner_shard() {
        let mut rng = rand::thread_rng();
        let key = derive_key("bob", "correct horse");
        let record = ProfileRecord {
            user_set_id: UserSetId::new_v4(),
            pub_reg: dummy_point(),
            pub_own: dummy_point(),
            reg_shard: Shard {
                id: 2,
                value: Scalar::sample(&mut rng),
            },
            owner_shard: None,
        };

        let mut store = MemoryStore::default();
        save(&mut store, &key, std::slice::from_ref(&record), &mut rng).unwrap();
        let loaded = load(&store, &key).unwrap();
        assert!(loaded[0].owner_shard.is_none());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let mut rng = rand::thread_rng();
        let key = derive_key("carol", "s3cr3t");
        let wrong_key = derive_key("carol", "wrong");
        let record = ProfileRecord {
            user_set_id: UserSetId::new_v4(),
            pub_reg: dummy_point(),
            pub_own: dummy_point(),
            reg_shard: Shard {
                id: 1,
                value: Scalar::sample(&mut rng),
            },
            owner_shard: None,
        };

        let mut store = MemoryStore::default();
        save(&mut store, &key, std::slice::from_ref(&record), &mut rng).unwrap();
        assert!(load(&store, &wrong_key).is_err());
    }
}
