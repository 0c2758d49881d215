//! `UpdateRecord`/`UpdateQueue`: the per-user mailbox of events a client
//! learns about only through an explicit `Update` request.
//!
//! Records are appended in the order their triggering event was processed
//! and drained in that same order; draining is destructive (a record is
//! removed from the queue once sent).

use tresor_core::elgamal::Ciphertext;
use tresor_core::group::{Point, Scalar};

use crate::ids::{OperationId, ShardId, UserSetId};
use crate::wire::{self, WireDecode, WireEncode, WireError};

/// One event a user learns about through `Update`.
#[derive(Debug, Clone)]
pub enum UpdateRecord {
    /// The user was added as a registry-layer member of a new userset.
    AddedAsMember {
        /// The userset the member joined.
        user_set_id: UserSetId,
        /// Registry layer public key.
        pub_key1: Point,
        /// Owner layer public key.
        pub_key2: Point,
        /// The member's registry-layer shard id — the evaluation point
        /// `priv_key1_shard` is a value of. Without this, a client holding
        /// only the shard's value has no way to present it as a valid
        /// `Shard` for partial decryption or combination.
        reg_shard_id: ShardId,
        /// The member's registry-layer Shamir shard value.
        priv_key1_shard: Scalar,
    },
    /// The user was added as an owner-layer member of a new userset.
    AddedAsOwner {
        /// The userset the owner joined.
        user_set_id: UserSetId,
        /// Registry layer public key.
        pub_key1: Point,
        /// Owner layer public key.
        pub_key2: Point,
        /// The owner's registry-layer shard id.
        reg_shard_id: ShardId,
        /// The owner's registry-layer Shamir shard value.
        priv_key1_shard: Scalar,
        /// The owner's owner-layer shard id.
        owner_shard_id: ShardId,
        /// The owner's owner-layer Shamir shard value.
        priv_key2_shard: Scalar,
    },
    /// A decryption operation was prepared and this user should check in
    /// with `DecryptParticipate` to find out whether it's needed.
    OnLookup {
        /// The operation to look up.
        op_id: OperationId,
    },
    /// A decryption operation needs this user's participation.
    ToDecrypt {
        /// The operation to decrypt.
        op_id: OperationId,
        /// The ciphertext being decrypted.
        ciphertext: Ciphertext,
        /// Shard ids that will contribute to reconstructing this layer.
        shard_ids: Vec<ShardId>,
        /// `true` for the owner layer, `false` for the registry layer.
        is_owner_layer: bool,
    },
    /// A decryption operation finished collecting its parts.
    FinishedDecryption {
        /// The finished operation.
        op_id: OperationId,
        /// The userset the operation ran against.
        user_set_id: UserSetId,
        /// Collected registry-layer partial decryptions.
        reg_parts: Vec<Point>,
        /// Collected owner-layer partial decryptions.
        own_parts: Vec<Point>,
        /// Shard ids the registry-layer parts were computed from.
        reg_shard_ids: Vec<ShardId>,
        /// Shard ids the owner-layer parts were computed from.
        own_shard_ids: Vec<ShardId>,
    },
}

/// Tag byte identifying an [`UpdateRecord`] variant on the wire.
#[repr(u8)]
enum RecordTag {
    AddedAsMember = 0,
    AddedAsOwner = 1,
    OnLookup = 2,
    ToDecrypt = 3,
    FinishedDecryption = 4,
}

impl WireEncode for UpdateRecord {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            UpdateRecord::AddedAsMember {
                user_set_id,
                pub_key1,
                pub_key2,
                reg_shard_id,
                priv_key1_shard,
            } => {
                (RecordTag::AddedAsMember as u8).encode(out);
                user_set_id.encode(out);
                pub_key1.encode(out);
                pub_key2.encode(out);
                reg_shard_id.encode(out);
                priv_key1_shard.encode(out);
            }
            UpdateRecord::AddedAsOwner {
                user_set_id,
                pub_key1,
                pub_key2,
                reg_shard_id,
                priv_key1_shard,
                owner_shard_id,
                priv_key2_shard,
            } => {
                (RecordTag::AddedAsOwner as u8).encode(out);
                user_set_id.encode(out);
                pub_key1.encode(out);
                pub_key2.encode(out);
                reg_shard_id.encode(out);
                priv_key1_shard.encode(out);
                owner_shard_id.encode(out);
                priv_key2_shard.encode(out);
            }
            UpdateRecord::OnLookup { op_id } => {
                (RecordTag::OnLookup as u8).encode(out);
                op_id.encode(out);
            }
            UpdateRecord::ToDecrypt {
                op_id,
                ciphertext,
                shard_ids,
                is_owner_layer,
            } => {
                (RecordTag::ToDecrypt as u8).encode(out);
                op_id.encode(out);
                ciphertext.encode(out);
                wire::encode_vec(shard_ids, out).expect("shard id list within wire limit");
                is_owner_layer.encode(out);
            }
            UpdateRecord::FinishedDecryption {
                op_id,
                user_set_id,
                reg_parts,
                own_parts,
                reg_shard_ids,
                own_shard_ids,
            } => {
                (RecordTag::FinishedDecryption as u8).encode(out);
                op_id.encode(out);
                user_set_id.encode(out);
                wire::encode_vec(reg_parts, out).expect("part list within wire limit");
                wire::encode_vec(own_parts, out).expect("part list within wire limit");
                wire::encode_vec(reg_shard_ids, out).expect("shard id list within wire limit");
                wire::encode_vec(own_shard_ids, out).expect("shard id list within wire limit");
            }
        }
    }
}

impl WireDecode for UpdateRecord {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let tag = u8::decode(buf)?;
        Ok(match tag {
            0 => UpdateRecord::AddedAsMember {
                user_set_id: UserSetId::decode(buf)?,
                pub_key1: Point::decode(buf)?,
                pub_key2: Point::decode(buf)?,
                reg_shard_id: ShardId::decode(buf)?,
                priv_key1_shard: Scalar::decode(buf)?,
            },
            1 => UpdateRecord::AddedAsOwner {
                user_set_id: UserSetId::decode(buf)?,
                pub_key1: Point::decode(buf)?,
                pub_key2: Point::decode(buf)?,
                reg_shard_id: ShardId::decode(buf)?,
                priv_key1_shard: Scalar::decode(buf)?,
                owner_shard_id: ShardId::decode(buf)?,
                priv_key2_shard: Scalar::decode(buf)?,
            },
            2 => UpdateRecord::OnLookup {
                op_id: OperationId::decode(buf)?,
            },
            3 => UpdateRecord::ToDecrypt {
                op_id: OperationId::decode(buf)?,
                ciphertext: tresor_core::elgamal::Ciphertext::decode(buf)?,
                shard_ids: wire::decode_vec(buf)?,
                is_owner_layer: bool::decode(buf)?,
            },
            4 => UpdateRecord::FinishedDecryption {
                op_id: OperationId::decode(buf)?,
                user_set_id: UserSetId::decode(buf)?,
                reg_parts: wire::decode_vec(buf)?,
                own_parts: wire::decode_vec(buf)?,
                reg_shard_ids: wire::decode_vec(buf)?,
                own_shard_ids: wire::decode_vec(buf)?,
            },
            other => return Err(WireError::UnknownPacketCode(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_as_member_round_trips() {
        let mut rng = rand::thread_rng();
        let record = UpdateRecord::AddedAsMember {
            user_set_id: UserSetId::new_v4(),
            pub_key1: Point::from_scalar(&Scalar::sample(&mut rng)),
            pub_key2: Point::from_scalar(&Scalar::sample(&mut rng)),
            reg_shard_id: ShardId(7),
            priv_key1_shard: Scalar::sample(&mut rng),
        };
        let mut out = Vec::new();
        record.encode(&mut out);
        let mut buf = out.as_slice();
        let decoded = UpdateRecord::decode(&mut buf).unwrap();
        assert!(buf.is_empty());
        assert!(matches!(decoded, UpdateRecord::AddedAsMember { .. }));
    }
}
