//! Tracks the Shamir shards a client learns about through `Update` records,
//! so `Client` can act as a participant (answer `SendRegLayerPart`/
//! `SendOwnerLayerPart`) or an initiator (fold its own contribution into a
//! finished operation) without any external bookkeeping.
//!
//! Grounded on `oprf-client/src/sessions.rs`'s per-session bookkeeping
//! struct, adapted here to per-userset key material instead of per-request
//! websocket sessions.

use std::collections::HashMap;

use tresor_core::group::Point;
use tresor_core::shamir::Shard;
use tresor_types::ids::{OperationId, ShardId, UserSetId};
use tresor_types::update::UpdateRecord;

/// Shard material this client holds for one userset.
#[derive(Debug, Clone)]
pub struct OwnedShards {
    /// Registry layer public key.
    pub pub_key1: Point,
    /// Owner layer public key.
    pub pub_key2: Point,
    /// This client's registry-layer shard, if it is a registry member.
    pub reg_shard: Option<Shard>,
    /// This client's owner-layer shard, if it is an owner.
    pub owner_shard: Option<Shard>,
}

/// What applying an [`UpdateRecord`] means for the caller to do next.
pub enum Applied {
    /// The record was purely informational (new shard material noted, or a
    /// `ToDecrypt` notice that only matters once the participant answers
    /// the corresponding `DecryptParticipate` call).
    Noted,
    /// The caller should call `Client::decrypt_participate` for this
    /// operation to find out whether its shard is needed.
    ShouldParticipate(OperationId),
    /// An operation this client initiated finished collecting its parts;
    /// the caller should combine these with its own local contribution via
    /// [`crate::finish_decryption`].
    Finished {
        /// The finished operation's id.
        op_id: OperationId,
        /// The userset the operation ran against.
        user_set_id: UserSetId,
        /// Collected registry-layer partial decryptions.
        reg_parts: Vec<Point>,
        /// Shard ids the registry-layer parts were computed from.
        reg_shard_ids: Vec<ShardId>,
        /// Collected owner-layer partial decryptions.
        own_parts: Vec<Point>,
        /// Shard ids the owner-layer parts were computed from.
        own_shard_ids: Vec<ShardId>,
    },
}

/// A client's record of the Shamir shards it holds, keyed by userset.
#[derive(Debug, Clone, Default)]
pub struct ShardBook {
    entries: HashMap<UserSetId, OwnedShards>,
}

impl ShardBook {
    /// An empty shard book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one drained `UpdateRecord`, updating this book's shard
    /// material as a side effect and reporting what the caller should do
    /// next.
    pub fn apply(&mut self, record: UpdateRecord) -> Applied {
        match record {
            UpdateRecord::AddedAsMember {
                user_set_id,
                pub_key1,
                pub_key2,
                reg_shard_id,
                priv_key1_shard,
            } => {
                let entry = self.entries.entry(user_set_id).or_insert(OwnedShards {
                    pub_key1,
                    pub_key2,
                    reg_shard: None,
                    owner_shard: None,
                });
                entry.reg_shard = Some(Shard {
                    id: reg_shard_id.0,
                    value: priv_key1_shard,
                });
                Applied::Noted
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
                let entry = self.entries.entry(user_set_id).or_insert(OwnedShards {
                    pub_key1,
                    pub_key2,
                    reg_shard: None,
                    owner_shard: None,
                });
                entry.reg_shard = Some(Shard {
                    id: reg_shard_id.0,
                    value: priv_key1_shard,
                });
                entry.owner_shard = Some(Shard {
                    id: owner_shard_id.0,
                    value: priv_key2_shard,
                });
                Applied::Noted
            }
            UpdateRecord::OnLookup { op_id } => Applied::ShouldParticipate(op_id),
            UpdateRecord::ToDecrypt { .. } => Applied::Noted,
            UpdateRecord::FinishedDecryption {
                op_id,
                user_set_id,
                reg_parts,
                own_parts,
                reg_shard_ids,
                own_shard_ids,
            } => Applied::Finished {
                op_id,
                user_set_id,
                reg_parts,
                reg_shard_ids,
                own_parts,
                own_shard_ids,
            },
        }
    }

    /// The shard material held for `user_set_id`, if any.
    pub fn shards_for(&self, user_set_id: UserSetId) -> Option<&OwnedShards> {
        self.entries.get(&user_set_id)
    }
}
