//! `UserSet`: a group of users sharing a two-layer ElGamal keypair, each
//! layer's secret Shamir-shared across that layer's members.

use std::collections::HashMap;

use tresor_core::group::Point;

use crate::ids::{ShardId, UserSetId};

/// A userset's public record as known to the server.
///
/// `reg_members_threshold <= reg_members.len() + owners.len()` and
/// `owners_threshold <= owners.len()`; both are enforced at creation time
/// and never change afterward — no membership or threshold reconfiguration.
///
/// `reg_members` lists only the non-owner registry-layer participants;
/// owners additionally hold a registry-layer shard (I4/§3 — owners count as
/// reg-layer participants), tracked in `reg_shard_ids` alongside everyone
/// else's.
#[derive(Debug, Clone)]
pub struct UserSet {
    /// This userset's id.
    pub id: UserSetId,
    /// Usernames holding a registry-layer shard but no owner-layer shard.
    pub reg_members: Vec<String>,
    /// Usernames holding both a registry-layer and an owner-layer shard.
    pub owners: Vec<String>,
    /// Shards required to reconstruct the registry layer's contribution.
    pub reg_members_threshold: u8,
    /// Shards required to reconstruct the owner layer's contribution.
    pub owners_threshold: u8,
    /// Registry layer (layer 1) public key.
    pub pub_key1: Point,
    /// Owner layer (layer 2) public key.
    pub pub_key2: Point,
    /// Registry-layer shard id assigned to each owner and non-owner member.
    pub reg_shard_ids: HashMap<String, ShardId>,
    /// Owner-layer shard id assigned to each owner.
    pub owner_shard_ids: HashMap<String, ShardId>,
}

impl UserSet {
    /// `true` iff `username` holds an owner-layer shard.
    pub fn is_owner(&self, username: &str) -> bool {
        self.owners.iter().any(|o| o == username)
    }

    /// `true` iff `username` holds a registry-layer shard (owners included).
    pub fn is_reg_member(&self, username: &str) -> bool {
        self.reg_shard_ids.contains_key(username)
    }

    /// Every username holding a registry-layer shard: owners first, then
    /// non-owner registry members, matching creation order.
    pub fn reg_participants(&self) -> impl Iterator<Item = &String> {
        self.owners.iter().chain(self.reg_members.iter())
    }
}
