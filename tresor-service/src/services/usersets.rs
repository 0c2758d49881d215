//! `UserSets`: the make-userset flow (spec §4.F.3) — validates membership
//! and thresholds, generates both ElGamal layers, Shamir-shares each across
//! its layer's participants, and fans the resulting shards out through
//! [`crate::services::updates::Updates`].
//!
//! Every owner, the creator included, learns their shards the same way:
//! through their own update queue as an `AddedAsOwner` record. Treating the
//! creator as just another owner keeps `MakeUserSetResponse` to the bare
//! userset id and the update queue as the single delivery path for key
//! material, rather than special-casing one recipient of the creation
//! flow.
//!
//! Grounded on `examples/original_source/senc/server/storage/IServerStorage.hpp`'s
//! `new_userset` for the validation shape, and on `tresor_core::{elgamal,
//! shamir}` for the cryptography itself (this module only orchestrates —
//! it never touches group arithmetic directly).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::OsRng;

use tresor_core::elgamal::KeyPair;
use tresor_core::shamir;
use tresor_types::ids::{ShardId, UserSetId};
use tresor_types::update::UpdateRecord;
use tresor_types::userset::UserSet;

use crate::error::Error;
use crate::services::storage::ServerStorage;
use crate::services::updates::Updates;

/// The make-userset service. Cheap to clone.
#[derive(Clone)]
pub struct UserSets {
    storage: Arc<dyn ServerStorage>,
    updates: Updates,
}

impl UserSets {
    /// Wires the service to its collaborators.
    pub fn new(storage: Arc<dyn ServerStorage>, updates: Updates) -> Self {
        Self { storage, updates }
    }

    /// Implements spec §4.F.3 end to end. `creator` is folded into `owners`
    /// if not already present there (construction guarantee: the creator
    /// is always an owner). Returns the new userset's id; every
    /// participant, creator included, receives their shards via their
    /// update queue.
    pub fn create(
        &self,
        creator: &str,
        mut owners: Vec<String>,
        mut reg_members: Vec<String>,
        owners_threshold: u8,
        reg_members_threshold: u8,
        max_members: u8,
    ) -> Result<UserSetId, Error> {
        dedup_preserving_order(&mut owners);
        if !owners.iter().any(|o| o == creator) {
            owners.push(creator.to_owned());
        }
        reg_members.retain(|m| !owners.contains(m));
        dedup_preserving_order(&mut reg_members);

        for username in owners.iter().chain(reg_members.iter()) {
            if !self.storage.user_exists(username) {
                return Err(Error::Validation(format!("unknown user {username:?}")));
            }
        }
        if owners_threshold as usize > owners.len() {
            return Err(Error::Validation(format!(
                "owners threshold {owners_threshold} exceeds owner count {}",
                owners.len()
            )));
        }
        let total_reg_participants = owners.len() + reg_members.len();
        if reg_members_threshold as usize > total_reg_participants {
            return Err(Error::Validation(format!(
                "registry threshold {reg_members_threshold} exceeds participant count {total_reg_participants}"
            )));
        }
        if total_reg_participants > max_members as usize {
            return Err(Error::Validation(format!(
                "userset would have {total_reg_participants} members, over the {max_members} limit"
            )));
        }

        let mut rng = OsRng;
        let reg_keys = KeyPair::generate(&mut rng);
        let own_keys = KeyPair::generate(&mut rng);

        // Reconstruction needs the initiator's own shard plus `threshold`
        // more from others, so the polynomial degree (and hence the
        // `tresor_core::shamir` "threshold" parameter, which is the
        // reconstruction shard count) is `required + 1`.
        let reg_shards = shamir::split(
            reg_keys.sk,
            total_reg_participants as u8,
            reg_members_threshold.saturating_add(1),
            &mut rng,
        );
        let own_shards = shamir::split(
            own_keys.sk,
            owners.len() as u8,
            owners_threshold.saturating_add(1),
            &mut rng,
        );

        let reg_shard_of: HashMap<&str, _> = owners
            .iter()
            .chain(reg_members.iter())
            .map(String::as_str)
            .zip(reg_shards.iter().copied())
            .collect();
        let own_shard_of: HashMap<&str, _> = owners
            .iter()
            .map(String::as_str)
            .zip(own_shards.iter().copied())
            .collect();

        let reg_shard_ids: HashMap<String, ShardId> = reg_shard_of
            .iter()
            .map(|(user, shard)| ((*user).to_owned(), ShardId(shard.id)))
            .collect();
        let owner_shard_ids: HashMap<String, ShardId> = own_shard_of
            .iter()
            .map(|(user, shard)| ((*user).to_owned(), ShardId(shard.id)))
            .collect();

        let userset_id = UserSetId::new_v4();
        let userset = UserSet {
            id: userset_id,
            reg_members: reg_members.clone(),
            owners: owners.clone(),
            reg_members_threshold,
            owners_threshold,
            pub_key1: reg_keys.pk,
            pub_key2: own_keys.pk,
            reg_shard_ids,
            owner_shard_ids,
        };
        self.storage.new_userset(userset);

        for owner in &owners {
            self.updates.push(
                owner,
                UpdateRecord::AddedAsOwner {
                    user_set_id: userset_id,
                    pub_key1: reg_keys.pk,
                    pub_key2: own_keys.pk,
                    reg_shard_id: ShardId(reg_shard_of[owner.as_str()].id),
                    priv_key1_shard: reg_shard_of[owner.as_str()].value,
                    owner_shard_id: ShardId(own_shard_of[owner.as_str()].id),
                    priv_key2_shard: own_shard_of[owner.as_str()].value,
                },
            );
        }
        for member in &reg_members {
            self.updates.push(
                member,
                UpdateRecord::AddedAsMember {
                    user_set_id: userset_id,
                    pub_key1: reg_keys.pk,
                    pub_key2: own_keys.pk,
                    reg_shard_id: ShardId(reg_shard_of[member.as_str()].id),
                    priv_key1_shard: reg_shard_of[member.as_str()].value,
                },
            );
        }

        Ok(userset_id)
    }
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::InMemoryStorage;

    #[test]
    fn creator_is_folded_into_owners_and_receives_an_update() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.new_user("owner", "pw").unwrap();
        storage.new_user("member", "pw").unwrap();
        let updates = Updates::new();
        let usersets = UserSets::new(storage.clone(), updates.clone());

        let userset_id = usersets
            .create("owner", vec![], vec!["member".into()], 0, 1, u8::MAX)
            .unwrap();

        assert!(storage.user_is_owner("owner", userset_id));
        assert!(storage.user_is_member("member", userset_id));
        let owner_updates = updates.drain("owner");
        assert_eq!(owner_updates.len(), 1);
        assert!(matches!(owner_updates[0], UpdateRecord::AddedAsOwner { .. }));
        let member_updates = updates.drain("member");
        assert_eq!(member_updates.len(), 1);
        assert!(matches!(
            member_updates[0],
            UpdateRecord::AddedAsMember { .. }
        ));
    }

    #[test]
    fn unknown_member_is_rejected() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.new_user("owner", "pw").unwrap();
        let usersets = UserSets::new(storage, Updates::new());
        let err = usersets
            .create("owner", vec![], vec!["ghost".into()], 0, 0, u8::MAX)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn threshold_exceeding_owner_count_is_rejected() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.new_user("owner", "pw").unwrap();
        let usersets = UserSets::new(storage, Updates::new());
        let err = usersets
            .create("owner", vec![], vec![], 5, 0, u8::MAX)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
