//! `Operations`: the decryption coordination state machine (spec §4.F.4) —
//! prepare → lookup → collect → finish, across two independently-locked
//! maps with a fixed lock-ordering discipline.
//!
//! Grounded directly on
//! `examples/original_source/senc/server/DecryptionsManager.hpp`/`.cpp`:
//! `PrepareRecord`/`CollectedRecord` keep their shape (renamed to this
//! crate's idiom), and [`Operations::register_part`] is a line-for-line
//! port of `DecryptionsManager::register_part` — lock `collected` first,
//! append, then lock `prep` to check both thresholds, and only then erase
//! from both maps if satisfied. The lock order matches §5's discipline:
//! "when two of `{prep, collected}` must be held, acquire `collected`
//! before `prep`".

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use tresor_core::elgamal::Ciphertext;
use tresor_core::group::Point;
use tresor_types::ids::{OperationId, ShardId, UserSetId};

/// An operation's preparation state: what it needs, and who has already
/// claimed a contribution toward each layer.
struct PrepareRecord {
    ciphertext: Ciphertext,
    userset_id: UserSetId,
    requester: String,
    initiator_reg_shard_id: ShardId,
    initiator_owner_shard_id: ShardId,
    /// Additional owner-layer parts still required, beyond the initiator's
    /// own (client-side) contribution.
    required_owners: u8,
    /// Additional registry-layer parts still required, beyond the
    /// initiator's own (client-side) contribution.
    required_reg_members: u8,
    owners_found: HashMap<String, ShardId>,
    reg_members_found: HashMap<String, ShardId>,
}

/// A single layer's collected parts, paired with the shard id each came
/// from.
#[derive(Default)]
struct LayerParts {
    parts: Vec<Point>,
    shard_ids: Vec<ShardId>,
}

#[derive(Default)]
struct CollectedRecord {
    reg: LayerParts,
    own: LayerParts,
}

/// The fully collected result of a finished operation, handed to the
/// initiator via their update queue.
pub struct FinishedOperation {
    pub op_id: OperationId,
    pub userset_id: UserSetId,
    pub requester: String,
    pub reg_parts: Vec<Point>,
    pub reg_shard_ids: Vec<ShardId>,
    pub own_parts: Vec<Point>,
    pub own_shard_ids: Vec<ShardId>,
}

/// Once a layer's participant quota is reached, every participant in it
/// (the one who just filled the last slot, and everyone selected before
/// them) is told the full reconstruction set for that layer via a
/// `ToDecrypt` update record.
pub struct LayerFilled {
    /// Usernames to notify — every participant selected for this layer.
    pub participants: Vec<String>,
    /// The full shard id set that will reconstruct this layer: the
    /// initiator's shard id plus every selected participant's (spec I3).
    pub shard_ids: Vec<ShardId>,
}

/// The outcome of a [`Operations::lookup`] call.
pub enum LookupOutcome {
    /// `M`'s registry-layer contribution is still needed.
    SendRegLayerPart {
        shard_id: ShardId,
        /// `Some` if this call was the one that completed the layer's
        /// quota.
        filled: Option<LayerFilled>,
    },
    /// `M`'s owner-layer contribution is still needed.
    SendOwnerLayerPart {
        shard_id: ShardId,
        /// `Some` if this call was the one that completed the layer's
        /// quota.
        filled: Option<LayerFilled>,
    },
    /// Nothing further is needed from `M` for this operation.
    NotRequired,
}

/// Looked-up bits of an operation needed to drive the prepare/lookup/finish
/// steps without leaking the lock-guarded records themselves.
pub struct PreparedOperation {
    pub ciphertext: Ciphertext,
    pub userset_id: UserSetId,
}

/// The decryption coordination service. Cheap to clone (an `Arc` handle).
#[derive(Clone, Default)]
pub struct Operations(Arc<Inner>);

#[derive(Default)]
struct Inner {
    prep: Mutex<HashMap<OperationId, PrepareRecord>>,
    collected: Mutex<HashMap<OperationId, CollectedRecord>>,
}

impl Operations {
    /// Creates an empty coordination service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly prepared operation (spec §4.F.4 "Preparation").
    #[allow(clippy::too_many_arguments)]
    pub fn register_operation(
        &self,
        op_id: OperationId,
        userset_id: UserSetId,
        requester: String,
        ciphertext: Ciphertext,
        initiator_reg_shard_id: ShardId,
        initiator_owner_shard_id: ShardId,
        required_owners: u8,
        required_reg_members: u8,
    ) {
        self.0.prep.lock().insert(
            op_id,
            PrepareRecord {
                ciphertext,
                userset_id,
                requester,
                initiator_reg_shard_id,
                initiator_owner_shard_id,
                required_owners,
                required_reg_members,
                owners_found: HashMap::new(),
                reg_members_found: HashMap::new(),
            },
        );
    }

    /// Looks up `op_id`'s ciphertext and userset, for building `on_lookup`/
    /// `to_decrypt` update records without holding the lock any longer than
    /// needed.
    pub fn prepared(&self, op_id: OperationId) -> Option<PreparedOperation> {
        self.0.prep.lock().get(&op_id).map(|rec| PreparedOperation {
            ciphertext: rec.ciphertext.clone(),
            userset_id: rec.userset_id,
        })
    }

    /// Implements spec §4.F.4 "Lookup": `member` volunteers for `op_id`.
    /// `is_owner` says whether `member` holds an owner-layer shard in the
    /// operation's userset; `reg_shard_id`/`owner_shard_id` are `member`'s
    /// shard ids, looked up by the caller beforehand.
    ///
    /// A member may claim at most once per layer (idempotence, §4.F.5): a
    /// repeat call after already being recorded returns `NotRequired`.
    pub fn lookup(
        &self,
        op_id: OperationId,
        member: &str,
        is_owner: bool,
        reg_shard_id: ShardId,
        owner_shard_id: Option<ShardId>,
    ) -> LookupOutcome {
        let mut prep = self.0.prep.lock();
        let Some(record) = prep.get_mut(&op_id) else {
            return LookupOutcome::NotRequired;
        };

        // Owners contribute the owner layer first; only fall back to the
        // registry layer if the owner layer no longer needs them (mirrors
        // the original's "non-owner, or an owner whose reg-layer
        // contribution is still needed" phrasing).
        if is_owner {
            if let Some(owner_shard_id) = owner_shard_id {
                if record.owners_found.len() < record.required_owners as usize
                    && !record.owners_found.contains_key(member)
                {
                    record
                        .owners_found
                        .insert(member.to_owned(), owner_shard_id);
                    let filled = (record.owners_found.len() == record.required_owners as usize)
                        .then(|| layer_filled(record.initiator_owner_shard_id, &record.owners_found));
                    return LookupOutcome::SendOwnerLayerPart {
                        shard_id: owner_shard_id,
                        filled,
                    };
                }
            }
        }
        if record.reg_members_found.len() < record.required_reg_members as usize
            && !record.reg_members_found.contains_key(member)
        {
            record
                .reg_members_found
                .insert(member.to_owned(), reg_shard_id);
            let filled = (record.reg_members_found.len() == record.required_reg_members as usize)
                .then(|| layer_filled(record.initiator_reg_shard_id, &record.reg_members_found));
            return LookupOutcome::SendRegLayerPart {
                shard_id: reg_shard_id,
                filled,
            };
        }
        LookupOutcome::NotRequired
    }

    /// Implements spec §4.F.4 "Collection": records `member`'s submitted
    /// part. Returns `Some` once both layers have reached their required
    /// counts, atomically removing the operation from both maps — a
    /// finished operation can only ever be returned once.
    ///
    /// `SendDecryptionPart` for an operation no longer in `collected` (i.e.
    /// already finished) is a silent no-op per §4.F.5.
    pub fn register_part(
        &self,
        op_id: OperationId,
        part: Point,
        shard_id: ShardId,
        is_owner_layer: bool,
    ) -> Option<FinishedOperation> {
        let mut collected = self.0.collected.lock();
        let record = collected.entry(op_id).or_default();
        let layer = if is_owner_layer {
            &mut record.own
        } else {
            &mut record.reg
        };
        layer.parts.push(part);
        layer.shard_ids.push(shard_id);

        let mut prep = self.0.prep.lock();
        let Some(prepared) = prep.get(&op_id) else {
            // No matching preparation: either a stray duplicate or the
            // operation already finished and was erased. Leave the
            // half-built collected record in place; a second legitimate
            // part for a *different*, still-prepared operation is
            // unaffected since the map is keyed by `op_id`.
            return None;
        };
        let satisfied = record.reg.parts.len() >= prepared.required_reg_members as usize
            && record.own.parts.len() >= prepared.required_owners as usize;
        if !satisfied {
            return None;
        }

        let record = collected.remove(&op_id).expect("just inserted above");
        let prepared = prep.remove(&op_id).expect("just matched above");
        Some(FinishedOperation {
            op_id,
            userset_id: prepared.userset_id,
            requester: prepared.requester,
            reg_parts: record.reg.parts,
            reg_shard_ids: record.reg.shard_ids,
            own_parts: record.own.parts,
            own_shard_ids: record.own.shard_ids,
        })
    }
}

fn layer_filled(initiator_shard_id: ShardId, found: &HashMap<String, ShardId>) -> LayerFilled {
    let participants = found.keys().cloned().collect();
    let shard_ids = std::iter::once(initiator_shard_id)
        .chain(found.values().copied())
        .collect();
    LayerFilled {
        participants,
        shard_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;
    use tresor_core::elgamal;
    use tresor_core::group::Scalar;

    fn dummy_ciphertext() -> Ciphertext {
        let mut rng = thread_rng();
        let kp1 = elgamal::KeyPair::generate(&mut rng);
        let kp2 = elgamal::KeyPair::generate(&mut rng);
        elgamal::encrypt(&mut rng, &kp1.pk, &kp2.pk, b"hi").unwrap()
    }

    fn register(ops: &Operations, op_id: OperationId, required_owners: u8, required_reg: u8) {
        ops.register_operation(
            op_id,
            UserSetId::new_v4(),
            "owner".into(),
            dummy_ciphertext(),
            ShardId(1),
            ShardId(1),
            required_owners,
            required_reg,
        );
    }

    #[test]
    fn finishes_once_both_layers_reach_threshold() {
        let ops = Operations::new();
        let op_id = OperationId::new_v4();
        register(&ops, op_id, 0, 1);

        let point = Point::from_scalar(&Scalar::sample(&mut thread_rng()));
        assert!(ops
            .register_part(op_id, point, ShardId(2), false)
            .is_some());
    }

    #[test]
    fn duplicate_lookup_from_same_member_is_not_required() {
        let ops = Operations::new();
        let op_id = OperationId::new_v4();
        register(&ops, op_id, 0, 1);
        let first = ops.lookup(op_id, "member", false, ShardId(2), None);
        assert!(matches!(first, LookupOutcome::SendRegLayerPart { .. }));
        let second = ops.lookup(op_id, "member", false, ShardId(2), None);
        assert!(matches!(second, LookupOutcome::NotRequired));
    }

    #[test]
    fn excess_participants_beyond_threshold_are_not_required() {
        let ops = Operations::new();
        let op_id = OperationId::new_v4();
        register(&ops, op_id, 0, 1);
        assert!(matches!(
            ops.lookup(op_id, "alice", false, ShardId(2), None),
            LookupOutcome::SendRegLayerPart { .. }
        ));
        assert!(matches!(
            ops.lookup(op_id, "bob", false, ShardId(3), None),
            LookupOutcome::NotRequired
        ));
    }

    #[test]
    fn filled_layer_reports_the_full_reconstruction_set() {
        let ops = Operations::new();
        let op_id = OperationId::new_v4();
        register(&ops, op_id, 0, 2);
        let first = ops.lookup(op_id, "alice", false, ShardId(2), None);
        assert!(matches!(
            first,
            LookupOutcome::SendRegLayerPart { filled: None, .. }
        ));
        let second = ops.lookup(op_id, "bob", false, ShardId(3), None);
        match second {
            LookupOutcome::SendRegLayerPart {
                filled: Some(filled),
                ..
            } => {
                assert_eq!(filled.participants.len(), 2);
                // initiator's shard id (1) plus alice's (2) and bob's (3).
                let mut ids: Vec<u64> = filled.shard_ids.iter().map(|s| s.0).collect();
                ids.sort_unstable();
                assert_eq!(ids, vec![1, 2, 3]);
            }
            _ => panic!("expected the second lookup to fill the layer"),
        }
    }

    #[test]
    fn part_after_finish_is_silently_dropped() {
        let ops = Operations::new();
        let op_id = OperationId::new_v4();
        register(&ops, op_id, 0, 1);
        let point = Point::from_scalar(&Scalar::sample(&mut thread_rng()));
        assert!(ops
            .register_part(op_id, point, ShardId(2), false)
            .is_some());
        assert!(ops
            .register_part(op_id, point, ShardId(3), false)
            .is_none());
    }
}
