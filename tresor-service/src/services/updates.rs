//! `Updates`: the per-user mailbox service backing `UpdateRequest` (spec
//! §3's "five disjoint record kinds", §4.F.4 "Update drain").
//!
//! Grounded on `examples/original_source/senc/server/UpdateManager.hpp`:
//! one `HashMap<username, accumulator>` behind one mutex, with a
//! `register_*` method per record kind and a draining `retrieve_updates`.
//! This crate represents the accumulator as `Vec<UpdateRecord>` rather than
//! the original's already-shaped `UpdateResponse`, since `UpdateRecord`
//! (this crate's wire type) already carries all five kinds in one enum.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use tresor_types::update::UpdateRecord;

/// The update-queue service. Cheap to clone (an `Arc` handle).
#[derive(Clone, Default)]
pub struct Updates(Arc<Mutex<HashMap<String, Vec<UpdateRecord>>>>);

impl Updates {
    /// Creates an empty update-queue service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one record to `username`'s queue.
    pub fn push(&self, username: &str, record: UpdateRecord) {
        self.0
            .lock()
            .entry(username.to_owned())
            .or_default()
            .push(record);
    }

    /// Atomically drains and returns `username`'s queue, oldest first. An
    /// unknown or empty user simply yields an empty vector.
    pub fn drain(&self, username: &str) -> Vec<UpdateRecord> {
        self.0
            .lock()
            .get_mut(username)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tresor_types::ids::OperationId;

    #[test]
    fn drain_returns_records_in_arrival_order_and_empties_the_queue() {
        let updates = Updates::new();
        let op_a = OperationId::new_v4();
        let op_b = OperationId::new_v4();
        updates.push("alice", UpdateRecord::OnLookup { op_id: op_a });
        updates.push("alice", UpdateRecord::OnLookup { op_id: op_b });

        let drained = updates.drain("alice");
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], UpdateRecord::OnLookup { op_id } if op_id == op_a));
        assert!(matches!(drained[1], UpdateRecord::OnLookup { op_id } if op_id == op_b));
        assert!(updates.drain("alice").is_empty());
    }

    #[test]
    fn unknown_user_drains_empty() {
        let updates = Updates::new();
        assert!(updates.drain("nobody").is_empty());
    }
}
