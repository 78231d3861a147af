//! Per-node finger table: `M` shortcut pointers for O(log N) routing
//! (spec.md §3, §4.1), grounded on `server/chord/finger_table.py` and the
//! teacher's `finger_table.rs`.

use crate::id::{Id, M};
use crate::node::node_ref::NodeRef;

#[derive(Clone)]
pub struct FingerEntry {
    /// `(owner.id + 2^i) mod 2^160` — the position this entry routes for.
    pub start: Id,
    pub node: NodeRef,
}

pub struct FingerTable {
    entries: Vec<FingerEntry>,
}

impl FingerTable {
    /// Initializes all `M` entries pointing at `self` (spec.md §3: "initially
    /// all entries point to self").
    pub fn new(owner_id: &Id, self_ref: &NodeRef) -> Self {
        let entries = (0..M)
            .map(|i| FingerEntry {
                start: owner_id.add_pow2(i),
                node: self_ref.clone(),
            })
            .collect();
        FingerTable { entries }
    }

    pub fn get(&self, index: usize) -> &FingerEntry {
        &self.entries[index]
    }

    pub fn set_node(&mut self, index: usize, node: NodeRef) {
        self.entries[index].node = node;
    }

    pub fn set_all(&mut self, node: &NodeRef) {
        for entry in &mut self.entries {
            entry.node = node.clone();
        }
    }

    /// Clears entries `[from, M)`, used when `fix_fingers` discovers a
    /// self-pointing finger and must restart (spec.md §4.1).
    pub fn clear_from(&mut self, from: usize, self_ref: &NodeRef) {
        for entry in self.entries[from..].iter_mut() {
            entry.node = self_ref.clone();
        }
    }

    /// `closest_preceding_finger(id)`: scan from `M-1` down to `0`, return
    /// the first entry whose node id lies in `(self.id, id)`.
    pub fn closest_preceding_finger(&self, self_ref: &NodeRef, id: &Id) -> NodeRef {
        for entry in self.entries.iter().rev() {
            if entry.node.id != self_ref.id && entry.node.id.is_between(&self_ref.id, id) {
                return entry.node.clone();
            }
        }
        self_ref.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FingerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_all_pointing_to_self() {
        let self_ref = NodeRef::new("10.0.0.1", 9000);
        let table = FingerTable::new(&self_ref.id, &self_ref);
        assert!(table.iter().all(|e| e.node.id == self_ref.id));
    }

    #[test]
    fn closest_preceding_finger_falls_back_to_self() {
        let self_ref = NodeRef::new("10.0.0.1", 9000);
        let table = FingerTable::new(&self_ref.id, &self_ref);
        let target = self_ref.id.add_pow2(5);
        let found = table.closest_preceding_finger(&self_ref, &target);
        assert_eq!(found.id, self_ref.id);
    }
}
