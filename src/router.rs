//! Router: `find_predecessor` / `find_successor` / `closest_preceding_finger`
//! plus the `fix_fingers` maintenance loop (spec.md §4.1, C3+C4).

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::core::{sleep_or_shutdown, ChordNode};
use crate::id::{Id, M};
use crate::node::NodeRef;
use crate::rpc::client;

/// How often `fix_fingers` runs a full index advance (spec.md §4.1:
/// "T_finger ≈ 60 s").
pub const FIX_FINGERS_PERIOD: Duration = Duration::from_secs(60);

impl ChordNode {
    /// Purely local: scans the finger table from `M-1` down to `0`.
    pub fn closest_preceding_finger_local(&self, id: &Id) -> NodeRef {
        self.finger_table
            .lock()
            .unwrap()
            .closest_preceding_finger(&self.self_ref, id)
    }

    /// `find_predecessor(id)`: the first hop consults the local finger
    /// table; every following hop is a remote `CLOSEST_PRECEDING_FINGER`
    /// call (spec.md §4.1).
    pub async fn find_predecessor(&self, id: &Id) -> NodeRef {
        let mut current = self.self_ref.clone();
        let mut first_hop = true;

        loop {
            let succ = if current.id == self.self_ref.id {
                self.successor()
            } else {
                match client::get_successor(&current, self.config.rpc_timeout).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("find_predecessor: get_successor({}) failed: {}", current, e);
                        return current;
                    }
                }
            };

            if id.is_between(&current.id, &succ.id) {
                return current;
            }

            let next = if first_hop {
                first_hop = false;
                self.closest_preceding_finger_local(id)
            } else {
                match client::closest_preceding_finger(&current, id, self.config.rpc_timeout).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("find_predecessor: closest_preceding_finger({}) failed: {}", current, e);
                        return current;
                    }
                }
            };

            if next.id == current.id {
                // no progress possible, current is the closest we can get
                return current;
            }
            current = next;
        }
    }

    /// `find_successor(id) = find_predecessor(id).successor`.
    pub async fn find_successor(&self, id: &Id) -> NodeRef {
        let predecessor = self.find_predecessor(id).await;
        if predecessor.id == self.self_ref.id {
            self.successor()
        } else {
            match client::get_successor(&predecessor, self.config.rpc_timeout).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("find_successor: get_successor({}) failed: {}", predecessor, e);
                    predecessor
                }
            }
        }
    }

    /// One `fix_fingers` sweep step: advances the round-robin index and
    /// refreshes that single finger.
    pub async fn fix_fingers_once(&self) {
        let index = {
            let mut idx = self.fix_finger_index.lock().unwrap();
            let current = *idx;
            *idx = (current + 1) % M;
            current
        };

        let target = self.id().add_pow2(index);
        let found = self.find_successor(&target).await;

        if found.id == self.id() && !self.is_alone() {
            warn!("fix_fingers: finger {} resolved to self, resetting tail", index);
            self.finger_table
                .lock()
                .unwrap()
                .clear_from(index, &self.self_ref);
            *self.fix_finger_index.lock().unwrap() = 0;
            return;
        }

        self.finger_table.lock().unwrap().set_node(index, found);
    }

    pub async fn fix_fingers_loop(self: Arc<Self>) {
        info!("fix_fingers loop started");
        let mut shutdown = self.shutdown_signal();
        loop {
            self.fix_fingers_once().await;
            if sleep_or_shutdown(FIX_FINGERS_PERIOD, &mut shutdown).await {
                break;
            }
        }
    }
}
