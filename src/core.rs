//! The node itself: the single struct that owns every piece of state
//! listed in spec.md §2 (C1-C10, C12). Router, stabilizer, discoverer,
//! elector and replicator behavior are implemented as separate `impl
//! ChordNode` blocks in their own modules — this mirrors the original
//! Python `Node` class, which aggregates a `FingerTable`, `Timer`,
//! `Elector`, `Discoverer` and `Replicator` but keeps no other
//! process-wide mutable state (spec.md §9).

use std::sync::Mutex;

use tokio::sync::watch;

use crate::config::NodeConfig;
use crate::id::Id;
use crate::node::{BoundedList, FingerTable, NodeRef};
use crate::storage::Storage;
use crate::timer::Timer;

pub struct ChordNode {
    pub self_ref: NodeRef,
    pub config: NodeConfig,

    pub successors: Mutex<BoundedList<NodeRef>>,
    pub predecessors: Mutex<BoundedList<NodeRef>>,
    pub finger_table: Mutex<FingerTable>,
    pub fix_finger_index: Mutex<usize>,
    pub leader: Mutex<NodeRef>,

    pub timer: Timer,
    pub storage: Storage,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ChordNode {
    pub fn new(config: NodeConfig) -> Self {
        let self_ref = NodeRef::new(config.address.clone(), config.port);
        let finger_table = FingerTable::new(&self_ref.id, &self_ref);
        let successors = BoundedList::new(config.list_capacity, self_ref.clone());
        let predecessors = BoundedList::new(config.list_capacity, self_ref.clone());
        let timer = Timer::new(self_ref.id);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        ChordNode {
            leader: Mutex::new(self_ref.clone()),
            self_ref,
            config,
            successors: Mutex::new(successors),
            predecessors: Mutex::new(predecessors),
            finger_table: Mutex::new(finger_table),
            fix_finger_index: Mutex::new(0),
            timer,
            storage: Storage::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn id(&self) -> Id {
        self.self_ref.id
    }

    pub fn successor(&self) -> NodeRef {
        self.successors.lock().unwrap().get(0)
    }

    pub fn set_successor(&self, node: NodeRef) {
        let mut successors = self.successors.lock().unwrap();
        successors.set(0, node.clone());
        drop(successors);
        self.finger_table.lock().unwrap().set_node(0, node);
    }

    pub fn predecessor(&self) -> NodeRef {
        self.predecessors.lock().unwrap().get(0)
    }

    pub fn is_leader(&self) -> bool {
        self.leader.lock().unwrap().id == self.self_ref.id
    }

    pub fn is_alone(&self) -> bool {
        let succ = self.successor();
        let pred = self.predecessor();
        succ.id == self.self_ref.id && pred.id == self.self_ref.id
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn shut_down(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Sleeps for `period`, waking early (and returning `true`) if shutdown was
/// signaled. Every background loop in `supervisor.rs` uses this instead of
/// a bare `tokio::time::sleep` so it reacts to the shutdown signal at the
/// top of each iteration (spec.md §5).
pub async fn sleep_or_shutdown(period: std::time::Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        _ = shutdown.changed() => true,
    }
}
