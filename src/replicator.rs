//! Replicator: last-writer-wins storage operations, R-way fan-out across
//! the successor list, predecessor handoff and the `fix_storage` garbage
//! collector (spec.md §4.5, C9+C10). Grounded on `server/chord/replicator.py`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use rayon::prelude::*;

use crate::core::{sleep_or_shutdown, ChordNode};
use crate::id::Id;
use crate::node::NodeRef;
use crate::rpc::client;
use crate::storage::LocalRecord;

pub const FIX_STORAGE_PERIOD: Duration = Duration::from_secs(10);

/// The three maps exchanged by `SET_PARTITION`/`RESOLVE_DATA`: live values,
/// their versions, and tombstone versions. Kept as three parallel maps
/// (rather than one map of richer records) to mirror the original
/// `dict`/`version`/`removed_dict` triple.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub values: HashMap<String, Vec<u8>>,
    pub versions: HashMap<String, i64>,
    pub tombstones: HashMap<String, i64>,
}

impl From<Partition> for crate::rpc::chord_proto::PartitionMsg {
    fn from(p: Partition) -> Self {
        crate::rpc::chord_proto::PartitionMsg {
            values_json: serde_json::to_string(&p.values).unwrap_or_default(),
            versions_json: serde_json::to_string(&p.versions).unwrap_or_default(),
            tombstones_json: serde_json::to_string(&p.tombstones).unwrap_or_default(),
        }
    }
}

impl From<crate::rpc::chord_proto::PartitionMsg> for Partition {
    fn from(msg: crate::rpc::chord_proto::PartitionMsg) -> Self {
        Partition {
            values: serde_json::from_str(&msg.values_json).unwrap_or_default(),
            versions: serde_json::from_str(&msg.versions_json).unwrap_or_default(),
            tombstones: serde_json::from_str(&msg.tombstones_json).unwrap_or_default(),
        }
    }
}

impl From<crate::rpc::chord_proto::ResolveReply> for Partition {
    fn from(reply: crate::rpc::chord_proto::ResolveReply) -> Self {
        Partition {
            values: serde_json::from_str(&reply.stale_values_json).unwrap_or_default(),
            versions: serde_json::from_str(&reply.stale_versions_json).unwrap_or_default(),
            tombstones: serde_json::from_str(&reply.stale_tombstones_json).unwrap_or_default(),
        }
    }
}

impl From<Partition> for crate::rpc::chord_proto::ResolveReply {
    fn from(p: Partition) -> Self {
        crate::rpc::chord_proto::ResolveReply {
            stale_values_json: serde_json::to_string(&p.values).unwrap_or_default(),
            stale_versions_json: serde_json::to_string(&p.versions).unwrap_or_default(),
            stale_tombstones_json: serde_json::to_string(&p.tombstones).unwrap_or_default(),
        }
    }
}

impl ChordNode {
    /// Inbound `RETRIEVE_KEY`.
    pub fn get_local(&self, key: &str) -> LocalRecord {
        self.storage.get(key)
    }

    /// Inbound `STORE_KEY`: writes locally, then (if `replicate`) fans the
    /// write out to every node on the successor list.
    pub async fn put_local(&self, key: &str, value: Vec<u8>, version: i64, replicate: bool) -> bool {
        self.storage.put(key, value.clone(), version);

        let succ = self.successor();
        if replicate && succ.id != self.id() {
            self.replicate_set(key, &value, version).await;
        }
        true
    }

    /// Inbound `DELETE_KEY`: tombstones locally, then (if `replicate`) fans
    /// the removal out to every successor.
    pub async fn delete_local(&self, key: &str, version: i64, replicate: bool) -> bool {
        self.storage.tombstone(key, version);

        let succ = self.successor();
        if replicate && succ.id != self.id() {
            self.replicate_remove(key, version).await;
        }
        true
    }

    async fn replicate_set(&self, key: &str, value: &[u8], version: i64) {
        let successors = self.successors.lock().unwrap().to_vec();
        for (i, node) in successors.iter().enumerate() {
            if node.id == self.id() {
                continue;
            }
            match client::store_key(node, key, value.to_vec(), version, false, self.config.rpc_timeout).await {
                Ok(true) => {}
                Ok(false) => warn!("replicate_set: successor {} rejected key {}", i, key),
                Err(e) => error!("replicate_set: successor {} failed for key {}: {}", i, key, e),
            }
        }
    }

    async fn replicate_remove(&self, key: &str, version: i64) {
        let successors = self.successors.lock().unwrap().to_vec();
        for (i, node) in successors.iter().enumerate() {
            if node.id == self.id() {
                continue;
            }
            match client::delete_key(node, key, version, false, self.config.rpc_timeout).await {
                Ok(true) => {}
                Ok(false) => warn!("replicate_remove: successor {} rejected key {}", i, key),
                Err(e) => error!("replicate_remove: successor {} failed for key {}: {}", i, key, e),
            }
        }
    }

    /// Inbound `SET_PARTITION`: bulk-applies a pushed partition verbatim.
    pub fn set_partition(&self, partition: Partition) -> bool {
        let records = partition
            .values
            .into_iter()
            .filter_map(|(k, v)| {
                partition.versions.get(&k).map(|&version| {
                    (
                        k,
                        LocalRecord {
                            value: v,
                            version,
                            live: true,
                        },
                    )
                })
            })
            .collect();
        self.storage.set_all(records);
        self.storage.remove_all(partition.tombstones);
        true
    }

    /// Pushes the slice of our storage that belongs in `(predecessor,
    /// self]` to `node` wholesale (used after a successor-list change).
    pub async fn replicate_all_data(&self, node: &NodeRef) {
        let pred = self.predecessor();
        if pred.id == self.id() {
            return;
        }

        let live = self.storage.get_all_live();
        let tombstones = self.storage.get_all_tombstones();
        let (pred_id, self_id) = (pred.id, self.id());

        let values: HashMap<String, Vec<u8>> = live
            .par_iter()
            .filter(|(k, _)| Id::digest(k).is_between(&pred_id, &self_id))
            .map(|(k, r)| (k.clone(), r.value.clone()))
            .collect();
        let versions: HashMap<String, i64> = live
            .par_iter()
            .filter(|(k, _)| Id::digest(k).is_between(&pred_id, &self_id))
            .map(|(k, r)| (k.clone(), r.version))
            .collect();
        let tombstone_versions: HashMap<String, i64> = tombstones
            .par_iter()
            .filter(|(k, _)| Id::digest(k).is_between(&pred_id, &self_id))
            .map(|(k, r)| (k.clone(), r.version))
            .collect();

        let partition = Partition {
            values,
            versions,
            tombstones: tombstone_versions,
        };

        if !client::set_partition(node, partition.into(), self.config.rpc_timeout)
            .await
            .unwrap_or(false)
        {
            error!("replicate_all_data: {} rejected partition", node);
        }
    }

    /// Inbound `RESOLVE_DATA`: for every entry in the incoming partition,
    /// keep whichever version (ours or theirs) is newer, apply the winner
    /// locally, and tell the caller which of *their* entries were stale so
    /// they can adopt our newer copy.
    pub fn resolve_data(&self, partition: Partition) -> Partition {
        let mut accepted = HashMap::new();
        let mut stale_values = HashMap::new();
        let mut stale_versions = HashMap::new();
        let mut stale_tombstones = HashMap::new();

        for (key, value) in partition.values {
            let incoming_version = *partition.versions.get(&key).unwrap_or(&0);
            let local = self.storage.get(&key);
            if local.version > incoming_version {
                stale_values.insert(key.clone(), local.value.clone());
                stale_versions.insert(key, local.version);
            } else {
                accepted.insert(
                    key,
                    LocalRecord {
                        value,
                        version: incoming_version,
                        live: true,
                    },
                );
            }
        }

        for (key, version) in &partition.tombstones {
            let local = self.storage.get(key);
            if local.version > *version {
                stale_values.insert(key.clone(), local.value.clone());
                stale_versions.insert(key.clone(), local.version);
            } else {
                self.storage.tombstone(key, *version);
            }
        }

        for key in self.storage.get_all_tombstones().keys() {
            if let Some(&incoming_version) = partition.versions.get(key) {
                let local = self.storage.get(key);
                if local.version > incoming_version {
                    stale_tombstones.insert(key.clone(), local.version);
                }
            }
        }

        self.storage.set_all(accepted);

        Partition {
            values: stale_values,
            versions: stale_versions,
            tombstones: stale_tombstones,
        }
    }

    /// Called right after `notify` installs a genuinely new predecessor:
    /// hands off the slice of storage that now belongs to the gap between
    /// the new predecessor and whatever predecessor it is replacing.
    pub async fn handle_new_predecessor(&self) {
        let (pred, pred_pred) = {
            let predecessors = self.predecessors.lock().unwrap();
            let pred = predecessors.get(0);
            let pred_pred = if predecessors.len() > 1 {
                predecessors.get(1)
            } else {
                self.self_ref.clone()
            };
            (pred, pred_pred)
        };

        if pred.id == pred_pred.id {
            return;
        }

        info!("handle_new_predecessor: delegating data to {}", pred);

        let live = self.storage.get_all_live();
        let tombstones = self.storage.get_all_tombstones();

        let values: HashMap<String, Vec<u8>> = live
            .iter()
            .filter(|(k, _)| Id::digest(k).is_between(&pred_pred.id, &pred.id))
            .map(|(k, r)| (k.clone(), r.value.clone()))
            .collect();
        let versions: HashMap<String, i64> = live
            .iter()
            .filter(|(k, _)| Id::digest(k).is_between(&pred_pred.id, &pred.id))
            .map(|(k, r)| (k.clone(), r.version))
            .collect();
        let tombstone_versions: HashMap<String, i64> = tombstones
            .iter()
            .filter(|(k, _)| Id::digest(k).is_between(&pred_pred.id, &pred.id))
            .map(|(k, r)| (k.clone(), r.version))
            .collect();

        let outgoing = Partition {
            values,
            versions,
            tombstones: tombstone_versions,
        };

        match client::resolve_data(&pred, outgoing.into(), self.config.rpc_timeout).await {
            Ok(reply) => {
                let stale: Partition = reply.into();
                let mut records = HashMap::new();
                for (key, value) in stale.values {
                    let version = *stale.versions.get(&key).unwrap_or(&0);
                    records.insert(key, LocalRecord { value, version, live: true });
                }
                self.storage.set_all(records);
                self.storage.remove_all(stale.tombstones);
            }
            Err(e) => error!("handle_new_predecessor: resolve_data({}) failed: {}", pred, e),
        }
    }

    /// Periodic garbage collection: trims the predecessor list down to the
    /// successor list's length, then drops local keys that fall outside
    /// `(predecessor-of-predecessor, self]`.
    ///
    /// Uses the *current* timer value as the tombstone version for GC'd
    /// keys rather than the key's own last-write version. If a write for
    /// one of those keys is still in flight with a version higher than the
    /// current timer, this tombstone can be overwritten by a racing
    /// `replicate_set` and the deleted value silently reappears.
    pub async fn fix_storage_once(&self) {
        {
            let mut predecessors = self.predecessors.lock().unwrap();
            let succ_len = self.successors.lock().unwrap().len();
            while predecessors.len() > succ_len {
                let last = predecessors.len() - 1;
                predecessors.erase(last);
                if predecessors.is_empty() {
                    predecessors.set(0, self.self_ref.clone());
                    break;
                }
            }
        }

        let pred = {
            let predecessors = self.predecessors.lock().unwrap();
            predecessors.get(predecessors.len().saturating_sub(1))
        };

        if pred.id == self.id() {
            return;
        }

        let pred_pred = match client::get_predecessor(&pred, self.config.rpc_timeout).await {
            Ok(p) => p,
            Err(e) => {
                warn!("fix_storage: get_predecessor({}) failed: {}", pred, e);
                return;
            }
        };

        if pred_pred.id == self.id() || pred_pred.id == pred.id {
            return;
        }

        let time_c = self.timer.now();
        let keys = self.storage.all_keys();
        let (pred_pred_id, self_id) = (pred_pred.id, self.id());
        let stale: Vec<String> = keys
            .into_par_iter()
            .filter(|k| !Id::digest(k).is_between(&pred_pred_id, &self_id))
            .collect();

        for key in stale {
            self.storage.tombstone(&key, time_c);
        }
    }

    pub async fn fix_storage_loop(self: Arc<Self>) {
        info!("fix_storage loop started");
        let mut shutdown = self.shutdown_signal();
        loop {
            self.fix_storage_once().await;
            if sleep_or_shutdown(FIX_STORAGE_PERIOD, &mut shutdown).await {
                break;
            }
        }
    }
}
