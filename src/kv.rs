//! KV facade: the three public operations the rest of the system (and the
//! demo web UI) see — route to the key's owner via `find_successor`, then
//! call the owner's storage RPC directly (spec.md §4.6/§6, C12). Grounded
//! on `Node.get_key`/`set_key`/`remove_key` in `server/chord/node.py`.

use log::info;

use crate::core::ChordNode;
use crate::id::Id;
use crate::rpc::client;

impl ChordNode {
    pub async fn get_key(&self, key: &str) -> Vec<u8> {
        let owner = self.find_successor(&Id::digest(key)).await;

        if owner.id == self.id() {
            return self.get_local(key).value;
        }

        match client::retrieve_key(&owner, key, self.config.rpc_timeout).await {
            Ok(reply) if reply.live => {
                info!("get_key: {} served by {}", key, owner);
                reply.value
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                log::warn!("get_key: retrieve_key({}) from {} failed: {}", key, owner, e);
                Vec::new()
            }
        }
    }

    pub async fn set_key(&self, key: &str, value: Vec<u8>) -> bool {
        let owner = self.find_successor(&Id::digest(key)).await;
        let version = self.timer.now();

        let ok = if owner.id == self.id() {
            self.put_local(key, value, version, true).await
        } else {
            client::store_key(&owner, key, value, version, true, self.config.rpc_timeout)
                .await
                .unwrap_or(false)
        };

        if ok {
            info!("set_key: {} stored at {}", key, owner);
        }
        ok
    }

    pub async fn remove_key(&self, key: &str) -> bool {
        let owner = self.find_successor(&Id::digest(key)).await;
        let version = self.timer.now();

        let ok = if owner.id == self.id() {
            self.delete_local(key, version, true).await
        } else {
            client::delete_key(&owner, key, version, true, self.config.rpc_timeout)
                .await
                .unwrap_or(false)
        };

        if ok {
            info!("remove_key: {} removed from {}", key, owner);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    #[tokio::test]
    async fn set_then_get_roundtrips_on_lone_node() {
        let node = ChordNode::new(NodeConfig::for_test("127.0.0.1".into(), 9400));
        // A lone node is its own successor for every key.
        node.set_successor(node.self_ref.clone());
        node.predecessors.lock().unwrap().set(0, node.self_ref.clone());

        assert!(node.set_key("hello", b"world".to_vec()).await);
        assert_eq!(node.get_key("hello").await, b"world");
    }

    #[tokio::test]
    async fn remove_key_tombstones_value() {
        let node = ChordNode::new(NodeConfig::for_test("127.0.0.1".into(), 9401));
        node.set_successor(node.self_ref.clone());
        node.predecessors.lock().unwrap().set(0, node.self_ref.clone());

        node.set_key("k", b"v".to_vec()).await;
        assert!(node.remove_key("k").await);
        assert!(node.get_key("k").await.is_empty());
    }
}
