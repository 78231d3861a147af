//! Elector: highest-id-wins leader election over the ring, plus the
//! Berkeley clock sync piggybacked on leader pings (spec.md §4.5, C7).
//! Grounded on `server/chord/elector.py`.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::core::{sleep_or_shutdown, ChordNode};
use crate::id::Id;
use crate::node::NodeRef;
use crate::rpc::client;

pub const CHECK_LEADER_PERIOD: Duration = Duration::from_secs(3);
pub const CHECK_FOR_ELECTION_PERIOD: Duration = Duration::from_secs(5);

impl ChordNode {
    /// Inbound `PING_LEADER`: a follower reports its clock; we fold it into
    /// the Berkeley average and return the synchronized value.
    pub fn ping_leader(&self, sender_id: Id, sender_time: i64) -> i64 {
        self.timer.observe_and_average(sender_id, sender_time)
    }

    /// Periodically pings the current leader; a failed ping triggers an
    /// election.
    pub async fn check_leader_once(&self) {
        let leader = self.leader.lock().unwrap().clone();
        if leader.id == self.id() {
            return;
        }

        let current_time = self.timer.now();
        match client::ping_leader(&leader, &self.id(), current_time, self.config.rpc_timeout).await {
            Ok(new_time) => self.timer.adopt(new_time),
            Err(e) => {
                error!("check_leader: leader {} unreachable: {}", leader, e);
                self.call_for_election().await;
            }
        }
    }

    pub async fn check_leader_loop(self: Arc<Self>) {
        info!("check_leader loop started");
        let mut shutdown = self.shutdown_signal();
        loop {
            self.check_leader_once().await;
            if sleep_or_shutdown(CHECK_LEADER_PERIOD, &mut shutdown).await {
                break;
            }
        }
    }

    /// Kicks off an election by forwarding to the successor. Becomes
    /// leader immediately if alone or if the successor doesn't answer.
    pub async fn call_for_election(&self) {
        let succ = self.successor();
        if succ.id == self.id() {
            *self.leader.lock().unwrap() = self.self_ref.clone();
            info!("election: {} is now leader (alone)", self.id());
            return;
        }

        info!("election: starting, forwarding to successor {}", succ);
        if !client::ping(&succ, self.config.rpc_timeout).await {
            *self.leader.lock().unwrap() = self.self_ref.clone();
            error!("election: successor {} unreachable, becoming leader", succ);
            return;
        }

        match client::election(&succ, &self.id(), &self.self_ref, self.config.rpc_timeout).await {
            Ok(new_leader) => {
                info!("election: new leader elected: {}", new_leader);
                *self.leader.lock().unwrap() = new_leader;
            }
            Err(e) => {
                *self.leader.lock().unwrap() = self.self_ref.clone();
                error!("election: forwarding failed ({}), becoming leader", e);
            }
        }
    }

    /// Inbound `ELECTION`: ring-traversal highest-id-wins. Terminates when
    /// the ring has been fully traversed (successor is self, or the
    /// traversal has come back around to the node that started it).
    pub async fn election(&self, first_id: Id, candidate: NodeRef) -> Option<NodeRef> {
        let mut leading = if self.id() > candidate.id {
            self.self_ref.clone()
        } else {
            candidate
        };

        let succ = self.successor();
        if succ.id == self.id() || succ.id == first_id {
            *self.leader.lock().unwrap() = leading.clone();
            info!("election: elected {}", leading);
            return Some(leading);
        }

        if !client::ping(&succ, self.config.rpc_timeout).await {
            info!("election: successor unreachable, election failed");
            return None;
        }

        match client::election(&succ, &first_id, &leading, self.config.rpc_timeout).await {
            Ok(elected) => {
                leading = elected;
                *self.leader.lock().unwrap() = leading.clone();
                info!("election: elected {}", leading);
                Some(leading)
            }
            Err(e) => {
                info!("election: forwarding failed: {}", e);
                None
            }
        }
    }

    /// Periodically re-triggers an election if we believe ourselves to be
    /// the leader, defending against a stale self-view after a partition.
    pub async fn check_for_election_once(&self) {
        let leader_id = self.leader.lock().unwrap().id;
        if leader_id == self.id() {
            self.call_for_election().await;
        }
    }

    pub async fn check_for_election_loop(self: Arc<Self>) {
        info!("check_for_election loop started");
        let mut shutdown = self.shutdown_signal();
        loop {
            self.check_for_election_once().await;
            if sleep_or_shutdown(CHECK_FOR_ELECTION_PERIOD, &mut shutdown).await {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    #[tokio::test]
    async fn election_elects_self_when_alone() {
        let node = ChordNode::new(NodeConfig::for_test("127.0.0.1".into(), 9300));
        let lower = NodeRef::new("127.0.0.1", 9301);
        let result = node.election(node.id(), lower).await;
        assert_eq!(result.unwrap().id, node.id());
    }

    #[test]
    fn ping_leader_updates_timer() {
        let node = ChordNode::new(NodeConfig::for_test("127.0.0.1".into(), 9302));
        let before = node.timer.now();
        let avg = node.ping_leader(Id::from_slice(&[9]), before + 100);
        assert!(avg >= before);
    }
}
