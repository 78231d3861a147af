//! Discoverer: IP multicast ring discovery and the join/create-ring startup
//! sequence (spec.md §4.3, C6). Grounded on `server/chord/discoverer.py`.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout as tokio_timeout;

use crate::core::{sleep_or_shutdown, ChordNode};
use crate::node::NodeRef;
use crate::rpc::client;

const ARE_YOU: &str = "ARE_YOU";
const YES_IM: &str = "YES_IM";
const SEPARATOR: char = '|';
const PROBE_ATTEMPTS: u32 = 5;
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DISCOVER_AND_JOIN_PERIOD: Duration = Duration::from_secs(60);

/// Result of one `send_announcement` probe: the responder's address and
/// the leader address it reported.
struct Announcement {
    responder: String,
    leader_address: String,
}

impl ChordNode {
    fn multicast_addr(&self) -> String {
        format!("{}:{}", self.config.multicast_group, self.config.multicast_port)
    }

    /// Binds a socket to the multicast port and joins the configured group
    /// with loopback disabled, per spec §4.3. `SO_REUSEADDR` lets this live
    /// alongside `listen_for_announcements`'s own socket on the same port.
    async fn bind_multicast_member_socket(&self) -> std::io::Result<UdpSocket> {
        let group: Ipv4Addr = self
            .config
            .multicast_group
            .parse()
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_multicast_ttl_v4(1)?;
        socket.set_multicast_loop_v4(false)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.multicast_port).into())?;
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }

    /// Sends one `ARE_YOU|id` probe and waits up to `PROBE_ATTEMPTS *
    /// PROBE_TIMEOUT` for a `YES_IM|leader_address` reply.
    async fn send_announcement(&self) -> Option<Announcement> {
        let socket = match self.bind_multicast_member_socket().await {
            Ok(s) => s,
            Err(e) => {
                error!("discoverer: failed to open multicast socket: {}", e);
                return None;
            }
        };

        let message = format!("{}{}{}", ARE_YOU, SEPARATOR, self.id());
        if let Err(e) = socket.send_to(message.as_bytes(), self.multicast_addr()).await {
            error!("discoverer: failed to send announcement: {}", e);
            return None;
        }

        let mut buf = [0u8; 1024];
        for _ in 0..PROBE_ATTEMPTS {
            match tokio_timeout(PROBE_TIMEOUT, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, from))) => {
                    let text = String::from_utf8_lossy(&buf[..n]);
                    let parts: Vec<&str> = text.split(SEPARATOR).collect();
                    if parts.len() == 2 && parts[0] == YES_IM {
                        info!("discoverer: ring discovered via {}, leader at {}", from, parts[1]);
                        return Some(Announcement {
                            responder: from.ip().to_string(),
                            leader_address: parts[1].to_string(),
                        });
                    }
                }
                Ok(Err(e)) => {
                    error!("discoverer: recv error: {}", e);
                    return None;
                }
                Err(_) => continue,
            }
        }
        info!("discoverer: no chord ring discovered");
        None
    }

    /// Daemon loop: replies `YES_IM|<leader-address>` to `ARE_YOU` probes,
    /// but only while this node is the ring's leader.
    pub async fn listen_for_announcements(self: Arc<Self>) {
        let socket = match self.bind_listener_socket().await {
            Ok(s) => s,
            Err(e) => {
                error!("discoverer: failed to set up multicast listener: {}", e);
                return;
            }
        };

        let mut buf = [0u8; 1024];
        let mut shutdown = self.shutdown_signal();
        loop {
            tokio::select! {
                res = socket.recv_from(&mut buf) => {
                    match res {
                        Ok((n, _from)) if n > 0 => self.handle_announcement(&buf[..n], &socket).await,
                        Ok(_) => continue,
                        Err(e) => {
                            error!("discoverer: listener read error: {}", e);
                            continue;
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn bind_listener_socket(&self) -> std::io::Result<UdpSocket> {
        let socket = self.bind_multicast_member_socket().await?;
        info!("discoverer: joined multicast group {}:{}", self.config.multicast_group, self.config.multicast_port);
        Ok(socket)
    }

    async fn handle_announcement(&self, datagram: &[u8], socket: &UdpSocket) {
        if !self.is_leader() {
            debug!("discoverer: not leader, ignoring announcement");
            return;
        }

        let text = String::from_utf8_lossy(datagram);
        let parts: Vec<&str> = text.split(SEPARATOR).collect();
        if parts.len() != 2 {
            return;
        }
        let (message, id_str) = (parts[0], parts[1]);
        if id_str == self.id().to_string() || message != ARE_YOU {
            return;
        }

        let leader = self.leader.lock().unwrap().clone();
        let response = format!("{}{}{}", YES_IM, SEPARATOR, leader.address);
        if let Err(e) = socket.send_to(response.as_bytes(), self.multicast_addr()).await {
            warn!("discoverer: failed to reply to announcement: {}", e);
        }
    }

    /// Joins an existing ring through `address`, adopting `leader_address`
    /// as the ring's current leader.
    async fn join_via(&self, address: &str, leader_address: &str) -> bool {
        let entry_point = NodeRef::new(address.to_string(), self.self_ref.port);
        let leader = NodeRef::new(leader_address.to_string(), self.self_ref.port);

        self.predecessors.lock().unwrap().set(0, self.self_ref.clone());
        self.successors.lock().unwrap().clear();

        let succ = if entry_point.id == self.id() {
            self.self_ref.clone()
        } else {
            match client::find_successor(&entry_point, &self.id(), self.config.rpc_timeout).await {
                Ok(s) => s,
                Err(e) => {
                    error!("discoverer: find_successor via {} failed: {}", entry_point, e);
                    return false;
                }
            }
        };

        self.successors.lock().unwrap().set(0, succ.clone());
        self.set_successor(succ.clone());
        *self.leader.lock().unwrap() = leader;

        if succ.id != self.id() {
            if let Err(e) = client::notify(&succ, &self.self_ref, self.config.rpc_timeout).await {
                warn!("discoverer: notify({}) after join failed: {}", succ, e);
            }
        }

        info!("discoverer: joined ring through {}", address);
        true
    }

    fn create_ring(&self) {
        info!("discoverer: creating a new chord ring");
        self.predecessors.lock().unwrap().set(0, self.self_ref.clone());
        self.successors.lock().unwrap().set(0, self.self_ref.clone());
        *self.leader.lock().unwrap() = self.self_ref.clone();
    }

    /// Startup entry point: try the `--peer` flag first, then multicast
    /// discovery, and fall back to starting a brand-new ring.
    pub async fn create_ring_or_join(&self) {
        if let Some(peer) = self.config.peer.clone() {
            if self.join_via(&peer, &peer).await {
                return;
            }
            warn!("discoverer: explicit peer {} unreachable, falling back to discovery", peer);
        }

        match self.send_announcement().await {
            Some(ann) => {
                if !self.join_via(&ann.responder, &ann.leader_address).await {
                    self.create_ring();
                }
            }
            None => self.create_ring(),
        }
    }

    /// Periodically checks whether this node is isolated or the leader
    /// of its own lone ring, and re-attempts discovery/merge into any
    /// ring whose leader outranks the current one.
    pub async fn discover_and_join_loop(self: Arc<Self>) {
        info!("discover_and_join loop started");
        let mut shutdown = self.shutdown_signal();
        loop {
            if sleep_or_shutdown(DISCOVER_AND_JOIN_PERIOD, &mut shutdown).await {
                break;
            }

            let leader_id = self.leader.lock().unwrap().id;
            if leader_id == self.id() || self.is_alone() {
                if let Some(ann) = self.send_announcement().await {
                    let candidate_leader = NodeRef::new(ann.leader_address.clone(), self.self_ref.port);
                    if candidate_leader.id > self.id() {
                        if !self.join_via(&ann.responder, &ann.leader_address).await {
                            error!("discoverer: failed joining {} during periodic discovery", ann.responder);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    #[test]
    fn create_ring_makes_node_its_own_leader_succ_pred() {
        let node = ChordNode::new(NodeConfig::for_test("127.0.0.1".into(), 9200));
        node.create_ring();
        assert!(node.is_leader());
        assert!(node.is_alone());
    }
}
