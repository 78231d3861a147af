use std::fmt;

use crate::id::Id;
use crate::rpc::chord_proto::NodeReply;

/// A value-type handle to a peer: `(id, address, port)` from spec.md §3.
/// Never dereferenced directly — every non-local operation on a `NodeRef`
/// goes through an RPC call (see `rpc::client`).
#[derive(Clone)]
pub struct NodeRef {
    pub id: Id,
    pub address: String,
    pub port: u16,
}

impl NodeRef {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        NodeRef {
            id: Id::digest(&format!("{}:{}", address, port)),
            address,
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("port", &self.port)
            .finish()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.address, self.port, self.id)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeRef {}

impl From<&NodeRef> for NodeReply {
    fn from(n: &NodeRef) -> Self {
        NodeReply {
            id: n.id.to_vec(),
            address: n.address.clone(),
            port: n.port as u32,
        }
    }
}

impl From<NodeRef> for NodeReply {
    fn from(n: NodeRef) -> Self {
        (&n).into()
    }
}

impl From<&NodeReply> for NodeRef {
    fn from(r: &NodeReply) -> Self {
        NodeRef {
            id: Id::from_slice(&r.id),
            address: r.address.clone(),
            port: r.port as u16,
        }
    }
}

impl From<NodeReply> for NodeRef {
    fn from(r: NodeReply) -> Self {
        (&r).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id_only() {
        let a = NodeRef::new("10.0.0.1", 9000);
        let b = NodeRef::new("10.0.0.1", 9000);
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrips_through_proto() {
        let n = NodeRef::new("10.0.0.2", 9001);
        let reply: NodeReply = (&n).into();
        let back: NodeRef = reply.into();
        assert_eq!(n, back);
        assert_eq!(back.address, "10.0.0.2");
        assert_eq!(back.port, 9001);
    }
}
