//! Outbound peer RPC calls. Every function here is a single connect + one
//! call + disconnect, matching spec.md §4.6's "accept one request, write
//! one response, close" framing and the teacher's `connect_with_retry`
//! helpers. Every call is bounded by the configured RPC timeout
//! (spec.md §4.6: "Per-RPC timeout ≈ 3 s").

use std::time::Duration;

use log::warn;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::id::Id;
use crate::node::NodeRef;
use crate::rpc::chord_proto as pb;
use crate::rpc::chord_proto::chord_client::ChordClient;

pub async fn connect(node: &NodeRef, timeout: Duration) -> Result<ChordClient<Channel>, Status> {
    let endpoint = tonic::transport::Endpoint::from_shared(node.url())
        .map_err(|e| Status::internal(e.to_string()))?
        .timeout(timeout)
        .connect_timeout(timeout);
    match endpoint.connect().await {
        Ok(channel) => Ok(ChordClient::new(channel)),
        Err(e) => {
            warn!("failed to connect to {}: {}", node, e);
            Err(Status::unavailable(e.to_string()))
        }
    }
}

pub async fn find_predecessor(node: &NodeRef, id: &Id, timeout: Duration) -> Result<NodeRef, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .find_predecessor(Request::new(pb::IdRequest { id: id.to_vec() }))
        .await?;
    Ok(reply.into_inner().into())
}

pub async fn find_successor(node: &NodeRef, id: &Id, timeout: Duration) -> Result<NodeRef, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .find_successor(Request::new(pb::IdRequest { id: id.to_vec() }))
        .await?;
    Ok(reply.into_inner().into())
}

pub async fn get_predecessor(node: &NodeRef, timeout: Duration) -> Result<NodeRef, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client.get_predecessor(Request::new(pb::Empty {})).await?;
    Ok(reply.into_inner().into())
}

pub async fn get_successor(node: &NodeRef, timeout: Duration) -> Result<NodeRef, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client.get_successor(Request::new(pb::Empty {})).await?;
    Ok(reply.into_inner().into())
}

pub async fn closest_preceding_finger(node: &NodeRef, id: &Id, timeout: Duration) -> Result<NodeRef, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .closest_preceding_finger(Request::new(pb::IdRequest { id: id.to_vec() }))
        .await?;
    Ok(reply.into_inner().into())
}

pub async fn notify(node: &NodeRef, from: &NodeRef, timeout: Duration) -> Result<(), Status> {
    let mut client = connect(node, timeout).await?;
    client
        .notify(Request::new(pb::NotifyRequest {
            address: from.address.clone(),
            port: from.port as u32,
        }))
        .await?;
    Ok(())
}

pub async fn get_successor_and_notify(
    node: &NodeRef,
    index: u32,
    from: &NodeRef,
    timeout: Duration,
) -> Result<NodeRef, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .get_successor_and_notify(Request::new(pb::GetSuccessorAndNotifyRequest {
            index,
            address: from.address.clone(),
            port: from.port as u32,
        }))
        .await?;
    Ok(reply.into_inner().into())
}

pub async fn ping(node: &NodeRef, timeout: Duration) -> bool {
    match connect(node, timeout).await {
        Ok(mut client) => client
            .ping(Request::new(pb::Empty {}))
            .await
            .map(|r| r.into_inner().alive)
            .unwrap_or(false),
        Err(_) => false,
    }
}

pub async fn ping_leader(node: &NodeRef, sender_id: &Id, sender_time: i64, timeout: Duration) -> Result<i64, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .ping_leader(Request::new(pb::PingLeaderRequest {
            sender_id: sender_id.to_vec(),
            sender_time,
        }))
        .await?;
    Ok(reply.into_inner().time)
}

pub async fn election(
    node: &NodeRef,
    first_id: &Id,
    candidate: &NodeRef,
    timeout: Duration,
) -> Result<NodeRef, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .election(Request::new(pb::ElectionRequest {
            first_id: first_id.to_vec(),
            candidate_address: candidate.address.clone(),
            candidate_port: candidate.port as u32,
        }))
        .await?;
    Ok(reply.into_inner().into())
}

pub async fn set_partition(node: &NodeRef, msg: pb::PartitionMsg, timeout: Duration) -> Result<bool, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client.set_partition(Request::new(msg)).await?;
    Ok(reply.into_inner().ok)
}

pub async fn resolve_data(
    node: &NodeRef,
    msg: pb::PartitionMsg,
    timeout: Duration,
) -> Result<pb::ResolveReply, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client.resolve_data(Request::new(msg)).await?;
    Ok(reply.into_inner())
}

pub async fn retrieve_key(node: &NodeRef, key: &str, timeout: Duration) -> Result<pb::RecordReply, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .retrieve_key(Request::new(pb::KeyRequest { key: key.to_string() }))
        .await?;
    Ok(reply.into_inner())
}

pub async fn store_key(
    node: &NodeRef,
    key: &str,
    value: Vec<u8>,
    version: i64,
    replicate: bool,
    timeout: Duration,
) -> Result<bool, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .store_key(Request::new(pb::StoreKeyRequest {
            key: key.to_string(),
            value,
            version,
            replicate,
        }))
        .await?;
    Ok(reply.into_inner().ok)
}

pub async fn delete_key(
    node: &NodeRef,
    key: &str,
    version: i64,
    replicate: bool,
    timeout: Duration,
) -> Result<bool, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client
        .delete_key(Request::new(pb::DeleteKeyRequest {
            key: key.to_string(),
            version,
            replicate,
        }))
        .await?;
    Ok(reply.into_inner().ok)
}

pub async fn get_successor_list(node: &NodeRef, timeout: Duration) -> Result<Vec<NodeRef>, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client.get_successor_list(Request::new(pb::Empty {})).await?;
    Ok(reply.into_inner().nodes.into_iter().map(Into::into).collect())
}

pub async fn get_node_summary(node: &NodeRef, timeout: Duration) -> Result<pb::NodeSummaryReply, Status> {
    let mut client = connect(node, timeout).await?;
    let reply = client.get_node_summary(Request::new(pb::Empty {})).await?;
    Ok(reply.into_inner())
}
