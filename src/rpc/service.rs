//! Inbound peer RPC endpoint: the tonic `Chord` service implementation
//! that dispatches each opcode straight onto a `ChordNode` method
//! (spec.md §4.6, C11).

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::core::ChordNode;
use crate::id::Id;
use crate::node::NodeRef;
use crate::replicator::Partition;
use crate::rpc::chord_proto as pb;
use crate::rpc::chord_proto::chord_server::Chord;

pub struct ChordRpc {
    pub node: Arc<ChordNode>,
}

impl ChordRpc {
    pub fn new(node: Arc<ChordNode>) -> Self {
        ChordRpc { node }
    }
}

fn id_from_request(bytes: &[u8]) -> Id {
    Id::from_slice(bytes)
}

#[tonic::async_trait]
impl Chord for ChordRpc {
    async fn find_predecessor(&self, request: Request<pb::IdRequest>) -> Result<Response<pb::NodeReply>, Status> {
        let id = id_from_request(&request.into_inner().id);
        let pred = self.node.find_predecessor(&id).await;
        Ok(Response::new((&pred).into()))
    }

    async fn find_successor(&self, request: Request<pb::IdRequest>) -> Result<Response<pb::NodeReply>, Status> {
        let id = id_from_request(&request.into_inner().id);
        let succ = self.node.find_successor(&id).await;
        Ok(Response::new((&succ).into()))
    }

    async fn get_predecessor(&self, _request: Request<pb::Empty>) -> Result<Response<pb::NodeReply>, Status> {
        Ok(Response::new((&self.node.predecessor()).into()))
    }

    async fn get_successor(&self, _request: Request<pb::Empty>) -> Result<Response<pb::NodeReply>, Status> {
        Ok(Response::new((&self.node.successor()).into()))
    }

    async fn closest_preceding_finger(
        &self,
        request: Request<pb::IdRequest>,
    ) -> Result<Response<pb::NodeReply>, Status> {
        let id = id_from_request(&request.into_inner().id);
        let node = self.node.closest_preceding_finger_local(&id);
        Ok(Response::new((&node).into()))
    }

    async fn notify(&self, request: Request<pb::NotifyRequest>) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        let from = NodeRef::new(req.address, req.port as u16);
        self.node.notify(from).await;
        Ok(Response::new(pb::Empty {}))
    }

    async fn get_successor_and_notify(
        &self,
        request: Request<pb::GetSuccessorAndNotifyRequest>,
    ) -> Result<Response<pb::NodeReply>, Status> {
        let req = request.into_inner();
        let from = NodeRef::new(req.address, req.port as u16);
        let succ = self.node.get_successor_and_notify(req.index as usize, from);
        Ok(Response::new((&succ).into()))
    }

    async fn ping(&self, _request: Request<pb::Empty>) -> Result<Response<pb::PingReply>, Status> {
        Ok(Response::new(pb::PingReply { alive: true }))
    }

    async fn ping_leader(&self, request: Request<pb::PingLeaderRequest>) -> Result<Response<pb::TimeReply>, Status> {
        let req = request.into_inner();
        let sender_id = id_from_request(&req.sender_id);
        let time = self.node.ping_leader(sender_id, req.sender_time);
        Ok(Response::new(pb::TimeReply { time }))
    }

    async fn election(&self, request: Request<pb::ElectionRequest>) -> Result<Response<pb::NodeReply>, Status> {
        let req = request.into_inner();
        let first_id = id_from_request(&req.first_id);
        let candidate = NodeRef::new(req.candidate_address, req.candidate_port as u16);
        match self.node.election(first_id, candidate).await {
            Some(leader) => Ok(Response::new((&leader).into())),
            None => Err(Status::unavailable("election could not be completed")),
        }
    }

    async fn set_partition(&self, request: Request<pb::PartitionMsg>) -> Result<Response<pb::BoolReply>, Status> {
        let partition: Partition = request.into_inner().into();
        let ok = self.node.set_partition(partition);
        Ok(Response::new(pb::BoolReply { ok }))
    }

    async fn resolve_data(&self, request: Request<pb::PartitionMsg>) -> Result<Response<pb::ResolveReply>, Status> {
        let partition: Partition = request.into_inner().into();
        let stale = self.node.resolve_data(partition);
        Ok(Response::new(stale.into()))
    }

    async fn retrieve_key(&self, request: Request<pb::KeyRequest>) -> Result<Response<pb::RecordReply>, Status> {
        let record = self.node.get_local(&request.into_inner().key);
        Ok(Response::new(pb::RecordReply {
            value: record.value,
            version: record.version,
            live: record.live,
        }))
    }

    async fn store_key(&self, request: Request<pb::StoreKeyRequest>) -> Result<Response<pb::BoolReply>, Status> {
        let req = request.into_inner();
        let ok = self
            .node
            .put_local(&req.key, req.value, req.version, req.replicate)
            .await;
        Ok(Response::new(pb::BoolReply { ok }))
    }

    async fn delete_key(&self, request: Request<pb::DeleteKeyRequest>) -> Result<Response<pb::BoolReply>, Status> {
        let req = request.into_inner();
        let ok = self.node.delete_local(&req.key, req.version, req.replicate).await;
        Ok(Response::new(pb::BoolReply { ok }))
    }

    async fn get_successor_list(
        &self,
        _request: Request<pb::Empty>,
    ) -> Result<Response<pb::NodeListReply>, Status> {
        let nodes = self
            .node
            .successors
            .lock()
            .unwrap()
            .to_vec()
            .iter()
            .map(Into::into)
            .collect();
        Ok(Response::new(pb::NodeListReply { nodes }))
    }

    async fn get_node_summary(
        &self,
        _request: Request<pb::Empty>,
    ) -> Result<Response<pb::NodeSummaryReply>, Status> {
        let fingers = (0..crate::id::M)
            .map(|i| (&self.node.finger_table.lock().unwrap().get(i).node).into())
            .collect();
        let successors = self
            .node
            .successors
            .lock()
            .unwrap()
            .to_vec()
            .iter()
            .map(Into::into)
            .collect();

        Ok(Response::new(pb::NodeSummaryReply {
            local: Some((&self.node.self_ref).into()),
            predecessor: Some((&self.node.predecessor()).into()),
            successors: Some(pb::NodeListReply { nodes: successors }),
            fingers,
            leader: Some((&self.node.leader.lock().unwrap().clone()).into()),
        }))
    }
}
