//! Lifecycle supervisor: builds the node, joins or creates a ring, starts
//! the gRPC server and every periodic maintenance loop with the startup
//! ordering `Node.__init__` uses, and owns graceful shutdown (spec.md §5,
//! §9, C13).

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tonic::transport::Server;

use crate::config::NodeConfig;
use crate::core::ChordNode;
use crate::rpc::chord_proto::chord_server::ChordServer;
use crate::rpc::chord_proto::FILE_DESCRIPTOR_SET;
use crate::rpc::ChordRpc;

/// Mirrors `Node.__init__`'s `time.sleep(6)` between joining the ring and
/// starting the maintenance threads, giving the join RPCs a moment to
/// settle before stabilization starts probing.
const POST_JOIN_SETTLE: Duration = Duration::from_secs(6);

/// Mirrors the second `time.sleep(10)` before `discover_and_join` starts,
/// so the freshly-joined node isn't immediately flagged as isolated.
const DISCOVERY_WARMUP: Duration = Duration::from_secs(10);

pub async fn run(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let node = Arc::new(ChordNode::new(config));
    let addr = format!("0.0.0.0:{}", node.config.port).parse()?;

    node.create_ring_or_join().await;
    info!(
        "node {} ready: successor {}, predecessor {}, leader {}",
        node.id(),
        node.successor(),
        node.predecessor(),
        node.leader.lock().unwrap()
    );

    let rpc = ChordRpc::new(Arc::clone(&node));
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build()?;

    let server_node = Arc::clone(&node);
    let server_handle = tokio::spawn(async move {
        let mut shutdown = server_node.shutdown_signal();
        Server::builder()
            .add_service(ChordServer::new(rpc))
            .add_service(reflection)
            .serve_with_shutdown(addr, async move {
                let _ = shutdown.changed().await;
            })
            .await
    });

    tokio::spawn(Arc::clone(&node).listen_for_announcements());

    tokio::time::sleep(POST_JOIN_SETTLE).await;

    tokio::spawn(Arc::clone(&node).fix_fingers_loop());
    tokio::spawn(Arc::clone(&node).stabilize_loop());
    tokio::spawn(Arc::clone(&node).check_predecessor_loop());
    tokio::spawn(Arc::clone(&node).check_successor_loop());
    tokio::spawn(Arc::clone(&node).fix_successors_loop());
    tokio::spawn(Arc::clone(&node).timer_tick_loop());
    tokio::spawn(Arc::clone(&node).check_leader_loop());
    tokio::spawn(Arc::clone(&node).check_for_election_loop());
    tokio::spawn(Arc::clone(&node).fix_storage_loop());

    if node.config.http_port != 0 {
        let web_node = Arc::clone(&node);
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build web UI runtime");
            let local = tokio::task::LocalSet::new();
            local.block_on(&rt, async move {
                if let Err(e) = crate::web::serve(web_node).await {
                    log::error!("web UI server exited: {}", e);
                }
            });
        });
    }

    tokio::time::sleep(DISCOVERY_WARMUP).await;
    tokio::spawn(Arc::clone(&node).discover_and_join_loop());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    node.shut_down();
    let _ = server_handle.await?;
    Ok(())
}
