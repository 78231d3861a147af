//! Standalone diagnostic: connects to every node in a running ring and
//! checks the structural invariants from spec.md §8 (P1 routing closure,
//! P5 leader uniqueness, P7 no self-finger steady state). Grounded on the
//! teacher's `src/bin/validate_cluster.rs`.

use std::env;
use std::time::Duration;

use ringtalk::node::NodeRef;
use ringtalk::rpc::client;

struct Summary {
    node: NodeRef,
    predecessor: NodeRef,
    successors: Vec<NodeRef>,
    fingers: Vec<NodeRef>,
    leader: NodeRef,
}

fn parse_node(url: &str) -> NodeRef {
    let address_port = url.trim_start_matches("http://");
    let (address, port) = address_port.rsplit_once(':').expect("url must be host:port");
    NodeRef::new(address.to_string(), port.parse().expect("invalid port"))
}

#[tokio::main]
async fn main() {
    simple_logger::init_with_level(log::Level::Info).ok();

    let urls: Vec<String> = env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: validate_ring <node-url> [<node-url> ...]");
        std::process::exit(2);
    }

    let mut summaries = Vec::new();
    for url in &urls {
        let node = parse_node(url);
        let reply = client::get_node_summary(&node, Duration::from_secs(3))
            .await
            .unwrap_or_else(|e| panic!("failed to reach {}: {}", url, e));

        summaries.push(Summary {
            node: reply.local.expect("missing local node").into(),
            predecessor: reply.predecessor.expect("missing predecessor").into(),
            successors: reply
                .successors
                .map(|l| l.nodes.into_iter().map(Into::into).collect())
                .unwrap_or_default(),
            fingers: reply.fingers.into_iter().map(Into::into).collect(),
            leader: reply.leader.expect("missing leader").into(),
        });
    }

    summaries.sort_by_key(|s| s.node.id);
    let n = summaries.len();
    let mut ok = true;

    // P1 (routing closure, restated structurally): each node's recorded
    // predecessor must be its counter-clockwise ring neighbor.
    for i in 0..n {
        let expected_pred = &summaries[(i + n - 1) % n].node;
        if summaries[i].predecessor.id != expected_pred.id {
            ok = false;
            eprintln!(
                "P1 violated: node {} has predecessor {}, expected {}",
                summaries[i].node, summaries[i].predecessor, expected_pred
            );
        }
    }

    // successor-list shape: successor[j] should be the (j+1)-th ring
    // neighbor clockwise.
    for i in 0..n {
        for (j, succ) in summaries[i].successors.iter().enumerate() {
            let expected = &summaries[(i + j + 1) % n].node;
            if succ.id != expected.id {
                ok = false;
                eprintln!(
                    "successor list mismatch: node {} successor[{}] = {}, expected {}",
                    summaries[i].node, j, succ, expected
                );
            }
        }
    }

    // P5: exactly one distinct leader id across the ring.
    let distinct_leaders: std::collections::HashSet<_> = summaries.iter().map(|s| s.leader.id).collect();
    if distinct_leaders.len() != 1 {
        ok = false;
        eprintln!("P5 violated: ring reports {} distinct leaders", distinct_leaders.len());
    }

    // P7: a self-pointing finger is only valid if the slot it covers falls
    // inside this node's own range, (predecessor, self].
    if n >= 2 {
        for summary in &summaries {
            for (i, finger) in summary.fingers.iter().enumerate() {
                if finger.id != summary.node.id {
                    continue;
                }
                let target = summary.node.id.add_pow2(i);
                if !target.is_between(&summary.predecessor.id, &summary.node.id) {
                    ok = false;
                    eprintln!(
                        "P7 violated: node {} finger[{}] self-points but target {} is outside its range",
                        summary.node, i, target
                    );
                }
            }
        }
    }

    if ok {
        println!("ring of {} nodes looks consistent", n);
    } else {
        eprintln!("ring validation failed");
        std::process::exit(1);
    }
}
