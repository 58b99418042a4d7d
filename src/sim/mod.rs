//! In-process network simulation: a set of nodes wired through an in-memory
//! transport that hands vertices straight to peer engines. Used by the demo
//! binary and by tests that need a real multi-node topology without sockets.

use crate::{
    consensus::{
        engine::{self, Avalanche},
        params::Params,
        vertex::{Payload, Vertex, VertexId},
    },
    node::{self, Node},
    p2p::{directory::PeerDirectory, gossip::Gossip, wire::VertexMessage},
    Dag,
};
use async_trait::async_trait;
use itertools::Itertools;
use serde_json::json;
use std::{
    collections::HashMap,
    result,
    sync::{Arc, RwLock, Weak},
    time::Duration,
};
use tracing::{debug, info};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] engine::Error),
    #[error(transparent)]
    Node(#[from] node::Error),
    #[error("node already exists in the simulation")]
    DuplicateNode,
}
type Result<T> = result::Result<T, Error>;

/// Shared registry resolving node ids to live nodes. Entries are weak so a
/// node disconnected from the simulation actually goes away.
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: RwLock<HashMap<String, Weak<Node>>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<MemoryNetwork> {
        Arc::new(MemoryNetwork::default())
    }

    /// Make a node reachable under its id
    pub fn register(&self, node: &Arc<Node>) {
        self.nodes
            .write()
            .expect("network lock poisoned")
            .insert(node.id().to_string(), Arc::downgrade(node));
    }

    fn get(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .expect("network lock poisoned")
            .get(id)
            .and_then(Weak::upgrade)
    }
}

/// Gossip transport that delivers directly into peer engines. In this
/// network a peer's id doubles as its address.
pub struct MemoryGossip {
    node_id: String,
    network: Arc<MemoryNetwork>,
    peers: PeerDirectory,
}

impl MemoryGossip {
    pub fn new(node_id: impl Into<String>, network: Arc<MemoryNetwork>) -> MemoryGossip {
        MemoryGossip {
            node_id: node_id.into(),
            network,
            peers: PeerDirectory::new(),
        }
    }
}

#[async_trait]
impl Gossip for MemoryGossip {
    async fn broadcast_vertex(&self, id: &VertexId, data: &Payload, parent_ids: &[VertexId]) {
        let msg = VertexMessage {
            id: id.clone(),
            data: data.clone(),
            parent_ids: parent_ids.to_vec(),
            sender_id: self.node_id.clone(),
        };
        for (peer_id, _) in self.peers.snapshot() {
            let Some(peer) = self.network.get(&peer_id) else {
                continue;
            };
            // Duplicates are the expected steady state under redundant gossip
            if let Err(e) = peer.receive_vertex(msg.clone(), None) {
                debug!("peer {peer_id} dropped vertex {id}: {e}");
            }
        }
    }

    fn get_peers(&self) -> Vec<String> {
        self.peers.get_peers()
    }

    async fn connect_to_peers(&self, addresses: &[String]) {
        for address in addresses {
            self.peers.add_peer(address, address);
        }
    }

    fn add_peer(&self, id: &str, address: &str) {
        self.peers.add_peer(id, address);
    }

    fn remove_peer(&self, id: &str) {
        self.peers.remove_peer(id);
    }
}

/// A set of in-process nodes sharing one [`MemoryNetwork`]
pub struct Simulator {
    params: Params,
    network: Arc<MemoryNetwork>,
    nodes: HashMap<String, Arc<Node>>,
}

impl Simulator {
    pub fn new(params: Params) -> Simulator {
        Simulator {
            params,
            network: MemoryNetwork::new(),
            nodes: HashMap::new(),
        }
    }

    /// Create a node and register it on the network
    pub fn add_node(&mut self, id: &str) -> Result<Arc<Node>> {
        if self.nodes.contains_key(id) {
            return Err(Error::DuplicateNode);
        }
        let engine = Arc::new(Avalanche::new(Arc::new(Dag::new()), self.params.clone())?);
        let gossip = Arc::new(MemoryGossip::new(id, self.network.clone()));
        let node = Arc::new(Node::new(id, engine, gossip));
        self.network.register(&node);
        self.nodes.insert(id.to_string(), node.clone());
        Ok(node)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Arc<Node>> {
        self.nodes.get(id)
    }

    /// Peer every node with every other node
    pub fn connect_all(&self) {
        for (id, node) in &self.nodes {
            for peer_id in self.nodes.keys() {
                if peer_id != id {
                    node.gossip().add_peer(peer_id, peer_id);
                }
            }
        }
        info!("connected {} nodes in a full mesh", self.nodes.len());
    }

    /// Remove a node from the simulation and from every peer directory
    pub fn disconnect_node(&mut self, id: &str) {
        self.nodes.remove(id);
        for node in self.nodes.values() {
            node.gossip().remove_peer(id);
        }
    }

    /// Start the consensus worker on every node
    pub fn start_all(&self) -> Result<()> {
        for node in self.nodes.values() {
            node.start_consensus()?;
        }
        Ok(())
    }

    /// Stop every running consensus worker
    pub async fn stop_all(&self) {
        for node in self.nodes.values() {
            let _ = node.stop_consensus().await;
        }
    }

    /// Propose `count` generated vertices through the given node, each
    /// referencing up to `max_parents` of its predecessors. Returns the
    /// vertices that were accepted locally.
    pub async fn seed_random_vertices(
        &self,
        node_id: &str,
        count: usize,
        max_parents: usize,
    ) -> Vec<Vertex> {
        let Some(node) = self.nodes.get(node_id) else {
            return Vec::new();
        };
        let mut accepted = Vec::with_capacity(count);
        for i in 0..count {
            let id = format!("vertex-{i}");
            let data = json!(format!("transaction-{i}"));
            let parents: Vec<VertexId> = (1..=max_parents)
                .filter(|j| *j <= i)
                .map(|j| format!("vertex-{}", i - j))
                .collect();
            match node.propose_vertex(&id, data, &parents) {
                Ok(vx) => accepted.push(vx),
                Err(e) => debug!("vertex {id} not accepted: {e}"),
            }
            // Space proposals out a little, like a live workload would
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        accepted
    }

    /// Finalized-vertex count per node, sorted by node id
    pub fn finalized_counts(&self) -> Vec<(String, usize)> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.engine().finalized_ids().len()))
            .sorted_by(|a, b| Ord::cmp(&a.0, &b.0))
            .collect()
    }
}
