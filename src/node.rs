use crate::{
    consensus::{
        engine::{self, Avalanche},
        vertex::{Payload, Vertex, VertexId},
    },
    p2p::{gossip::Gossip, wire::VertexMessage},
};
use std::{
    result,
    sync::{Arc, Mutex},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] engine::Error),
    #[error("consensus is already running")]
    AlreadyRunning,
    #[error("consensus is not running")]
    NotRunning,
}
type Result<T> = result::Result<T, Error>;

// Long-running consensus worker, bound to its cancellation token
struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One consensus participant: the engine plus the injected gossip transport.
/// Locally proposed vertices are inserted and then fanned out to peers;
/// vertices arriving from peers take the same insertion path without a
/// re-broadcast.
pub struct Node {
    id: String,
    engine: Arc<Avalanche>,
    gossip: Arc<dyn Gossip>,
    worker: Mutex<Option<Worker>>,
}

impl Node {
    pub fn new(id: impl Into<String>, engine: Arc<Avalanche>, gossip: Arc<dyn Gossip>) -> Node {
        Node {
            id: id.into(),
            engine,
            gossip,
            worker: Mutex::new(None),
        }
    }

    /// This node's identifier on the network
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The consensus engine
    pub fn engine(&self) -> &Arc<Avalanche> {
        &self.engine
    }

    /// The gossip transport
    pub fn gossip(&self) -> &Arc<dyn Gossip> {
        &self.gossip
    }

    /// Spawn the consensus worker. Fails if it is already running.
    pub fn start_consensus(&self) -> Result<()> {
        let mut worker = self.worker.lock().expect("worker lock poisoned");
        if worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let cancel = CancellationToken::new();
        let engine = self.engine.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { engine.run(token).await });
        *worker = Some(Worker { cancel, handle });
        info!("node {}: consensus started", self.id);
        Ok(())
    }

    /// Stop the consensus worker and wait for the in-flight round to finish.
    /// Fails if the worker is not running.
    pub async fn stop_consensus(&self) -> Result<()> {
        let Worker { cancel, handle } = self
            .worker
            .lock()
            .expect("worker lock poisoned")
            .take()
            .ok_or(Error::NotRunning)?;
        cancel.cancel();
        let _ = handle.await;
        info!("node {}: consensus stopped", self.id);
        Ok(())
    }

    /// Returns true if the consensus worker is running
    pub fn is_running(&self) -> bool {
        self.worker.lock().expect("worker lock poisoned").is_some()
    }

    /// Insert a locally proposed vertex and fan it out to peers. The
    /// broadcast is best effort and runs in the background; a transport
    /// failure never rolls back the local insertion.
    pub fn propose_vertex(
        &self,
        id: &str,
        data: Payload,
        parent_ids: &[VertexId],
    ) -> Result<Vertex> {
        let vertex = self.engine.add_vertex(id, data.clone(), parent_ids)?;
        let gossip = self.gossip.clone();
        let vertex_id = vertex.id.clone();
        let parents = parent_ids.to_vec();
        tokio::spawn(async move {
            gossip.broadcast_vertex(&vertex_id, &data, &parents).await;
        });
        Ok(vertex)
    }

    /// Handle a vertex announced by a peer. Unknown senders that supplied a
    /// reachable address are added to the directory on the spot. Duplicate
    /// ids are the normal steady-state outcome once gossip has propagated.
    pub fn receive_vertex(&self, msg: VertexMessage, sender_addr: Option<&str>) -> Result<Vertex> {
        if let Some(addr) = sender_addr {
            if !msg.sender_id.is_empty() && !self.gossip.get_peers().contains(&msg.sender_id) {
                self.gossip.add_peer(&msg.sender_id, addr);
                debug!("node {}: discovered peer {} at {addr}", self.id, msg.sender_id);
            }
        }
        match self.engine.add_vertex(&msg.id, msg.data, &msg.parent_ids) {
            Ok(vertex) => Ok(vertex),
            Err(e) => {
                debug!("node {}: vertex {} not accepted: {e}", self.id, msg.id);
                Err(e.into())
            }
        }
    }

    /// Perform the identity exchange with each address
    pub async fn connect_to_peers(&self, addresses: &[String]) {
        self.gossip.connect_to_peers(addresses).await;
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Make sure a forgotten worker does not spin forever
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(w) = worker.take() {
                warn!("node {}: consensus worker dropped while running", self.id);
                w.cancel.cancel();
                w.handle.abort();
            }
        }
    }
}
