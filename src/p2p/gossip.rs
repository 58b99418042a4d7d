use crate::consensus::vertex::{Payload, VertexId};
use async_trait::async_trait;

/// Capabilities the consensus node needs from the peer network. A concrete
/// transport is injected at wiring time; tests and simulations supply an
/// in-memory implementation that hands vertices straight to peer engines.
///
/// Broadcast and connect are best effort: transport failures are logged by
/// the implementation and never surfaced to the vertex submitter.
#[async_trait]
pub trait Gossip: Send + Sync {
    /// Fan a locally accepted vertex out to every known peer
    async fn broadcast_vertex(&self, id: &VertexId, data: &Payload, parent_ids: &[VertexId]);

    /// Ids of every known peer
    fn get_peers(&self) -> Vec<String>;

    /// Perform the identity exchange with each address and record the
    /// responders in the peer directory
    async fn connect_to_peers(&self, addresses: &[String]);

    /// Record a peer directly (lazy discovery on the receive path)
    fn add_peer(&self, id: &str, address: &str);

    /// Forget a peer
    fn remove_peer(&self, id: &str);
}
