use super::{
    directory::PeerDirectory,
    gossip::Gossip,
    wire::{Handshake, VertexMessage},
};
use crate::consensus::{
    params::Params,
    vertex::{Payload, VertexId},
};
use async_trait::async_trait;
use std::{result, sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Request deadline for outbound vertex broadcasts
pub const BROADCAST_DEADLINE: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
type Result<T> = result::Result<T, Error>;

/// HTTP transport for the gossip protocol. Vertex announcements go out as
/// JSON to every peer concurrently, capped by a semaphore; a failed send is
/// logged and forgotten. The peer directory is shared with the owning node.
pub struct HttpGossip {
    node_id: String,
    directory: Arc<PeerDirectory>,
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
    query_deadline: Duration,
}

impl HttpGossip {
    pub fn new(
        node_id: impl Into<String>,
        directory: Arc<PeerDirectory>,
        params: &Params,
    ) -> Result<HttpGossip> {
        let client = reqwest::Client::builder()
            .timeout(BROADCAST_DEADLINE)
            .build()?;
        Ok(HttpGossip {
            node_id: node_id.into(),
            directory,
            client,
            limiter: Arc::new(Semaphore::new(params.concurrency_num)),
            query_deadline: params.sample_timeout,
        })
    }
}

#[async_trait]
impl Gossip for HttpGossip {
    async fn broadcast_vertex(&self, id: &VertexId, data: &Payload, parent_ids: &[VertexId]) {
        let msg = VertexMessage {
            id: id.clone(),
            data: data.clone(),
            parent_ids: parent_ids.to_vec(),
            sender_id: self.node_id.clone(),
        };

        // Copy the directory before any I/O so its lock is never held across
        // a request.
        let peers = self.directory.snapshot();
        let sends = peers.into_iter().map(|(peer_id, address)| {
            let client = self.client.clone();
            let limiter = self.limiter.clone();
            let msg = msg.clone();
            async move {
                let _permit = limiter.acquire().await.expect("limiter closed");
                let url = format!("{address}/api/v1/vertex");
                match client.post(&url).json(&msg).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!("sent vertex {} to peer {peer_id}", msg.id);
                    }
                    Ok(resp) => {
                        warn!(
                            "peer {peer_id} refused vertex {}: {}",
                            msg.id,
                            resp.status()
                        );
                    }
                    Err(e) => warn!("failed to send vertex {} to peer {peer_id}: {e}", msg.id),
                }
            }
        });
        futures::future::join_all(sends).await;
    }

    fn get_peers(&self) -> Vec<String> {
        self.directory.get_peers()
    }

    async fn connect_to_peers(&self, addresses: &[String]) {
        for address in addresses {
            let handshake = self
                .client
                .get(format!("{address}/api/v1/connect"))
                .query(&[("node_id", self.node_id.as_str())])
                .timeout(self.query_deadline)
                .send()
                .await;
            match handshake {
                Ok(resp) => match resp.json::<Handshake>().await {
                    Ok(peer) => {
                        self.directory.add_peer(&peer.node_id, address);
                        info!("connected to peer {} at {address}", peer.node_id);
                    }
                    Err(e) => warn!("bad handshake from {address}: {e}"),
                },
                Err(e) => warn!("failed to connect to {address}: {e}"),
            }
        }
    }

    fn add_peer(&self, id: &str, address: &str) {
        self.directory.add_peer(id, address);
    }

    fn remove_peer(&self, id: &str) {
        self.directory.remove_peer(id);
    }
}

#[cfg(test)]
mod test {
    use super::HttpGossip;
    use crate::consensus::params::Params;
    use crate::p2p::{directory::PeerDirectory, gossip::Gossip};
    use std::sync::Arc;

    #[test]
    fn shares_the_peer_directory() {
        let directory = Arc::new(PeerDirectory::new());
        let gossip = HttpGossip::new("node-1", directory.clone(), &Params::default()).unwrap();
        gossip.add_peer("node-2", "http://peer:8080");
        assert_eq!(directory.get_peers(), ["node-2"]);
        assert_eq!(gossip.get_peers(), ["node-2"]);
        gossip.remove_peer("node-2");
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn broadcast_absorbs_unreachable_peers() {
        let directory = Arc::new(PeerDirectory::new());
        // Nothing listens here; the send must fail quietly
        directory.add_peer("node-2", "http://127.0.0.1:1");
        let gossip = HttpGossip::new("node-1", directory, &Params::default()).unwrap();
        gossip
            .broadcast_vertex(
                &"v0".to_string(),
                &serde_json::json!("payload"),
                &[],
            )
            .await;
    }
}
