use crate::consensus::vertex::{Payload, VertexId};
use serde::{Deserialize, Serialize};

/// Vertex announcement exchanged between peers. The payload travels
/// untouched; only the ids and the sender matter to the protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexMessage {
    pub id: VertexId,
    pub data: Payload,
    pub parent_ids: Vec<VertexId>,
    pub sender_id: String,
}

/// Response to the identity exchange performed when connecting to a peer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub node_id: String,
}
