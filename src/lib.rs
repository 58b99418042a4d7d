pub mod consensus;
pub mod node;
pub mod p2p;
pub mod sim;

pub use consensus::{Avalanche, Dag, Params, Vertex, VertexId};
pub use node::Node;
pub use p2p::{Gossip, PeerDirectory, VertexMessage};
