pub mod client;
pub mod directory;
pub mod gossip;
pub mod wire;

pub use client::HttpGossip;
pub use directory::PeerDirectory;
pub use gossip::Gossip;
pub use wire::{Handshake, VertexMessage};
