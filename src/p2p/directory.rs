use std::{collections::HashMap, sync::RwLock};
use tracing::debug;

/// Directory of known peers, keyed by node id. The directory has its own
/// lock; callers snapshot the table before doing any network I/O so the lock
/// is never held across a request.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: RwLock<HashMap<String, String>>,
}

impl PeerDirectory {
    pub fn new() -> PeerDirectory {
        PeerDirectory::default()
    }

    /// Record a peer's address, replacing any previous entry
    pub fn add_peer(&self, id: &str, address: &str) {
        let mut peers = self.peers.write().expect("peer directory lock poisoned");
        peers.insert(id.to_string(), address.to_string());
        debug!("peer {id} registered at {address}");
    }

    /// Drop a peer from the directory
    pub fn remove_peer(&self, id: &str) {
        let mut peers = self.peers.write().expect("peer directory lock poisoned");
        peers.remove(id);
        debug!("peer {id} removed");
    }

    /// Ids of every known peer
    pub fn get_peers(&self) -> Vec<String> {
        self.peers
            .read()
            .expect("peer directory lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Returns true if the peer id is known
    pub fn contains(&self, id: &str) -> bool {
        self.peers
            .read()
            .expect("peer directory lock poisoned")
            .contains_key(id)
    }

    /// Copy of the full (id, address) table
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.peers
            .read()
            .expect("peer directory lock poisoned")
            .iter()
            .map(|(id, addr)| (id.clone(), addr.clone()))
            .collect()
    }

    /// Number of known peers
    pub fn len(&self) -> usize {
        self.peers.read().expect("peer directory lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::PeerDirectory;

    #[test]
    fn add_remove_peers() {
        let dir = PeerDirectory::new();
        assert!(dir.is_empty());
        dir.add_peer("node-2", "http://peer-a:8080");
        dir.add_peer("node-3", "http://peer-b:8080");
        assert_eq!(dir.len(), 2);
        assert!(dir.contains("node-2"));

        // Re-adding replaces the address
        dir.add_peer("node-2", "http://peer-a:9090");
        let snapshot = dir.snapshot();
        let addr = snapshot
            .iter()
            .find(|(id, _)| id == "node-2")
            .map(|(_, addr)| addr.clone());
        assert_eq!(addr.as_deref(), Some("http://peer-a:9090"));

        dir.remove_peer("node-2");
        assert!(!dir.contains("node-2"));
        assert_eq!(dir.get_peers(), ["node-3"]);
    }
}
