use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// Type alias for vertex identifiers. Ids are caller-supplied opaque strings,
/// unique within a node's graph.
pub type VertexId = String;

/// Opaque vertex payload. The protocol never interprets it; it only needs to
/// be comparable for equality (conflict detection) and serializable on the
/// wire.
pub type Payload = serde_json::Value;

/// A vertex in the decision graph, representing a transaction or other
/// decision unit proposed for agreement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Caller-supplied unique identifier
    pub id: VertexId,

    /// Opaque payload carried by this vertex
    pub data: Payload,

    /// Ids of this vertex's parents
    pub parents: HashSet<VertexId>,

    /// Ids of this vertex's known children. Derived from the parent relation
    /// and maintained bidirectionally by the graph.
    pub children: HashSet<VertexId>,

    /// Opt-in affirmative vote consulted during preference queries
    pub preferred: bool,

    /// Slot reserved for coloring-based conflict resolution
    pub color: i64,

    /// Whether this vertex has reached finality. Monotonic: once set it is
    /// never cleared.
    pub finalized: bool,
}

impl Vertex {
    /// Create a new detached [`Vertex`] with the given id and payload
    pub fn new(id: impl Into<VertexId>, data: Payload) -> Vertex {
        Vertex {
            id: id.into(),
            data,
            parents: HashSet::new(),
            children: HashSet::new(),
            preferred: false,
            color: 0,
            finalized: false,
        }
    }

    /// Returns true if this vertex has no parents
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::to_string_pretty(self).unwrap())
    }
}
