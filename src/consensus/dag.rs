use super::vertex::{Payload, Vertex, VertexId};
use std::{
    collections::{HashMap, HashSet},
    result,
    sync::RwLock,
};
use tracing::debug;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("vertex already exists")]
    AlreadyExists,
    #[error("vertex not found")]
    NotFound,
    #[error("operation would create a cycle")]
    WouldCreateCycle,
    #[error("vertex id must not be empty")]
    EmptyId,
}
type Result<T> = result::Result<T, Error>;

/// Interior tables of the graph. Vertices live in a single central table
/// keyed by id; the parent/child relations are id sets resolved through that
/// table, so removal is O(degree) and there are no ownership cycles.
#[derive(Debug, Default)]
struct Tables {
    vertices: HashMap<VertexId, Vertex>,
    roots: HashSet<VertexId>,
}

/// Concurrent directed acyclic graph of [`Vertex`] entries. All structural
/// changes go through this store, which is the sole authority on cycle
/// prevention. A single readers/writer lock protects the tables; getters
/// return snapshots so no lock outlives a call.
#[derive(Debug, Default)]
pub struct Dag {
    tables: RwLock<Tables>,
}

impl Dag {
    /// Create an empty [`Dag`]
    pub fn new() -> Dag {
        Dag::default()
    }

    /// Insert a new parentless vertex. Rejects empty and duplicate ids
    /// without touching existing state.
    pub fn add_vertex(&self, id: &str, data: Payload) -> Result<Vertex> {
        if id.is_empty() {
            return Err(Error::EmptyId);
        }
        let mut tables = self.tables.write().expect("dag lock poisoned");
        if tables.vertices.contains_key(id) {
            return Err(Error::AlreadyExists);
        }
        let vx = Vertex::new(id, data);
        tables.vertices.insert(vx.id.clone(), vx.clone());
        tables.roots.insert(vx.id.clone());
        debug!("added vertex {id}");
        Ok(vx)
    }

    /// Link `parent_id` -> `child_id`. Both endpoints must exist, and the
    /// edge is rejected if it would close a cycle. The child leaves the root
    /// set.
    pub fn add_edge(&self, parent_id: &str, child_id: &str) -> Result<()> {
        let mut tables = self.tables.write().expect("dag lock poisoned");
        if !tables.vertices.contains_key(parent_id) || !tables.vertices.contains_key(child_id) {
            return Err(Error::NotFound);
        }

        // The edge closes a cycle iff the candidate child is already an
        // ancestor of the candidate parent (or the edge is a self loop).
        if parent_id == child_id || ancestor_reachable(&tables, child_id, parent_id) {
            return Err(Error::WouldCreateCycle);
        }

        tables
            .vertices
            .get_mut(parent_id)
            .expect("parent checked above")
            .children
            .insert(child_id.to_string());
        tables
            .vertices
            .get_mut(child_id)
            .expect("child checked above")
            .parents
            .insert(parent_id.to_string());
        tables.roots.remove(child_id);
        debug!("added edge {parent_id} -> {child_id}");
        Ok(())
    }

    /// Remove a vertex, detaching it from all parents and children. Children
    /// left without any parent are promoted to roots.
    pub fn remove_vertex(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write().expect("dag lock poisoned");
        let vx = tables.vertices.remove(id).ok_or(Error::NotFound)?;
        for pid in &vx.parents {
            if let Some(parent) = tables.vertices.get_mut(pid) {
                parent.children.remove(id);
            }
        }
        for cid in &vx.children {
            let mut orphaned = false;
            if let Some(child) = tables.vertices.get_mut(cid) {
                child.parents.remove(id);
                orphaned = child.parents.is_empty();
            }
            if orphaned {
                tables.roots.insert(cid.clone());
            }
        }
        tables.roots.remove(id);
        debug!("removed vertex {id}");
        Ok(())
    }

    /// Look up a vertex by id, returning a snapshot
    pub fn get_vertex(&self, id: &str) -> Result<Vertex> {
        self.tables
            .read()
            .expect("dag lock poisoned")
            .vertices
            .get(id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// Snapshot of every vertex in the graph
    pub fn get_vertices(&self) -> Vec<Vertex> {
        self.tables
            .read()
            .expect("dag lock poisoned")
            .vertices
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of every root (parentless) vertex
    pub fn get_roots(&self) -> Vec<Vertex> {
        let tables = self.tables.read().expect("dag lock poisoned");
        tables
            .roots
            .iter()
            .filter_map(|id| tables.vertices.get(id))
            .cloned()
            .collect()
    }

    /// Number of vertices in the graph
    pub fn len(&self) -> usize {
        self.tables.read().expect("dag lock poisoned").vertices.len()
    }

    /// Returns true if the graph holds no vertices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the graph contains the given id
    pub fn contains(&self, id: &str) -> bool {
        self.tables
            .read()
            .expect("dag lock poisoned")
            .vertices
            .contains_key(id)
    }

    /// Returns true if `ancestor_id` is a strict ancestor of `descendant_id`
    /// through the parent relation. Visits each vertex at most once, so
    /// shared ancestry terminates in O(V+E).
    pub fn is_ancestor(&self, ancestor_id: &str, descendant_id: &str) -> bool {
        let tables = self.tables.read().expect("dag lock poisoned");
        ancestor_reachable(&tables, ancestor_id, descendant_id)
    }

    /// Mark the vertex as finalized. The flag is monotonic; there is no way
    /// to clear it.
    pub fn mark_finalized(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write().expect("dag lock poisoned");
        let vx = tables.vertices.get_mut(id).ok_or(Error::NotFound)?;
        vx.finalized = true;
        Ok(())
    }

    /// Set or clear the preference hint on a vertex
    pub fn set_preferred(&self, id: &str, preferred: bool) -> Result<()> {
        let mut tables = self.tables.write().expect("dag lock poisoned");
        let vx = tables.vertices.get_mut(id).ok_or(Error::NotFound)?;
        vx.preferred = preferred;
        Ok(())
    }
}

// Walk upward from `descendant`'s parents looking for `needle`. The visited
// set guarantees termination even with heavily shared ancestry.
fn ancestor_reachable(tables: &Tables, needle: &str, descendant: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = match tables.vertices.get(descendant) {
        Some(vx) => vx.parents.iter().map(String::as_str).collect(),
        None => return false,
    };
    while let Some(id) = stack.pop() {
        if id == needle {
            return true;
        }
        if !visited.insert(id) {
            continue;
        }
        if let Some(vx) = tables.vertices.get(id) {
            stack.extend(vx.parents.iter().map(String::as_str));
        }
    }
    false
}

#[cfg(test)]
mod test {
    use super::{Dag, Error};
    use serde_json::json;

    fn chain(ids: &[&str]) -> Dag {
        let dag = Dag::new();
        for id in ids {
            dag.add_vertex(id, json!(id)).unwrap();
        }
        for pair in ids.windows(2) {
            dag.add_edge(pair[0], pair[1]).unwrap();
        }
        dag
    }

    #[test]
    fn add_vertex() {
        let dag = Dag::new();
        let vx = dag.add_vertex("v0", json!(1)).unwrap();
        assert_eq!(vx.id, "v0");
        assert!(vx.is_root());
        assert_eq!(dag.len(), 1);
        assert!(dag.contains("v0"));

        // Duplicate ids are rejected without mutating the original
        assert_eq!(dag.add_vertex("v0", json!(2)), Err(Error::AlreadyExists));
        assert_eq!(dag.get_vertex("v0").unwrap().data, json!(1));

        assert_eq!(dag.add_vertex("", json!(0)), Err(Error::EmptyId));
    }

    #[test]
    fn add_edge() {
        let dag = Dag::new();
        dag.add_vertex("a", json!("a")).unwrap();
        dag.add_vertex("b", json!("b")).unwrap();
        assert_eq!(dag.add_edge("a", "missing"), Err(Error::NotFound));
        assert_eq!(dag.add_edge("missing", "b"), Err(Error::NotFound));

        dag.add_edge("a", "b").unwrap();
        let a = dag.get_vertex("a").unwrap();
        let b = dag.get_vertex("b").unwrap();
        assert!(a.children.contains("b"));
        assert!(b.parents.contains("a"));

        // b left the root set
        let roots: Vec<_> = dag.get_roots().into_iter().map(|v| v.id).collect();
        assert_eq!(roots, ["a"]);
    }

    #[test]
    fn edge_symmetry() {
        let dag = chain(&["a", "b", "c"]);
        for vx in dag.get_vertices() {
            for pid in &vx.parents {
                assert!(dag.get_vertex(pid).unwrap().children.contains(&vx.id));
            }
            for cid in &vx.children {
                assert!(dag.get_vertex(cid).unwrap().parents.contains(&vx.id));
            }
        }
    }

    #[test]
    fn cycle_rejected() {
        let dag = chain(&["a", "b", "c"]);
        // Closing the chain back onto any ancestor is refused
        assert_eq!(dag.add_edge("c", "a"), Err(Error::WouldCreateCycle));
        assert_eq!(dag.add_edge("c", "b"), Err(Error::WouldCreateCycle));
        assert_eq!(dag.add_edge("a", "a"), Err(Error::WouldCreateCycle));
        // The failed attempts left the graph unchanged
        assert!(dag.get_vertex("c").unwrap().children.is_empty());
        assert!(dag.get_vertex("a").unwrap().parents.is_empty());
    }

    #[test]
    fn remove_vertex() {
        let dag = Dag::new();
        for id in ["a", "b", "c"] {
            dag.add_vertex(id, json!(id)).unwrap();
        }
        dag.add_edge("a", "c").unwrap();
        dag.add_edge("b", "c").unwrap();

        assert_eq!(dag.remove_vertex("missing"), Err(Error::NotFound));

        // Removing one parent does not promote c; removing both does
        dag.remove_vertex("a").unwrap();
        assert!(!dag.get_roots().iter().any(|v| v.id == "c"));
        dag.remove_vertex("b").unwrap();
        assert!(dag.get_roots().iter().any(|v| v.id == "c"));
        assert_eq!(dag.get_vertex("a"), Err(Error::NotFound));
        assert!(dag.get_vertex("c").unwrap().parents.is_empty());
    }

    #[test]
    fn is_ancestor_diamond() {
        // a -> b, a -> c, b -> d, c -> d: shared ancestry must terminate
        let dag = Dag::new();
        for id in ["a", "b", "c", "d"] {
            dag.add_vertex(id, json!(id)).unwrap();
        }
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("a", "c").unwrap();
        dag.add_edge("b", "d").unwrap();
        dag.add_edge("c", "d").unwrap();

        assert!(dag.is_ancestor("a", "d"));
        assert!(dag.is_ancestor("b", "d"));
        assert!(!dag.is_ancestor("d", "a"));
        // A vertex is not its own ancestor
        assert!(!dag.is_ancestor("a", "a"));
    }

    #[test]
    fn mark_finalized() {
        let dag = Dag::new();
        dag.add_vertex("v0", json!(0)).unwrap();
        assert!(!dag.get_vertex("v0").unwrap().finalized);
        dag.mark_finalized("v0").unwrap();
        assert!(dag.get_vertex("v0").unwrap().finalized);
        assert_eq!(dag.mark_finalized("missing"), Err(Error::NotFound));
    }

    #[test]
    fn set_preferred() {
        let dag = Dag::new();
        dag.add_vertex("v0", json!(0)).unwrap();
        dag.set_preferred("v0", true).unwrap();
        assert!(dag.get_vertex("v0").unwrap().preferred);
        dag.set_preferred("v0", false).unwrap();
        assert!(!dag.get_vertex("v0").unwrap().preferred);
    }
}
