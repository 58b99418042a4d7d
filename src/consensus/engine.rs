use super::{
    dag::{self, Dag},
    params::{self, Params},
    sampler::Sampler,
    vertex::{Payload, Vertex, VertexId},
};
use indexmap::IndexMap;
use std::{
    collections::HashSet,
    result,
    sync::{Arc, RwLock},
    time::Duration,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Probability that the simulated network approves a vertex when none of the
/// structural preference rules apply. Real deployments replace that branch
/// with a peer query.
pub const PREFER_BIAS: f64 = 0.7;

/// Pause between consensus rounds
const ROUND_QUIESCENCE: Duration = Duration::from_millis(10);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Dag(#[from] dag::Error),
    #[error(transparent)]
    Params(#[from] params::Error),
    #[error("too many outstanding vertices (limit {0})")]
    TooManyOutstanding(usize),
}
type Result<T> = result::Result<T, Error>;

/// Decides whether two vertices may not both finalize. All conflict checks in
/// the engine go through one predicate so a richer rule (e.g. overlapping
/// spends) can replace it without touching the consensus logic.
pub type ConflictPredicate = Box<dyn Fn(&Vertex, &Vertex) -> bool + Send + Sync>;

/// Consensus bookkeeping: confidence counters for undecided vertices, plus
/// the set of decided ones. The two sets are disjoint and every member id
/// exists in the graph.
#[derive(Debug, Default)]
struct State {
    pending: IndexMap<VertexId, usize>,
    finalized: HashSet<VertexId>,
}

/// The metastable voting engine. Repeatedly samples the graph about each
/// pending vertex; a vertex whose approvals reach `alpha` in a round gains
/// one point of confidence, any failed round resets it to zero, and enough
/// consecutive successes finalize the vertex for good.
pub struct Avalanche {
    dag: Arc<Dag>,
    params: Params,
    sampler: Sampler,
    conflicts: ConflictPredicate,
    state: RwLock<State>,
}

impl Avalanche {
    /// Create a new engine over the given graph. Fails if the parameters are
    /// out of range. The default conflict rule treats two vertices as
    /// conflicting when their ids differ but their payloads are equal.
    pub fn new(dag: Arc<Dag>, params: Params) -> Result<Avalanche> {
        params.check()?;
        Ok(Avalanche {
            dag,
            params,
            sampler: Sampler::new(),
            conflicts: Box::new(|v, w| v.id != w.id && v.data == w.data),
            state: RwLock::new(State::default()),
        })
    }

    /// Replace the sampler seed, for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Avalanche {
        self.sampler = Sampler::with_seed(seed);
        self
    }

    /// Replace the conflict rule
    pub fn with_conflict_predicate(mut self, conflicts: ConflictPredicate) -> Avalanche {
        self.conflicts = conflicts;
        self
    }

    /// Protocol parameters in effect
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The underlying graph
    pub fn dag(&self) -> &Arc<Dag> {
        &self.dag
    }

    /// Insert a vertex and link it to its parents, atomically. On any edge
    /// failure (unknown parent, cycle) the vertex is removed again and the
    /// error surfaced; no partial state remains. On success the vertex joins
    /// the pending set with confidence zero.
    pub fn add_vertex(&self, id: &str, data: Payload, parent_ids: &[VertexId]) -> Result<Vertex> {
        {
            let state = self.state.read().expect("engine lock poisoned");
            if state.pending.len() >= self.params.max_outstanding {
                return Err(Error::TooManyOutstanding(self.params.max_outstanding));
            }
        }

        self.dag.add_vertex(id, data)?;
        for pid in parent_ids {
            if let Err(e) = self.dag.add_edge(pid, id) {
                let _ = self.dag.remove_vertex(id);
                return Err(e.into());
            }
        }

        self.state
            .write()
            .expect("engine lock poisoned")
            .pending
            .insert(id.to_string(), 0);
        debug!("vertex {id} pending with {} parents", parent_ids.len());
        Ok(self.dag.get_vertex(id)?)
    }

    /// Drive consensus rounds until the token fires. Cancellation is only
    /// observed between rounds; an in-flight round always runs to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("consensus loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.round().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(ROUND_QUIESCENCE) => {}
            }
        }
        info!("consensus loop stopped");
    }

    /// Run a single round over a snapshot of the pending set. Entries that
    /// finalize mid-round are skipped; arrivals after the snapshot wait for
    /// the next round.
    pub async fn round(&self) {
        let snapshot: Vec<VertexId> = {
            let state = self.state.read().expect("engine lock poisoned");
            state.pending.keys().cloned().collect()
        };
        for batch in snapshot.chunks(self.params.batch_size) {
            for id in batch {
                self.process_vertex(id);
            }
            tokio::task::yield_now().await;
        }
    }

    // One sampling step for one vertex: poll up to k vertices, award a
    // confidence point on an alpha supermajority, otherwise reset.
    fn process_vertex(&self, id: &VertexId) {
        let confidence = {
            let state = self.state.read().expect("engine lock poisoned");
            if state.finalized.contains(id) {
                return;
            }
            match state.pending.get(id) {
                Some(c) => *c,
                None => return,
            }
        };

        let k = self.params.k.min(self.params.max_sample_size);
        let samples = self.sampler.sample(&self.dag, id, k);
        if samples.is_empty() {
            // Graph too small to poll yet; leave the counter untouched
            return;
        }

        let mut approvals = 0;
        for sample in &samples {
            if self.prefers(sample, id) {
                approvals += 1;
            }
        }
        if approvals < self.params.alpha {
            debug!("round failed for {id} ({approvals}/{} approvals)", samples.len());
            let mut state = self.state.write().expect("engine lock poisoned");
            if let Some(c) = state.pending.get_mut(id) {
                *c = 0;
            }
            return;
        }

        // Threshold lookup reads the graph, so resolve it before taking the
        // state lock.
        let threshold = self.threshold(id);
        let newly_finalized = {
            let mut state = self.state.write().expect("engine lock poisoned");
            let Some(c) = state.pending.get_mut(id) else {
                return;
            };
            *c = confidence + 1;
            if *c >= threshold {
                state.pending.shift_remove(id);
                state.finalized.insert(id.clone());
                true
            } else {
                false
            }
        };
        if newly_finalized {
            let _ = self.dag.mark_finalized(id);
            info!("vertex {id} finalized");
        }
    }

    // Would the sampled vertex endorse the target? Approves when the target
    // is already decided, when the target is an ancestor of the sample, when
    // the sample carries the preference hint, and otherwise by a biased coin
    // standing in for the remote peer's answer.
    fn prefers(&self, sample_id: &str, target_id: &str) -> bool {
        let Ok(sample) = self.dag.get_vertex(sample_id) else {
            return false;
        };
        let Ok(target) = self.dag.get_vertex(target_id) else {
            return false;
        };
        if target.finalized {
            return true;
        }
        if self.dag.is_ancestor(target_id, sample_id) {
            return true;
        }
        if sample.preferred {
            return true;
        }
        self.sampler.biased_coin(PREFER_BIAS)
    }

    // Confidence required to finalize: the rogue threshold when anything in
    // the graph conflicts with the vertex, the virtuous one otherwise.
    fn threshold(&self, id: &str) -> usize {
        let Ok(vertex) = self.dag.get_vertex(id) else {
            return self.params.beta_rogue;
        };
        let rogue = self
            .dag
            .get_vertices()
            .iter()
            .any(|other| (self.conflicts)(&vertex, other));
        if rogue {
            self.params.beta_rogue
        } else {
            self.params.beta_virtuous
        }
    }

    /// Every finalized vertex, as graph snapshots
    pub fn get_finalized(&self) -> Vec<Vertex> {
        let ids = self.finalized_ids();
        ids.iter()
            .filter_map(|id| self.dag.get_vertex(id).ok())
            .collect()
    }

    /// Ids currently finalized
    pub fn finalized_ids(&self) -> Vec<VertexId> {
        self.state
            .read()
            .expect("engine lock poisoned")
            .finalized
            .iter()
            .cloned()
            .collect()
    }

    /// Ids currently pending, in insertion order
    pub fn pending_ids(&self) -> Vec<VertexId> {
        self.state
            .read()
            .expect("engine lock poisoned")
            .pending
            .keys()
            .cloned()
            .collect()
    }

    /// Returns true if the vertex has been finalized
    pub fn is_finalized(&self, id: &str) -> bool {
        self.state
            .read()
            .expect("engine lock poisoned")
            .finalized
            .contains(id)
    }

    /// Returns true if the vertex is still undergoing sampling
    pub fn is_pending(&self, id: &str) -> bool {
        self.state
            .read()
            .expect("engine lock poisoned")
            .pending
            .contains_key(id)
    }

    /// Current confidence counter for a pending vertex
    pub fn confidence(&self, id: &str) -> Option<usize> {
        self.state
            .read()
            .expect("engine lock poisoned")
            .pending
            .get(id)
            .copied()
    }

    /// Look up a vertex in the graph
    pub fn get_vertex(&self, id: &str) -> Result<Vertex> {
        Ok(self.dag.get_vertex(id)?)
    }

    /// Snapshot of every vertex in the graph
    pub fn get_all_vertices(&self) -> Vec<Vertex> {
        self.dag.get_vertices()
    }
}
