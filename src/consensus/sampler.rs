use super::{dag::Dag, vertex::VertexId};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

/// Selects the vertices polled in each consensus round. The generator is
/// cryptographically seeded by default; tests fix the seed to reproduce
/// finalization timing.
#[derive(Debug)]
pub struct Sampler {
    rng: Mutex<StdRng>,
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::new()
    }
}

impl Sampler {
    /// Create a [`Sampler`] seeded from OS entropy
    pub fn new() -> Sampler {
        Sampler {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a [`Sampler`] with a fixed seed, for reproducible runs
    pub fn with_seed(seed: u64) -> Sampler {
        Sampler {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Select up to `k` distinct vertices to poll about `target`. Returns the
    /// empty list when the graph holds fewer than `k` vertices in total (the
    /// round is then a no-op for this target). The target's direct parents
    /// lead the candidate list so early rounds lean on ancestry.
    pub fn sample(&self, dag: &Dag, target: &str, k: usize) -> Vec<VertexId> {
        if k == 0 || dag.len() < k {
            return Vec::new();
        }
        let vertex = match dag.get_vertex(target) {
            Ok(vx) => vx,
            Err(_) => return Vec::new(),
        };

        let mut candidates: Vec<VertexId> = vertex.parents.iter().cloned().collect();
        for other in dag.get_vertices() {
            if other.id != target && !vertex.parents.contains(&other.id) {
                candidates.push(other.id);
            }
        }
        if candidates.len() <= k {
            return candidates;
        }

        // Fisher-Yates, then keep the first k
        let mut rng = self.rng.lock().expect("sampler rng poisoned");
        for i in (1..candidates.len()).rev() {
            let j = rng.gen_range(0..=i);
            candidates.swap(i, j);
        }
        drop(rng);
        candidates.truncate(k);
        candidates
    }

    /// Coin flip landing true with probability `bias`
    pub fn biased_coin(&self, bias: f64) -> bool {
        self.rng.lock().expect("sampler rng poisoned").gen_bool(bias)
    }
}
