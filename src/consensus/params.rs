use serde::{Deserialize, Serialize};
use std::{result, time::Duration};

pub const DFLT_SAMPLE_COUNT: usize = 10;
pub const DFLT_QUORUM_COUNT: usize = 8;
pub const DFLT_VIRTUOUS_THRESHOLD: usize = 20;
pub const DFLT_ROGUE_THRESHOLD: usize = 30;
pub const DFLT_CONCURRENCY: usize = 4;
pub const DFLT_BATCH_SIZE: usize = 10;
pub const DFLT_MAX_OUTSTANDING: usize = 1024;
pub const DFLT_MAX_SAMPLE_SIZE: usize = 20;
pub const DFLT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("alpha must be positive")]
    AlphaZero,
    #[error("alpha must not exceed k")]
    AlphaExceedsK,
    #[error("k must not exceed max_sample_size")]
    KExceedsMaxSample,
    #[error("beta_virtuous must be positive")]
    BetaVirtuousZero,
    #[error("beta_virtuous must not exceed beta_rogue")]
    BetaVirtuousExceedsRogue,
    #[error("batch_size must be positive")]
    ZeroBatchSize,
    #[error("concurrency_num must be positive")]
    ZeroConcurrency,
}
type Result<T> = result::Result<T, Error>;

/// Tunable protocol parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Number of vertices sampled per round
    pub k: usize,

    /// Minimum approvals within one round for the round to count as a
    /// success
    pub alpha: usize,

    /// Consecutive successful rounds required to finalize a vertex with no
    /// conflicts
    pub beta_virtuous: usize,

    /// Consecutive successful rounds required to finalize a vertex with at
    /// least one conflict
    pub beta_rogue: usize,

    /// Maximum parallel in-flight operations
    pub concurrency_num: usize,

    /// Vertices processed per batch within a round
    pub batch_size: usize,

    /// Cap on the pending set
    pub max_outstanding: usize,

    /// Hard cap on `k` per request
    pub max_sample_size: usize,

    /// Per-query deadline once real peer polling replaces the local
    /// simulation
    pub sample_timeout: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            k: DFLT_SAMPLE_COUNT,
            alpha: DFLT_QUORUM_COUNT,
            beta_virtuous: DFLT_VIRTUOUS_THRESHOLD,
            beta_rogue: DFLT_ROGUE_THRESHOLD,
            concurrency_num: DFLT_CONCURRENCY,
            batch_size: DFLT_BATCH_SIZE,
            max_outstanding: DFLT_MAX_OUTSTANDING,
            max_sample_size: DFLT_MAX_SAMPLE_SIZE,
            sample_timeout: DFLT_SAMPLE_TIMEOUT,
        }
    }
}

impl Params {
    /// Check the parameters are legal: 0 < alpha <= k <= max_sample_size and
    /// 0 < beta_virtuous <= beta_rogue.
    pub fn check(&self) -> Result<()> {
        if self.alpha == 0 {
            Err(Error::AlphaZero)
        } else if self.alpha > self.k {
            Err(Error::AlphaExceedsK)
        } else if self.k > self.max_sample_size {
            Err(Error::KExceedsMaxSample)
        } else if self.beta_virtuous == 0 {
            Err(Error::BetaVirtuousZero)
        } else if self.beta_virtuous > self.beta_rogue {
            Err(Error::BetaVirtuousExceedsRogue)
        } else if self.batch_size == 0 {
            Err(Error::ZeroBatchSize)
        } else if self.concurrency_num == 0 {
            Err(Error::ZeroConcurrency)
        } else {
            Ok(())
        }
    }
}
