//! Insertion hints for the rate-ordered position list.
//!
//! On-ledger insertion costs O(distance from hint), so we spend O(√n) cheap
//! read calls off-chain to land next to the right node. Phase one samples
//! `10 * ceil(sqrt(n))` random nodes through the approximate-hint oracle and
//! keeps the closest one; phase two asks the ledger for the exact neighbours
//! starting from that candidate.
//!
//! Every read failure degrades towards the zero hint. A zero hint makes the
//! ledger scan from the head: slower, never wrong.

use crate::config::Config;
use crate::domain::{InterestRate, PositionId};
use crate::ledger::{ApproxHint, LedgerReader};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Trials per list node, scaled by √n.
pub const TRIALS_PER_SQRT: u64 = 10;

/// Ceiling on sampled trials; reached at a million list nodes.
pub const MAX_TRIALS: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HintConfig {
    /// Fixed seed for reproducible sampling; entropy when `None`.
    pub seed: Option<u64>,
    /// Upper bound on trials per oracle call; 0 puts all trials in one call.
    pub trials_per_probe: u64,
}

impl HintConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            seed: config.hint_seed,
            trials_per_probe: config.hint_trials_per_probe,
        }
    }
}

/// How the returned hint was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HintQuality {
    /// Sampled candidate refined by the exact search.
    Exact,
    /// Exact search from an empty seed hint (empty list or no oracle).
    ExactUnseeded,
    /// Nothing could be computed; the ledger will do a full scan.
    Unhinted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionHint {
    pub approx_hint: PositionId,
    /// Neighbour with `rate <= target`, zero at the head.
    pub upper_hint: PositionId,
    /// Neighbour with `rate >= target`, zero at the tail.
    pub lower_hint: PositionId,
    pub quality: HintQuality,
}

impl InsertionHint {
    pub fn unhinted() -> Self {
        InsertionHint {
            approx_hint: PositionId::ZERO,
            upper_hint: PositionId::ZERO,
            lower_hint: PositionId::ZERO,
            quality: HintQuality::Unhinted,
        }
    }
}

/// `10 * ceil(sqrt(list_size))`, capped at [`MAX_TRIALS`].
pub fn trial_count(list_size: u64) -> u64 {
    TRIALS_PER_SQRT.saturating_mul(ceil_sqrt(list_size)).min(MAX_TRIALS)
}

fn ceil_sqrt(n: u64) -> u64 {
    const ROOT_MAX: u64 = u32::MAX as u64;
    if n == 0 {
        return 0;
    }
    // Any root above u32::MAX squares past u64::MAX.
    let mut root = ((n as f64).sqrt() as u64).min(ROOT_MAX);
    // Correct float error in either direction.
    while root * root > n {
        root -= 1;
    }
    while root < ROOT_MAX && (root + 1) * (root + 1) <= n {
        root += 1;
    }
    if root * root == n {
        root
    } else {
        root + 1
    }
}

#[derive(Debug, Clone)]
pub struct HintFinder {
    ledger: Arc<dyn LedgerReader>,
    config: HintConfig,
}

impl HintFinder {
    pub fn new(ledger: Arc<dyn LedgerReader>, config: HintConfig) -> Self {
        Self { ledger, config }
    }

    /// Read the list size, then compute the hint. A failed size read skips
    /// sampling.
    pub async fn hint_for(&self, branch: u32, target: InterestRate) -> InsertionHint {
        let list_size = match self.ledger.get_list_size(branch).await {
            Ok(size) => size,
            Err(e) => {
                warn!("List size unavailable on branch {}, skipping sampling: {}", branch, e);
                0
            }
        };
        self.find_insertion_hint(branch, list_size, target).await
    }

    /// Compute hints using the configured seed (or entropy).
    pub async fn find_insertion_hint(
        &self,
        branch: u32,
        list_size: u64,
        target: InterestRate,
    ) -> InsertionHint {
        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.find_insertion_hint_with_rng(branch, list_size, target, &mut rng)
            .await
    }

    /// Compute hints drawing oracle seeds from `rng`.
    pub async fn find_insertion_hint_with_rng<R: RngCore + Send>(
        &self,
        branch: u32,
        list_size: u64,
        target: InterestRate,
        rng: &mut R,
    ) -> InsertionHint {
        let approx = if list_size == 0 {
            None
        } else {
            let seed: u64 = rng.gen();
            self.sample(branch, list_size, target, seed).await
        };

        let (seed_hint, quality) = match approx {
            Some(hint) if !hint.hint_id.is_zero() => (hint.hint_id, HintQuality::Exact),
            _ => (PositionId::ZERO, HintQuality::ExactUnseeded),
        };

        match self
            .ledger
            .find_insert_position(branch, target, seed_hint, seed_hint)
            .await
        {
            Ok((upper_hint, lower_hint)) => {
                debug!(
                    "Insert position for {} on branch {}: upper={} lower={} ({:?})",
                    target, branch, upper_hint, lower_hint, quality
                );
                InsertionHint {
                    approx_hint: seed_hint,
                    upper_hint,
                    lower_hint,
                    quality,
                }
            }
            Err(e) => {
                warn!(
                    "Exact insert position failed on branch {}, returning zero hints: {}",
                    branch, e
                );
                InsertionHint::unhinted()
            }
        }
    }

    /// Approximate phase. Returns the closest candidate over all probes, or
    /// `None` if the oracle could not be reached at all.
    async fn sample(
        &self,
        branch: u32,
        list_size: u64,
        target: InterestRate,
        seed: u64,
    ) -> Option<ApproxHint> {
        let total = trial_count(list_size);
        let per_probe = match self.config.trials_per_probe {
            0 => total,
            n => n.min(total),
        };

        let mut best: Option<ApproxHint> = None;
        let mut remaining = total;
        let mut seed = seed;
        while remaining > 0 {
            let trials = remaining.min(per_probe);
            match self
                .ledger
                .get_approx_hint(branch, target, trials, seed)
                .await
            {
                Ok(hint) => {
                    if best.map_or(true, |b| hint.diff < b.diff) {
                        best = Some(hint);
                    }
                    seed = hint.latest_seed;
                }
                Err(e) => {
                    warn!(
                        "Approximate hint oracle failed on branch {} after {} of {} trials: {}",
                        branch,
                        total - remaining,
                        total,
                        e
                    );
                    break;
                }
            }
            remaining -= trials;
        }
        best
    }
}
