//! The policy cache (§4.6, §10.5): a small LRU of solved policies keyed by a fingerprint over the
//! request, with single-flight de-duplication so concurrent `compute_policy` calls for the same
//! fingerprint solve once instead of racing.

use crate::catalogue::Catalogue;
use crate::cost::{CostModel, CostWeights};
use crate::dp::{self, PolicyTable};
use crate::error::EngineError;
use crate::lambda_search::{self, SearchParams};
use crate::scorer::Scorer;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

/// Default cache bound (§4.6: "a small bound, e.g. 8 entries").
pub const DEFAULT_CAPACITY: usize = 8;

/// Canonicalised cache key (§4.6): weights rounded to 1e-9, target, scorer variant, cost weights,
/// refund ratio, and whether user counts were blended. Rounding weights to a fixed-point integer
/// before hashing/equality keeps two requests that differ only in float noise beyond 1e-9 from
/// colliding into distinct cache entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    weights_fixed: Vec<i64>,
    target_fixed: i64,
    scorer_tag: &'static str,
    cost_fixed: [i64; 3],
    refund_fixed: i64,
    blended: bool,
}

impl Fingerprint {
    pub fn new(catalogue: &Catalogue, scorer: &Scorer, cost: &CostModel, target: f64, blended: bool) -> Self {
        let weights_fixed = catalogue
            .buffs()
            .map(|b| to_fixed(scorer.weights().get(b)))
            .collect();
        Self {
            weights_fixed,
            target_fixed: to_fixed(target),
            scorer_tag: scorer.variant().tag(),
            cost_fixed: [
                to_fixed(cost.weights.w_echo),
                to_fixed(cost.weights.w_tuner),
                to_fixed(cost.weights.w_exp),
            ],
            refund_fixed: to_fixed(cost.refund_ratio),
            blended,
        }
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.weights_fixed.hash(state);
        self.target_fixed.hash(state);
        self.scorer_tag.hash(state);
        self.cost_fixed.hash(state);
        self.refund_fixed.hash(state);
        self.blended.hash(state);
    }
}

fn to_fixed(v: f64) -> i64 {
    (v * 1e9).round() as i64
}

/// A fully solved policy: λ*, its table, and the resource decomposition computed from it
/// (§4.5's "re-evaluate V with each cost axis isolated").
pub struct SolvedPolicy {
    pub catalogue: Catalogue,
    pub scorer: Scorer,
    pub cost: CostModel,
    pub target: f64,
    pub lambda_star: f64,
    pub table: PolicyTable,
    pub success_probability: f64,
    pub echo_per_success: f64,
    pub tuner_per_success: f64,
    pub exp_per_success: f64,
    pub compute_seconds: f64,
}

fn per_success(total: f64, success_probability: f64) -> f64 {
    if success_probability > 0.0 {
        total / success_probability
    } else {
        0.0
    }
}

/// Solves a request from scratch: λ-search followed by the three single-axis resource tallies.
/// Does not touch the cache; callers go through [`PolicyCache::compute`] for de-duplication.
pub fn solve_policy(
    catalogue: Catalogue,
    scorer: Scorer,
    cost: CostModel,
    target: f64,
    params: SearchParams,
    cancel: &AtomicBool,
) -> Result<SolvedPolicy, EngineError> {
    let started = Instant::now();
    let ctx = dp::DpContext {
        catalogue: &catalogue,
        scorer: &scorer,
        cost: &cost,
        target,
    };
    let solution = lambda_search::solve(&ctx, params, cancel)?;
    let success_probability = solution.table.root_entry().success_probability;

    let echo_axis = CostModel::new(
        CostWeights {
            w_echo: cost.weights.w_echo,
            w_tuner: 0.0,
            w_exp: 0.0,
        },
        cost.refund_ratio,
    );
    let tuner_axis = CostModel::new(
        CostWeights {
            w_echo: 0.0,
            w_tuner: cost.weights.w_tuner,
            w_exp: 0.0,
        },
        cost.refund_ratio,
    );
    let exp_axis = CostModel::new(
        CostWeights {
            w_echo: 0.0,
            w_tuner: 0.0,
            w_exp: cost.weights.w_exp,
        },
        cost.refund_ratio,
    );
    // The three axis tallies walk the same fixed policy independently of one another, so they run
    // as two rayon::join pairs rather than sequentially.
    let (echo_total, (tuner_total, exp_total)) = rayon::join(
        || dp::tally_resource(&solution.table, &echo_axis, &catalogue, &scorer, cancel),
        || {
            rayon::join(
                || dp::tally_resource(&solution.table, &tuner_axis, &catalogue, &scorer, cancel),
                || dp::tally_resource(&solution.table, &exp_axis, &catalogue, &scorer, cancel),
            )
        },
    );
    let echo_total = echo_total?;
    let tuner_total = tuner_total?;
    let exp_total = exp_total?;

    Ok(SolvedPolicy {
        catalogue,
        scorer,
        cost,
        target,
        lambda_star: solution.lambda,
        table: solution.table,
        success_probability,
        echo_per_success: per_success(echo_total, success_probability),
        tuner_per_success: per_success(tuner_total, success_probability),
        exp_per_success: per_success(exp_total, success_probability),
        compute_seconds: started.elapsed().as_secs_f64(),
    })
}

type InFlightEntry = Arc<OnceLock<Result<Arc<SolvedPolicy>, EngineError>>>;

/// The process-wide policy cache: an LRU of `Arc<SolvedPolicy>` plus an in-flight map for
/// single-flight de-duplication (§5, §10.5). Cloning an `Arc` out from under the lock means
/// `suggest`/`summary` readers never block on a `compute` in progress for a different fingerprint.
pub struct PolicyCache {
    capacity: usize,
    entries: Mutex<Vec<(Fingerprint, Arc<SolvedPolicy>)>>,
    in_flight: Mutex<HashMap<Fingerprint, InFlightEntry>>,
}

impl PolicyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<SolvedPolicy>> {
        let mut entries = self.entries.lock().expect("policy cache mutex poisoned");
        let pos = entries.iter().position(|(f, _)| f == fingerprint)?;
        let (f, policy) = entries.remove(pos);
        let cloned = policy.clone();
        entries.push((f, policy));
        Some(cloned)
    }

    fn insert(&self, fingerprint: Fingerprint, policy: Arc<SolvedPolicy>) {
        let mut entries = self.entries.lock().expect("policy cache mutex poisoned");
        entries.retain(|(f, _)| f != &fingerprint);
        entries.push((fingerprint, policy));
        while entries.len() > self.capacity {
            let evicted = entries.remove(0);
            log::warn!("policy cache evicting fingerprint (lru), capacity={}", self.capacity);
            drop(evicted);
        }
    }

    /// Computes (or returns the already in-flight / already cached) policy for `fingerprint`,
    /// solving it with `solve` exactly once no matter how many callers arrive concurrently.
    pub fn compute<F>(&self, fingerprint: Fingerprint, solve: F) -> Result<Arc<SolvedPolicy>, EngineError>
    where
        F: FnOnce() -> Result<SolvedPolicy, EngineError>,
    {
        if let Some(hit) = self.get(&fingerprint) {
            return Ok(hit);
        }

        let (entry, is_leader) = {
            let mut in_flight = self.in_flight.lock().expect("in-flight mutex poisoned");
            match in_flight.get(&fingerprint) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let fresh: InFlightEntry = Arc::new(OnceLock::new());
                    in_flight.insert(fingerprint.clone(), fresh.clone());
                    (fresh, true)
                }
            }
        };

        if is_leader {
            let result = solve().map(Arc::new);
            let _ = entry.set(result.clone());
            self.in_flight
                .lock()
                .expect("in-flight mutex poisoned")
                .remove(&fingerprint);
            if let Ok(policy) = &result {
                self.insert(fingerprint, policy.clone());
            }
            result
        } else {
            // std::sync::OnceLock has no blocking wait, so the follower spins until the leader
            // calls entry.set(...). Fine here: the window is one compute_policy call, not a hot
            // loop held open indefinitely.
            loop {
                if let Some(result) = entry.get() {
                    break result.clone();
                }
                std::thread::yield_now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{default_catalogue, default_weights};
    use crate::scorer::ScorerVariant;

    fn fingerprint() -> Fingerprint {
        let catalogue = default_catalogue();
        let scorer = Scorer::new(ScorerVariant::Linear, default_weights());
        let cost = CostModel::new(
            CostWeights {
                w_echo: 1.0,
                w_tuner: 1.0,
                w_exp: 0.0,
            },
            0.5,
        );
        Fingerprint::new(&catalogue, &scorer, &cost, 50.0, false)
    }

    #[test]
    fn identical_requests_fingerprint_equal() {
        assert_eq!(fingerprint(), fingerprint());
    }

    #[test]
    fn cache_evicts_lru_beyond_capacity() {
        let cache = PolicyCache::new(1);
        let catalogue = default_catalogue();
        let scorer = Scorer::new(ScorerVariant::Linear, default_weights());
        let cost = CostModel::new(
            CostWeights {
                w_echo: 1.0,
                w_tuner: 1.0,
                w_exp: 0.0,
            },
            0.5,
        );
        let cancel = AtomicBool::new(false);

        let fp_a = Fingerprint::new(&catalogue, &scorer, &cost, 10.0, false);
        let policy_a = solve_policy(
            catalogue.clone(),
            scorer.clone(),
            cost,
            10.0,
            SearchParams::default(),
            &cancel,
        )
        .unwrap();
        cache.compute(fp_a.clone(), || Ok(policy_a)).unwrap();

        let fp_b = Fingerprint::new(&catalogue, &scorer, &cost, 20.0, false);
        let policy_b = solve_policy(
            catalogue.clone(),
            scorer.clone(),
            cost,
            20.0,
            SearchParams::default(),
            &cancel,
        )
        .unwrap();
        cache.compute(fp_b, || Ok(policy_b)).unwrap();

        assert!(cache.get(&fp_a).is_none(), "capacity-1 cache should have evicted the first entry");
    }
}
