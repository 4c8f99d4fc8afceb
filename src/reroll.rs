//! The reroll solver (§4.7): given a finished baseline artifact and an optional candidate, ranks
//! every admissible lock-set by expected cost under the cached policy and, when the candidate is
//! fully specified, decides whether to accept it over rerolling the baseline.
//!
//! Reuses [`crate::dp::solve_from`] to evaluate `V_lambda` from each lock-set's seed state instead
//! of duplicating the Bellman recursion (§9).

use crate::cache::SolvedPolicy;
use crate::catalogue::{Buff, MAX_SLOTS};
use crate::dp::{self, DpContext};
use crate::error::EngineError;
use crate::state::EnhancementState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffPick {
    pub buff: String,
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerollRequest {
    /// Exactly [`MAX_SLOTS`] picks, in the artifact's own slot order (slot index = position + 1).
    pub baseline_buffs: Vec<BuffPick>,
    /// 0 to [`MAX_SLOTS`] picks. Fewer than [`MAX_SLOTS`] means "no candidate yet" (§4.7).
    pub candidate_buffs: Vec<BuffPick>,
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockChoice {
    pub lock_slot_indices: Vec<usize>,
    pub expected_cost: f64,
    pub success_probability: f64,
    pub regret: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerollRecommendation {
    pub valid: bool,
    pub reason: Option<String>,
    pub baseline_score: f64,
    pub candidate_score: Option<f64>,
    pub accept_candidate: Option<bool>,
    pub recommended_lock_choices: Vec<LockChoice>,
}

fn invalid(reason: impl Into<String>) -> RerollRecommendation {
    RerollRecommendation {
        valid: false,
        reason: Some(reason.into()),
        baseline_score: 0.0,
        candidate_score: None,
        accept_candidate: None,
        recommended_lock_choices: Vec::new(),
    }
}

fn resolve_picks(picks: &[BuffPick], ctx: &DpContext) -> Result<Vec<(Buff, u8)>, EngineError> {
    let mut pairs = Vec::with_capacity(picks.len());
    for pick in picks {
        let buff = Buff::from_tag(&pick.buff).ok_or_else(|| EngineError::invalid("buffNames", format!("unknown buff id `{}`", pick.buff)))?;
        let grid = ctx.catalogue.grid(buff);
        let idx = (0..grid.len())
            .find(|&i| grid.value(i) == pick.value)
            .ok_or_else(|| EngineError::invalid("buffValues", format!("value {} is not on `{}`'s grid", pick.value, pick.buff)))?;
        pairs.push((buff, idx as u8));
    }
    Ok(pairs)
}

/// Fixed cost booked for entering a reroll with `remaining` slots left to redraw: the one echo
/// draw a fresh attempt would have spent (§9 open question: the spec names "a fixed reroll cost"
/// without pinning a constant; this crate reuses the cost model's echo price for that role, and
/// books nothing when there's nothing left to redraw).
fn fixed_reroll_cost(remaining: usize, ctx: &DpContext) -> f64 {
    if remaining == 0 {
        0.0
    } else {
        ctx.cost.weights.w_echo
    }
}

pub fn recommend(policy: &SolvedPolicy, request: &RerollRequest, cancel: &AtomicBool) -> Result<RerollRecommendation, EngineError> {
    if request.baseline_buffs.len() != MAX_SLOTS {
        return Ok(invalid(format!("baseline must specify exactly {MAX_SLOTS} buffs")));
    }

    let ctx = DpContext {
        catalogue: &policy.catalogue,
        scorer: &policy.scorer,
        cost: &policy.cost,
        target: policy.target,
    };

    let baseline_pairs = resolve_picks(&request.baseline_buffs, &ctx)?;
    let baseline_state = match EnhancementState::from_pairs(&baseline_pairs, &policy.catalogue, &policy.scorer) {
        Ok(state) => state,
        Err(dup) => return Ok(invalid(dup.to_string())),
    };
    let baseline_score = baseline_state.score();

    let candidate_score = if request.candidate_buffs.len() == MAX_SLOTS {
        let candidate_pairs = resolve_picks(&request.candidate_buffs, &ctx)?;
        match EnhancementState::from_pairs(&candidate_pairs, &policy.catalogue, &policy.scorer) {
            Ok(state) => Some(state.score()),
            Err(dup) => return Ok(invalid(dup.to_string())),
        }
    } else {
        None
    };

    let mut choices = Vec::with_capacity(1 << MAX_SLOTS);
    for mask in 0u32..(1 << MAX_SLOTS) {
        let locked_indices: Vec<usize> = (0..MAX_SLOTS).filter(|&bit| mask & (1 << bit) != 0).collect();
        let locked_pairs: Vec<(Buff, u8)> = locked_indices.iter().map(|&i| baseline_pairs[i]).collect();
        let seed = EnhancementState::from_pairs(&locked_pairs, &policy.catalogue, &policy.scorer)
            .expect("locked subset of a duplicate-free baseline is itself duplicate-free");
        let remaining = MAX_SLOTS - locked_indices.len();
        let seed_table = dp::solve_from(seed, policy.lambda_star, &ctx, cancel)?;
        let root = seed_table.root_entry();
        let expected_cost = fixed_reroll_cost(remaining, &ctx) + root.value;
        choices.push((
            locked_indices.iter().map(|&i| i + 1).collect::<Vec<usize>>(),
            expected_cost,
            root.success_probability,
        ));
    }

    choices.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("expected costs are never NaN"));
    let best_cost = choices[0].1;
    let full_lock_cost = choices
        .iter()
        .find(|(indices, _, _)| indices.len() == MAX_SLOTS)
        .map(|(_, cost, _)| *cost)
        .expect("the full lock-set {1..=5} is always enumerated");

    let top_k = if request.top_k == 0 { choices.len() } else { request.top_k.min(choices.len()) };
    let recommended_lock_choices = choices[..top_k]
        .iter()
        .map(|(indices, cost, success)| LockChoice {
            lock_slot_indices: indices.clone(),
            expected_cost: *cost,
            success_probability: *success,
            regret: cost - best_cost,
        })
        .collect();

    // Rerolling helps iff some lock-set beats keeping the baseline as-is; accepting the candidate
    // also requires the candidate to score at least as well as the baseline (§4.7).
    let rerolling_does_not_help = best_cost >= full_lock_cost - 1e-9;
    let accept_candidate = candidate_score.map(|score| score >= baseline_score && rerolling_does_not_help);

    Ok(RerollRecommendation {
        valid: true,
        reason: None,
        baseline_score,
        candidate_score,
        accept_candidate,
        recommended_lock_choices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::solve_policy;
    use crate::catalogue::{default_catalogue, default_weights};
    use crate::cost::{CostModel, CostWeights};
    use crate::lambda_search::SearchParams;
    use crate::scorer::{Scorer, ScorerVariant};

    fn solved(target: f64) -> SolvedPolicy {
        let catalogue = default_catalogue();
        let scorer = Scorer::new(ScorerVariant::Linear, default_weights());
        let cost = CostModel::new(
            CostWeights {
                w_echo: 1.0,
                w_tuner: 1.0,
                w_exp: 0.01,
            },
            0.66,
        );
        let cancel = AtomicBool::new(false);
        solve_policy(catalogue, scorer, cost, target, SearchParams::default(), &cancel).unwrap()
    }

    fn top_picks(policy: &SolvedPolicy, count: usize) -> Vec<BuffPick> {
        policy
            .catalogue
            .buffs()
            .take(count)
            .map(|b| BuffPick {
                buff: b.tag().to_string(),
                value: policy.catalogue.max_value(b),
            })
            .collect()
    }

    #[test]
    fn malformed_baseline_is_reported_invalid_not_errored() {
        let policy = solved(50.0);
        let cancel = AtomicBool::new(false);
        let request = RerollRequest {
            baseline_buffs: top_picks(&policy, 3),
            candidate_buffs: vec![],
            top_k: 5,
        };
        let result = recommend(&policy, &request, &cancel).unwrap();
        assert!(!result.valid);
        assert!(result.reason.is_some());
    }

    #[test]
    fn full_lock_is_always_among_the_ranked_choices() {
        let policy = solved(50.0);
        let cancel = AtomicBool::new(false);
        let request = RerollRequest {
            baseline_buffs: top_picks(&policy, MAX_SLOTS),
            candidate_buffs: vec![],
            top_k: 0,
        };
        let result = recommend(&policy, &request, &cancel).unwrap();
        assert!(result.valid);
        assert!(result
            .recommended_lock_choices
            .iter()
            .any(|c| c.lock_slot_indices.len() == MAX_SLOTS));
        assert_eq!(result.recommended_lock_choices[0].regret, 0.0);
        assert!(result.accept_candidate.is_none());
    }

    #[test]
    fn ranked_choices_are_sorted_by_expected_cost() {
        let policy = solved(50.0);
        let cancel = AtomicBool::new(false);
        let request = RerollRequest {
            baseline_buffs: top_picks(&policy, MAX_SLOTS),
            candidate_buffs: vec![],
            top_k: 0,
        };
        let result = recommend(&policy, &request, &cancel).unwrap();
        let costs: Vec<f64> = result.recommended_lock_choices.iter().map(|c| c.expected_cost).collect();
        assert!(costs.windows(2).all(|w| w[0] <= w[1] + 1e-9));
        for choice in &result.recommended_lock_choices {
            let mut sorted = choice.lock_slot_indices.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, choice.lock_slot_indices);
            assert!(sorted.iter().all(|&i| (1..=MAX_SLOTS).contains(&i)));
        }
    }

    #[test]
    fn full_candidate_as_good_as_baseline_is_accepted_when_reroll_does_not_help() {
        let policy = solved(0.0); // trivially reachable target: every artifact already succeeds
        let cancel = AtomicBool::new(false);
        let baseline = top_picks(&policy, MAX_SLOTS);
        let candidate = baseline.clone();
        let request = RerollRequest {
            baseline_buffs: baseline,
            candidate_buffs: candidate,
            top_k: 0,
        };
        let result = recommend(&policy, &request, &cancel).unwrap();
        assert_eq!(result.accept_candidate, Some(true));
    }
}
