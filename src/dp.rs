//! The inner DP evaluator (§4.4): given λ, computes `V_λ` and `decision` over every reachable
//! [`EnhancementState`], expressed as one memoised top-down recursion rather than the teacher's
//! explicit backward sweep (`dice_dp` in `lib.rs`). A top-down recursion is equivalent to a
//! backward topological sweep here (children are always solved before their parent returns) but
//! lets §9's "evaluate from seed" requirement — the reroll solver needs `V_λ` from an arbitrary
//! partially-revealed state, not just from the empty state — fall out of the same function
//! instead of a second traversal.

use crate::catalogue::{Catalogue, MAX_SLOTS};
use crate::cost::CostModel;
use crate::error::EngineError;
use crate::scorer::Scorer;
use crate::state::{draw_outcomes, EnhancementState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Decision {
    Continue,
    Abandon,
}

#[derive(Debug, Copy, Clone)]
pub struct StateEntry {
    pub value: f64,
    pub decision: Decision,
    pub success_probability: f64,
}

/// Everything the recursion needs that doesn't change across states: the catalogue, the scorer
/// (weights + variant), the cost model, and the target score in the scorer's own units.
pub struct DpContext<'a> {
    pub catalogue: &'a Catalogue,
    pub scorer: &'a Scorer,
    pub cost: &'a CostModel,
    pub target: f64,
}

/// The memoised value/decision/success-probability table produced by one `evaluate*` call, rooted
/// at whichever state the call started from (the empty state for a full solve, a partially
/// revealed seed for a reroll lock-set).
pub struct PolicyTable {
    entries: HashMap<EnhancementState, StateEntry>,
    root: EnhancementState,
}

impl PolicyTable {
    pub fn root_entry(&self) -> StateEntry {
        *self
            .entries
            .get(&self.root)
            .expect("root is always inserted by the recursion that built this table")
    }

    pub fn entry(&self, state: &EnhancementState) -> Option<StateEntry> {
        self.entries.get(state).copied()
    }

    pub fn state_count(&self) -> usize {
        self.entries.len()
    }
}

/// Builds the full policy table rooted at the empty state (`s0` in §4.4).
pub fn evaluate(lambda: f64, ctx: &DpContext, cancel: &AtomicBool) -> Result<PolicyTable, EngineError> {
    solve_from(EnhancementState::empty(), lambda, ctx, cancel)
}

/// Builds a policy table rooted at `seed`, an arbitrary (possibly partially revealed) state. Used
/// by the reroll solver (§4.7, §9) to evaluate `V_λ` after merging a lock-set's locked pairs into
/// an otherwise-empty artifact, without duplicating the Bellman recursion.
pub fn solve_from(
    seed: EnhancementState,
    lambda: f64,
    ctx: &DpContext,
    cancel: &AtomicBool,
) -> Result<PolicyTable, EngineError> {
    let mut entries = HashMap::new();
    evaluate_state(seed.clone(), lambda, ctx, &mut entries, cancel)?;
    Ok(PolicyTable { entries, root: seed })
}

fn evaluate_state(
    state: EnhancementState,
    lambda: f64,
    ctx: &DpContext,
    memo: &mut HashMap<EnhancementState, StateEntry>,
    cancel: &AtomicBool,
) -> Result<StateEntry, EngineError> {
    if let Some(&entry) = memo.get(&state) {
        return Ok(entry);
    }
    if cancel.load(Ordering::Relaxed) {
        return Err(EngineError::Cancelled);
    }

    let n = state.stage();
    let entry = if state.is_terminal() {
        let success = state.succeeds(ctx.target);
        StateEntry {
            value: if success { -lambda } else { 0.0 },
            decision: Decision::Continue,
            success_probability: if success { 1.0 } else { 0.0 },
        }
    } else {
        let q_abandon = ctx.cost.abandon_value(n);
        let remaining = MAX_SLOTS - n;
        if state.score() + upper_bound_remaining(&state, ctx, remaining) + 1e-9 < ctx.target {
            // Hopeless: no continuation can reach target, so Continue can never beat Abandon.
            // Pruned per §4.4 — required for latency, not for correctness.
            StateEntry {
                value: q_abandon,
                decision: Decision::Abandon,
                success_probability: 0.0,
            }
        } else {
            let outcomes = draw_outcomes(&state, ctx.catalogue, ctx.scorer);
            let mut expected_value = 0.0;
            let mut expected_success = 0.0;
            for outcome in outcomes {
                let child = evaluate_state(outcome.child, lambda, ctx, memo, cancel)?;
                expected_value += outcome.probability * child.value;
                expected_success += outcome.probability * child.success_probability;
            }
            let q_continue = ctx.cost.reveal_cost(n + 1) + expected_value;
            if !q_continue.is_finite() {
                return Err(EngineError::numeric(
                    lambda,
                    format!("Q_continue is not finite at stage {n}"),
                ));
            }
            // Exact ties prefer Abandon (§4.4: "defensive: avoids pathological loops").
            if q_continue < q_abandon {
                StateEntry {
                    value: q_continue,
                    decision: Decision::Continue,
                    success_probability: expected_success,
                }
            } else {
                StateEntry {
                    value: q_abandon,
                    decision: Decision::Abandon,
                    success_probability: 0.0,
                }
            }
        }
    };

    if !entry.value.is_finite() {
        return Err(EngineError::numeric(lambda, "V_lambda evaluated to a non-finite value"));
    }
    memo.insert(state, entry);
    Ok(entry)
}

/// Resource-axis decomposition (§4.5): re-evaluates total expected cost along the SAME decisions
/// already recorded in `table`, but priced by `axis_cost` instead of the cost model the table was
/// solved with. Calling this once per axis (only one of `w_echo`/`w_tuner`/`w_exp` nonzero) yields
/// the expected echo/tuner/exp consumption of the cached policy without re-running λ-search.
pub fn tally_resource(
    table: &PolicyTable,
    axis_cost: &CostModel,
    catalogue: &Catalogue,
    scorer: &Scorer,
    cancel: &AtomicBool,
) -> Result<f64, EngineError> {
    let mut memo = HashMap::new();
    tally_state(table, EnhancementState::empty(), axis_cost, catalogue, scorer, &mut memo, cancel)
}

fn tally_state(
    table: &PolicyTable,
    state: EnhancementState,
    axis_cost: &CostModel,
    catalogue: &Catalogue,
    scorer: &Scorer,
    memo: &mut HashMap<EnhancementState, f64>,
    cancel: &AtomicBool,
) -> Result<f64, EngineError> {
    if let Some(&value) = memo.get(&state) {
        return Ok(value);
    }
    if cancel.load(Ordering::Relaxed) {
        return Err(EngineError::Cancelled);
    }
    let entry = table
        .entry(&state)
        .ok_or_else(|| EngineError::numeric(0.0, "state missing from policy table during resource tally"))?;
    let n = state.stage();
    let value = if state.is_terminal() {
        0.0
    } else {
        match entry.decision {
            Decision::Abandon => axis_cost.abandon_value(n),
            Decision::Continue => {
                let outcomes = draw_outcomes(&state, catalogue, scorer);
                let mut expected = 0.0;
                for outcome in outcomes {
                    let child = tally_state(table, outcome.child, axis_cost, catalogue, scorer, memo, cancel)?;
                    expected += outcome.probability * child;
                }
                axis_cost.reveal_cost(n + 1) + expected
            }
        }
    };
    memo.insert(state, value);
    Ok(value)
}

/// Upper bound on the score attainable from `state` by drawing `remaining` more slots: the sum of
/// the `remaining` largest max-value scores among buffs not yet revealed (§4.4 pruning rule).
fn upper_bound_remaining(state: &EnhancementState, ctx: &DpContext, remaining: usize) -> f64 {
    if remaining == 0 {
        return 0.0;
    }
    let mut best: Vec<f64> = ctx
        .catalogue
        .buffs()
        .filter(|b| !state.is_revealed(*b))
        .map(|b| ctx.scorer.score_value(ctx.catalogue, b, ctx.catalogue.max_value(b)))
        .collect();
    best.sort_by(|a, b| b.partial_cmp(a).expect("scores are always finite"));
    best.into_iter().take(remaining).sum()
}
