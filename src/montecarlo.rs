//! The optional Monte-Carlo validator (§4.8): replays a solved policy with a seeded RNG to
//! cross-check `successProbability`/`expectedCostPerSuccess` against independent simulation. Never
//! fails a `compute_policy` call (§10.4) — callers run this afterward, on demand, as a sanity
//! check, not as part of the solve path.

use crate::cache::SolvedPolicy;
use crate::dp::Decision;
use crate::state::{draw_outcomes, EnhancementState};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy)]
pub struct MonteCarloReport {
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub mean_cost_per_success: f64,
}

/// Runs `attempts` independent simulated playthroughs of `policy`'s decisions, seeded so the run
/// is reproducible. Each attempt draws slots per §4.3, follows the cached `decision(state)`, and
/// accumulates cost (including the abandon refund) whether or not it ends in success.
pub fn validate(policy: &SolvedPolicy, attempts: u64, seed: u64) -> MonteCarloReport {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut successes: u64 = 0;
    let mut total_cost = 0.0_f64;

    for _ in 0..attempts {
        let (cost, succeeded) = simulate_one(policy, &mut rng);
        total_cost += cost;
        if succeeded {
            successes += 1;
        }
    }

    let success_rate = successes as f64 / attempts as f64;
    let mean_cost_per_success = if successes > 0 {
        total_cost / successes as f64
    } else {
        f64::INFINITY
    };

    MonteCarloReport {
        attempts,
        successes,
        success_rate,
        mean_cost_per_success,
    }
}

fn simulate_one(policy: &SolvedPolicy, rng: &mut SmallRng) -> (f64, bool) {
    let mut state = EnhancementState::empty();
    let mut cost = 0.0_f64;
    loop {
        let decision = policy
            .table
            .entry(&state)
            .map(|e| e.decision)
            .unwrap_or(Decision::Abandon);

        if state.is_terminal() {
            return (cost, state.succeeds(policy.target));
        }
        if decision == Decision::Abandon {
            cost += policy.cost.abandon_value(state.stage());
            return (cost, false);
        }

        let outcomes = draw_outcomes(&state, &policy.catalogue, &policy.scorer);
        let roll: f64 = rng.r#gen();
        let mut cumulative = 0.0;
        let mut next = outcomes.last().expect("a non-terminal state always has at least one draw outcome");
        for outcome in &outcomes {
            cumulative += outcome.probability;
            if roll <= cumulative {
                next = outcome;
                break;
            }
        }
        cost += policy.cost.reveal_cost(state.stage() + 1);
        state = next.child.clone();
    }
}
