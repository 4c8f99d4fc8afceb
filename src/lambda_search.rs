//! The outer λ-search (§4.5): a bracket-then-bisect root find over `f(lambda) = V_lambda(s0)`,
//! converging to the λ* where `f(lambda*) == 0` — the expected cost per success. Each trial λ gets
//! its own fresh memo (§9: "implementations must not share mutable DP scratch state across
//! distinct lambda evaluations, since V_lambda's shape changes with lambda").

use crate::dp::{self, DpContext, PolicyTable};
use crate::error::EngineError;
use log::debug;
use std::sync::atomic::AtomicBool;

/// λ-search tuning knobs (§4.5). Defaults match the spec's suggested starting point and
/// tolerances; a caller who wants tighter convergence can override via `SolveRequest` (§10.1).
#[derive(Debug, Copy, Clone)]
pub struct SearchParams {
    pub initial_lambda: f64,
    pub lambda_ceiling: f64,
    pub tolerance: f64,
    pub max_bisection_iters: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            initial_lambda: 1.0,
            lambda_ceiling: 1e12,
            tolerance: 1e-6,
            max_bisection_iters: 200,
        }
    }
}

/// The converged policy: λ*, the full table it was computed from, and the bracket the bisection
/// converged within (useful for diagnostics and for `Solution::residual`).
pub struct Solution {
    pub lambda: f64,
    pub table: PolicyTable,
    pub residual: f64,
}

/// Runs the bracket-then-bisect search described in §4.5 and returns the converged policy at
/// `ctx.target`. `ctx.target` must already be validated against `scorer.max_target` by the caller
/// (§6/§10.1) — this function only ever evaluates `V_lambda`, it does not re-validate the target.
pub fn solve(ctx: &DpContext, params: SearchParams, cancel: &AtomicBool) -> Result<Solution, EngineError> {
    // f(lambda) = V_lambda(s0) is continuous and non-increasing in lambda, and f(lambda) -> -inf
    // as lambda -> inf (raising the success reward's weight only ever makes every success path
    // more negative; see dp.rs's terminal rule). So f(0) sits at or above the root and bracketing
    // by doubling is sound: start at a small lambda (f >= 0 typically) and double until f <= 0 or
    // we hit the ceiling.
    let mut lo = 0.0_f64;
    let mut f_lo = evaluate_root(lo, ctx, cancel)?;
    if f_lo < 0.0 {
        // V_0(s0) is always >= 0 (abandon_value(0) == 0 is the floor Continue competes against at
        // lambda = 0, per cost.rs's no-op resolution), so a negative value here means f is not
        // behaving as the non-increasing function the bracket/bisect below assumes.
        return Err(EngineError::numeric(lo, "V_0(s0) is negative; lambda search cannot bracket a root"));
    }

    let mut hi = params.initial_lambda.max(f64::MIN_POSITIVE);
    let mut f_hi = evaluate_root(hi, ctx, cancel)?;
    while f_hi > 0.0 {
        if hi >= params.lambda_ceiling {
            return Err(EngineError::unreachable_target(ctx.target, params.lambda_ceiling));
        }
        lo = hi;
        f_lo = f_hi;
        hi = (hi * 2.0).min(params.lambda_ceiling);
        f_hi = evaluate_root(hi, ctx, cancel)?;
        debug!("lambda_search: doubled bracket to [{lo}, {hi}] (f_hi={f_hi})");
    }

    let mut iters = 0;
    let (lambda, residual) = loop {
        let mid = lo + (hi - lo) / 2.0;
        let f_mid = evaluate_root(mid, ctx, cancel)?;
        debug!("lambda_search: bisect iter {iters} lambda={mid} f={f_mid}");
        if f_mid.abs() <= params.tolerance || iters >= params.max_bisection_iters {
            break (mid, f_mid);
        }
        if f_mid > 0.0 {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
            f_hi = f_mid;
        }
        iters += 1;
    };
    let _ = (f_lo, f_hi);

    let table = dp::evaluate(lambda, ctx, cancel)?;
    Ok(Solution { lambda, table, residual })
}

fn evaluate_root(lambda: f64, ctx: &DpContext, cancel: &AtomicBool) -> Result<f64, EngineError> {
    let table = dp::evaluate(lambda, ctx, cancel)?;
    Ok(table.root_entry().value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{default_catalogue, default_weights};
    use crate::cost::{CostModel, CostWeights};
    use crate::scorer::{Scorer, ScorerVariant};

    #[test]
    fn converges_to_a_root_within_tolerance() {
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
        let ctx = DpContext {
            catalogue: &catalogue,
            scorer: &scorer,
            cost: &cost,
            target: 50.0,
        };
        let cancel = AtomicBool::new(false);
        let solution = solve(&ctx, SearchParams::default(), &cancel).unwrap();
        assert!(solution.lambda > 0.0);
        assert!(solution.residual.abs() <= SearchParams::default().tolerance + 1e-6);
    }

    #[test]
    fn impossibly_high_target_is_unreachable() {
        let catalogue = default_catalogue();
        let scorer = Scorer::new(ScorerVariant::Fixed, default_weights());
        let cost = CostModel::new(
            CostWeights {
                w_echo: 1.0,
                w_tuner: 1.0,
                w_exp: 1.0,
            },
            0.0,
        );
        let ctx = DpContext {
            catalogue: &catalogue,
            scorer: &scorer,
            cost: &cost,
            target: scorer.best_possible_score(&catalogue) + 1.0,
        };
        let cancel = AtomicBool::new(false);
        let params = SearchParams {
            lambda_ceiling: 1e4,
            ..SearchParams::default()
        };
        let result = solve(&ctx, params, &cancel);
        assert!(matches!(result, Err(EngineError::UnreachableTarget { .. })));
    }
}
