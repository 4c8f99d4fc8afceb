//! The two interchangeable scoring functions named in §3 (`ScorerVariant`). Both share the same
//! `score(buff, value)` interface so the DP and the reroll solver never need to know which one
//! is in play.

use crate::catalogue::{Buff, Catalogue, Weights, MAX_SLOTS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ScorerVariant {
    Linear,
    Fixed,
}

impl ScorerVariant {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "linear" => Some(ScorerVariant::Linear),
            "fixed" => Some(ScorerVariant::Fixed),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ScorerVariant::Linear => "linear",
            ScorerVariant::Fixed => "fixed",
        }
    }

    /// The upper bound a fully-maxed artifact can reach under this variant, used to bound
    /// `targetScore` on the public boundary (§6): `[0, 100]` for Linear, `[0, S]` for Fixed.
    pub fn max_target(&self, weights: &Weights) -> f64 {
        match self {
            ScorerVariant::Linear => 100.0,
            ScorerVariant::Fixed => weights.top_k_sum(MAX_SLOTS),
        }
    }
}

/// Bundles a variant with the weight vector and normalisation constant it needs, so
/// `score_value` doesn't recompute `S` (the Linear scorer's top-K weight sum) on every call.
#[derive(Debug, Clone)]
pub struct Scorer {
    variant: ScorerVariant,
    weights: Weights,
    /// Sum of the top-`MAX_SLOTS` weights; the Linear scorer's normalisation constant `S`.
    top_k_sum: f64,
}

impl Scorer {
    pub fn new(variant: ScorerVariant, weights: Weights) -> Self {
        let top_k_sum = weights.top_k_sum(MAX_SLOTS);
        Self {
            variant,
            weights,
            top_k_sum,
        }
    }

    pub fn variant(&self) -> ScorerVariant {
        self.variant
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// `score(b, v)` from §3: `100·w_b·v / (S·M_b)` for Linear, `w_b` for Fixed.
    pub fn score_value(&self, catalogue: &Catalogue, buff: Buff, value: u32) -> f64 {
        let w = self.weights.get(buff);
        match self.variant {
            ScorerVariant::Linear => {
                if self.top_k_sum <= 0.0 || w <= 0.0 {
                    return 0.0;
                }
                let max_value = catalogue.max_value(buff) as f64;
                100.0 * w * (value as f64) / (self.top_k_sum * max_value)
            }
            ScorerVariant::Fixed => w,
        }
    }

    /// Score of the theoretically best-possible artifact: the top-`MAX_SLOTS` weighted buffs,
    /// each rolled to its maximum value. Used to check §8 (P3): for Linear this must equal 100
    /// within 1e-9.
    pub fn best_possible_score(&self, catalogue: &Catalogue) -> f64 {
        let mut per_buff: Vec<(Buff, f64)> = self
            .weights
            .iter()
            .map(|(b, w)| (b, w))
            .collect();
        per_buff.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("weights are never NaN"));
        per_buff
            .into_iter()
            .take(MAX_SLOTS)
            .map(|(b, _)| self.score_value(catalogue, b, catalogue.max_value(b)))
            .sum()
    }
}
