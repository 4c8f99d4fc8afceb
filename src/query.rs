//! The external query surface (§6): `bootstrap`, `compute_policy`, `policy_suggestion`,
//! `compute_reroll_policy`, `query_reroll_recommendation`. Everything here takes and returns plain
//! owned, `serde`-derived data — no borrowed handles cross this boundary (§6: "so that a future
//! FFI or WASM binding can wrap them without change") — and is built on top of the internal
//! fingerprint/handle cache described in §4.6/§10.5.

use crate::cache::{self, Fingerprint, PolicyCache, SolvedPolicy};
use crate::catalogue::{self, Buff, Catalogue, Weights, MAX_SLOTS};
use crate::cost::{CostModel, CostWeights, REFUND_RATIO_RANGE};
use crate::error::EngineError;
use crate::lambda_search::SearchParams;
use crate::reroll::{self, RerollRequest, RerollRecommendation};
use crate::scorer::{Scorer, ScorerVariant};
use crate::state::EnhancementState;
use enum_map::EnumMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapInfo {
    pub buff_types: Vec<String>,
    pub buff_labels: Vec<String>,
    pub buff_type_max_values: Vec<u32>,
    pub buff_value_options: Vec<Vec<u32>>,
    pub max_selected_types: usize,
    pub default_buff_weights: HashMap<String, f64>,
    pub default_target_score: f64,
    pub default_exp_refund_ratio: f64,
    pub default_scorer_type: String,
    pub default_cost_weights: CostWeights,
}

/// `bootstrap()` from §6: the static catalogue shape and defaults a host UI needs to build its
/// buff picker and request defaults, without it having to know anything about the DP internals.
pub fn bootstrap() -> BootstrapInfo {
    let catalogue = catalogue::default_catalogue();
    let weights = catalogue::default_weights();
    let buffs: Vec<Buff> = catalogue.buffs().collect();
    BootstrapInfo {
        buff_types: buffs.iter().map(|b| b.tag().to_string()).collect(),
        buff_labels: buffs.iter().map(|b| b.label().to_string()).collect(),
        buff_type_max_values: buffs.iter().map(|&b| catalogue.max_value(b)).collect(),
        buff_value_options: buffs
            .iter()
            .map(|&b| (0..catalogue.grid(b).len()).map(|i| catalogue.grid(b).value(i)).collect())
            .collect(),
        max_selected_types: MAX_SLOTS,
        default_buff_weights: buffs.iter().map(|&b| (b.tag().to_string(), weights.get(b))).collect(),
        default_target_score: 60.0,
        default_exp_refund_ratio: 0.66,
        default_scorer_type: ScorerVariant::Linear.tag().to_string(),
        default_cost_weights: CostWeights {
            w_echo: 1.0,
            w_tuner: 1.0,
            w_exp: 0.01,
        },
    }
}

/// `compute_policy`/`compute_reroll_policy` request body (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub buff_weights: HashMap<String, f64>,
    pub target_score: f64,
    pub scorer_type: String,
    pub cost_weights: CostWeights,
    pub exp_refund_ratio: f64,
    #[serde(default)]
    pub blend_user_data: Option<HashMap<String, Vec<u64>>>,
    #[serde(default)]
    pub lambda_tolerance: Option<f64>,
    #[serde(default)]
    pub lambda_max_iter: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    pub lambda_star: f64,
    pub expected_cost_per_success: f64,
    pub success_probability: f64,
    pub echo_per_success: f64,
    pub tuner_per_success: f64,
    pub exp_per_success: f64,
    pub compute_seconds: f64,
    pub target_score: f64,
}

fn summarize(policy: &SolvedPolicy) -> PolicySummary {
    PolicySummary {
        lambda_star: policy.lambda_star,
        expected_cost_per_success: policy.lambda_star,
        success_probability: policy.success_probability,
        echo_per_success: policy.echo_per_success,
        tuner_per_success: policy.tuner_per_success,
        exp_per_success: policy.exp_per_success,
        compute_seconds: policy.compute_seconds,
        target_score: policy.target,
    }
}

/// Parses and validates a [`PolicyRequest`] into domain types, rejecting anything §7's
/// `InvalidInput` should reject before any solving starts.
fn build_request(
    request: &PolicyRequest,
) -> Result<(Catalogue, Scorer, CostModel, f64, bool), EngineError> {
    let variant = ScorerVariant::from_tag(&request.scorer_type)
        .ok_or_else(|| EngineError::invalid("scorerType", format!("unknown scorer type `{}`", request.scorer_type)))?;

    let mut weights_map: EnumMap<Buff, f64> = EnumMap::from_fn(|_| 0.0);
    for (tag, &weight) in &request.buff_weights {
        let buff = Buff::from_tag(tag).ok_or_else(|| EngineError::invalid("buffWeights", format!("unknown buff id `{tag}`")))?;
        if weight < 0.0 {
            return Err(EngineError::invalid("buffWeights", format!("weight for `{tag}` is negative")));
        }
        weights_map[buff] = weight;
    }
    let weights = Weights::new(weights_map);
    if !weights.has_any_positive() {
        return Err(EngineError::invalid("buffWeights", "at least one buff weight must be positive"));
    }

    if request.exp_refund_ratio < *REFUND_RATIO_RANGE.start() || request.exp_refund_ratio > *REFUND_RATIO_RANGE.end() {
        return Err(EngineError::invalid(
            "expRefundRatio",
            format!("must be within [{}, {}]", REFUND_RATIO_RANGE.start(), REFUND_RATIO_RANGE.end()),
        ));
    }
    for (field, value) in [
        ("costWeights.wEcho", request.cost_weights.w_echo),
        ("costWeights.wTuner", request.cost_weights.w_tuner),
        ("costWeights.wExp", request.cost_weights.w_exp),
    ] {
        if value < 0.0 {
            return Err(EngineError::invalid(field, "cost weights must be non-negative"));
        }
    }

    let blended = request.blend_user_data.is_some();
    let mut catalogue = catalogue::default_catalogue();
    if let Some(extra) = &request.blend_user_data {
        let mut by_buff = HashMap::new();
        for (tag, counts) in extra {
            let buff = Buff::from_tag(tag).ok_or_else(|| EngineError::invalid("blendUserData", format!("unknown buff id `{tag}`")))?;
            let expected_len = catalogue.grid(buff).len();
            if counts.len() != expected_len {
                return Err(EngineError::invalid(
                    "blendUserData",
                    format!("`{tag}` must supply {expected_len} counts (one per grid tier), got {}", counts.len()),
                ));
            }
            by_buff.insert(buff, counts.clone());
        }
        catalogue = catalogue.blended(&by_buff);
    }

    let scorer = Scorer::new(variant, weights);
    let max_target = scorer.variant().max_target(scorer.weights());
    if request.target_score < 0.0 || request.target_score > max_target + 1e-9 {
        return Err(EngineError::invalid(
            "targetScore",
            format!("must be within [0, {max_target}] for the `{}` scorer", variant.tag()),
        ));
    }

    let cost = CostModel::new(request.cost_weights, request.exp_refund_ratio);
    Ok((catalogue, scorer, cost, request.target_score, blended))
}

fn search_params(request: &PolicyRequest) -> SearchParams {
    let defaults = SearchParams::default();
    SearchParams {
        tolerance: request.lambda_tolerance.unwrap_or(defaults.tolerance),
        max_bisection_iters: request.lambda_max_iter.unwrap_or(defaults.max_bisection_iters),
        ..defaults
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub buff_names: Vec<String>,
    pub buff_values: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum Suggestion {
    Continue,
    Abandon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResponse {
    pub suggestion: Suggestion,
    pub stage: usize,
    pub success_probability: f64,
}

/// The engine is the process-local facade named in §6: it owns the policy cache plus "the
/// currently computed policy"/"the currently computed reroll policy" that `policy_suggestion` and
/// `query_reroll_recommendation` implicitly operate against (§6's surface never threads a handle
/// through those calls, unlike the internal cache API in §4.6).
pub struct Engine {
    cache: PolicyCache,
    current_policy: Mutex<Option<Arc<SolvedPolicy>>>,
    reroll_policy: Mutex<Option<Arc<SolvedPolicy>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            cache: PolicyCache::new(cache::DEFAULT_CAPACITY),
            current_policy: Mutex::new(None),
            reroll_policy: Mutex::new(None),
        }
    }

    pub fn bootstrap(&self) -> BootstrapInfo {
        bootstrap()
    }

    pub fn compute_policy(&self, request: &PolicyRequest, cancel: &AtomicBool) -> Result<PolicySummary, EngineError> {
        let policy = self.resolve(request, cancel)?;
        let summary = summarize(&policy);
        log::info!(
            "compute_policy: lambda*={} states={} elapsed={:.3}s",
            policy.lambda_star,
            policy.table.state_count(),
            policy.compute_seconds
        );
        *self.current_policy.lock().expect("current policy mutex poisoned") = Some(policy);
        Ok(summary)
    }

    pub fn policy_suggestion(&self, request: &SuggestionRequest) -> Result<SuggestionResponse, EngineError> {
        let policy = self
            .current_policy
            .lock()
            .expect("current policy mutex poisoned")
            .clone()
            .ok_or(EngineError::NotReady)?;
        if request.buff_names.len() != request.buff_values.len() {
            return Err(EngineError::invalid("buffValues", "buffNames and buffValues must be the same length"));
        }
        let mut pairs = Vec::with_capacity(request.buff_names.len());
        for (name, &value) in request.buff_names.iter().zip(&request.buff_values) {
            let buff = Buff::from_tag(name).ok_or_else(|| EngineError::invalid("buffNames", format!("unknown buff id `{name}`")))?;
            let grid = policy.catalogue.grid(buff);
            let idx = (0..grid.len())
                .find(|&i| grid.value(i) == value)
                .ok_or_else(|| EngineError::invalid("buffValues", format!("value {value} is not on `{name}`'s grid")))?;
            pairs.push((buff, idx as u8));
        }
        let state = EnhancementState::from_pairs(&pairs, &policy.catalogue, &policy.scorer)
            .map_err(|e| EngineError::invalid("buffNames", e.to_string()))?;
        let entry = policy
            .table
            .entry(&state)
            .ok_or_else(|| EngineError::invalid("buffNames", "this reveal combination was never reached by the solved policy"))?;
        let suggestion = match entry.decision {
            crate::dp::Decision::Continue => Suggestion::Continue,
            crate::dp::Decision::Abandon => Suggestion::Abandon,
        };
        Ok(SuggestionResponse {
            suggestion,
            stage: state.stage(),
            success_probability: entry.success_probability,
        })
    }

    pub fn compute_reroll_policy(&self, request: &PolicyRequest, cancel: &AtomicBool) -> Result<(), EngineError> {
        let policy = self.resolve(request, cancel)?;
        *self.reroll_policy.lock().expect("reroll policy mutex poisoned") = Some(policy);
        Ok(())
    }

    pub fn query_reroll_recommendation(&self, request: &RerollRequest, cancel: &AtomicBool) -> Result<RerollRecommendation, EngineError> {
        let policy = self
            .reroll_policy
            .lock()
            .expect("reroll policy mutex poisoned")
            .clone()
            .ok_or(EngineError::NotReady)?;
        reroll::recommend(&policy, request, cancel)
    }

    fn resolve(&self, request: &PolicyRequest, cancel: &AtomicBool) -> Result<Arc<SolvedPolicy>, EngineError> {
        let (catalogue, scorer, cost, target, blended) = build_request(request)?;
        let fingerprint = Fingerprint::new(&catalogue, &scorer, &cost, target, blended);
        let params = search_params(request);
        self.cache
            .compute(fingerprint, || cache::solve_policy(catalogue, scorer, cost, target, params, cancel))
    }
}
