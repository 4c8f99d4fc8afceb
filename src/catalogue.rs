use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

/// Number of buffs that can simultaneously occupy a finished artifact.
pub const MAX_SLOTS: usize = 5;

/// Number of discrete value tiers every buff's grid is given in the built-in catalogue.
///
/// This is a property of the default catalogue, not an invariant of the domain model: a
/// caller-supplied catalogue (see [`Catalogue::with_grids`]) may give each buff a different
/// number of tiers.
const DEFAULT_TIERS: usize = 6;

/// A sub-stat identifier. Stable across the lifetime of the process; the catalogue is loaded
/// once at startup and never mutated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Enum, EnumIter, Serialize, Deserialize)]
pub enum Buff {
    CritRate,
    CritDamage,
    AttackPercent,
    HealthPercent,
    DefensePercent,
    EnergyRegen,
    BasicAttackDamage,
    HeavyAttackDamage,
    SkillDamage,
    LiberationDamage,
    FlatAttack,
    FlatHealth,
    FlatDefense,
}

impl Buff {
    /// Display label; percent-valued buffs are rendered with the value divided by 10 and a "%"
    /// suffix by the host UI (out of scope here, §1) — this only supplies the name.
    pub fn label(&self) -> &'static str {
        match self {
            Buff::CritRate => "Crit Rate",
            Buff::CritDamage => "Crit DMG",
            Buff::AttackPercent => "ATK%",
            Buff::HealthPercent => "HP%",
            Buff::DefensePercent => "DEF%",
            Buff::EnergyRegen => "Energy Regen",
            Buff::BasicAttackDamage => "Basic Attack DMG",
            Buff::HeavyAttackDamage => "Heavy Attack DMG",
            Buff::SkillDamage => "Skill DMG",
            Buff::LiberationDamage => "Liberation DMG",
            Buff::FlatAttack => "ATK",
            Buff::FlatHealth => "HP",
            Buff::FlatDefense => "DEF",
        }
    }

    /// Whether this buff is displayed as a percentage (value / 10 then "%"). Display-only, per
    /// §3: it has no effect on scoring.
    pub fn is_percent(&self) -> bool {
        !matches!(self, Buff::FlatAttack | Buff::FlatHealth | Buff::FlatDefense)
    }

    /// Stable wire identifier (`buffTypes`/`buffNames` entries at the §6 boundary).
    pub fn tag(&self) -> &'static str {
        match self {
            Buff::CritRate => "critRate",
            Buff::CritDamage => "critDamage",
            Buff::AttackPercent => "attackPercent",
            Buff::HealthPercent => "healthPercent",
            Buff::DefensePercent => "defensePercent",
            Buff::EnergyRegen => "energyRegen",
            Buff::BasicAttackDamage => "basicAttackDamage",
            Buff::HeavyAttackDamage => "heavyAttackDamage",
            Buff::SkillDamage => "skillDamage",
            Buff::LiberationDamage => "liberationDamage",
            Buff::FlatAttack => "flatAttack",
            Buff::FlatHealth => "flatHealth",
            Buff::FlatDefense => "flatDefense",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        Buff::iter().find(|b| b.tag() == tag)
    }
}

/// A buff's discrete value grid: strictly increasing values `v_i` (stored on the spec's ×10
/// integer grid, §6) each with an empirical probability `p_i`, `Σ p_i == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueGrid {
    values: Vec<u32>,
    probabilities: Vec<f64>,
}

impl ValueGrid {
    /// Builds a grid from parallel `values`/`probabilities` slices. `values` must be strictly
    /// increasing and positive; `probabilities` must sum to 1 within 1e-9. This is only called
    /// with statically-known data in this crate (the built-in catalogue, or a caller-supplied
    /// catalogue validated by the caller) so it panics on violation rather than returning a
    /// `Result` — see the teacher's convention of reserving `.expect`/panics for invariants
    /// established at construction time, not for externally-supplied request data.
    pub fn new(values: &[u32], probabilities: &[f64]) -> Self {
        assert_eq!(values.len(), probabilities.len(), "grid arrays must be the same length");
        assert!(!values.is_empty(), "a value grid must have at least one tier");
        assert!(
            values.windows(2).all(|w| w[0] < w[1]),
            "grid values must be strictly increasing: {values:?}"
        );
        assert!(values[0] > 0, "grid values must be strictly positive: {values:?}");
        let total: f64 = probabilities.iter().sum();
        assert!(
            (total - 1.0).abs() < 1e-9,
            "grid probabilities must sum to 1, got {total}"
        );
        Self {
            values: values.to_vec(),
            probabilities: probabilities.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, idx: usize) -> u32 {
        self.values[idx]
    }

    pub fn probability(&self, idx: usize) -> f64 {
        self.probabilities[idx]
    }

    pub fn max_value(&self) -> u32 {
        *self.values.last().expect("grid is never empty, checked in ValueGrid::new")
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u32, f64)> + '_ {
        self.values
            .iter()
            .zip(self.probabilities.iter())
            .enumerate()
            .map(|(idx, (&v, &p))| (idx, v, p))
    }

    /// Additive blend of optional user-supplied empirical counts into this grid's frequency
    /// counts, renormalised. Per §4.1: merging happens on counts BEFORE normalisation, so a grid
    /// built from count totals `base_counts` blended with `extra_counts` is equivalent to a
    /// fresh grid over `base_counts[i] + extra_counts[i]`.
    pub fn blended(&self, base_counts: &[u64], extra_counts: &[u64]) -> ValueGrid {
        assert_eq!(base_counts.len(), self.values.len());
        assert_eq!(extra_counts.len(), self.values.len());
        let merged: Vec<u64> = base_counts
            .iter()
            .zip(extra_counts.iter())
            .map(|(&b, &e)| b + e)
            .collect();
        let total: u64 = merged.iter().sum();
        let probabilities: Vec<f64> = merged.iter().map(|&c| c as f64 / total as f64).collect();
        ValueGrid::new(&self.values, &probabilities)
    }
}

/// The full buff catalogue: one [`ValueGrid`] per [`Buff`], immutable after construction.
#[derive(Debug, Clone)]
pub struct Catalogue {
    grids: EnumMap<Buff, ValueGrid>,
}

impl Catalogue {
    pub fn with_grids(grids: EnumMap<Buff, ValueGrid>) -> Self {
        Self { grids }
    }

    pub fn grid(&self, buff: Buff) -> &ValueGrid {
        &self.grids[buff]
    }

    pub fn max_value(&self, buff: Buff) -> u32 {
        self.grids[buff].max_value()
    }

    pub fn buffs(&self) -> impl Iterator<Item = Buff> {
        use strum::IntoEnumIterator;
        Buff::iter()
    }

    pub fn buff_count(&self) -> usize {
        use strum::IntoEnumIterator;
        Buff::iter().count()
    }

    /// Applies §4.1's user-data blend: for every buff present in `extra_counts`, merges those
    /// empirical counts into the buff's grid (recovering a virtual base count from the grid's own
    /// probabilities, since the built-in catalogue only stores normalised frequencies) and
    /// returns a new catalogue with the blended grids. Buffs absent from `extra_counts` are
    /// copied unchanged.
    pub fn blended(&self, extra_counts: &std::collections::HashMap<Buff, Vec<u64>>) -> Catalogue {
        let grids = EnumMap::from_fn(|buff| match extra_counts.get(&buff) {
            Some(extra) => {
                let grid = &self.grids[buff];
                let base_counts: Vec<u64> = (0..grid.len())
                    .map(|i| (grid.probability(i) * BLEND_VIRTUAL_SAMPLE as f64).round() as u64)
                    .collect();
                grid.blended(&base_counts, extra)
            }
            None => self.grids[buff].clone(),
        });
        Catalogue::with_grids(grids)
    }
}

/// Virtual sample size used to recover integer base counts from the built-in catalogue's stored
/// probabilities when blending in user-supplied counts (§4.1). Large enough that rounding error
/// from the recovered base counts is negligible next to any realistic user sample.
const BLEND_VIRTUAL_SAMPLE: u64 = 1_000_000;

/// The built-in catalogue. Every buff is given a grid of [`DEFAULT_TIERS`] values shaped by the
/// same relative curve (`TIER_FRACTIONS` of the buff's max value) and the same empirical tier
/// weights (`TIER_WEIGHTS`, heavier at the low end — a low roll is more common than the max
/// roll) — only the per-buff maximum value and percent/flat display differ, matching how these
/// systems publish one empirical roll-frequency table shared across sub-stats.
const TIER_FRACTIONS: [f64; DEFAULT_TIERS] = [0.62, 0.69, 0.77, 0.85, 0.92, 1.00];
const TIER_WEIGHTS: [f64; DEFAULT_TIERS] = [0.32, 0.25, 0.18, 0.14, 0.08, 0.03];

fn default_grid(max_value: u32) -> ValueGrid {
    let values: Vec<u32> = TIER_FRACTIONS
        .iter()
        .map(|f| ((max_value as f64) * f).round() as u32)
        .collect();
    ValueGrid::new(&values, &TIER_WEIGHTS)
}

/// Per-buff maximum value on the ×10 integer grid (§6). Percent buffs' raw percentages are
/// implied by dividing by 10; flat buffs are raw stat points times 10.
fn default_max_value(buff: Buff) -> u32 {
    match buff {
        Buff::CritRate => 101,
        Buff::CritDamage => 202,
        Buff::AttackPercent => 126,
        Buff::HealthPercent => 126,
        Buff::DefensePercent => 158,
        Buff::EnergyRegen => 138,
        Buff::BasicAttackDamage => 126,
        Buff::HeavyAttackDamage => 126,
        Buff::SkillDamage => 126,
        Buff::LiberationDamage => 126,
        Buff::FlatAttack => 600,
        Buff::FlatHealth => 7200,
        Buff::FlatDefense => 920,
    }
}

/// Builds the built-in catalogue described in §2.1 / §10.1's `bootstrap()` contract.
pub fn default_catalogue() -> Catalogue {
    let grids = EnumMap::from_fn(|buff| default_grid(default_max_value(buff)));
    Catalogue::with_grids(grids)
}

/// Non-negative per-buff weights. Zero-weight buffs stay drawable (§3) but never contribute
/// score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weights(EnumMap<Buff, f64>);

impl Weights {
    pub fn new(weights: EnumMap<Buff, f64>) -> Self {
        Self(weights)
    }

    pub fn get(&self, buff: Buff) -> f64 {
        self.0[buff]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Buff, f64)> + '_ {
        self.0.iter().map(|(b, &w)| (b, w))
    }

    pub fn has_any_positive(&self) -> bool {
        self.0.values().any(|&w| w > 0.0)
    }

    pub fn has_negative(&self) -> bool {
        self.0.values().any(|&w| w < 0.0)
    }

    /// Sum of the top-`k` weights, used as the Linear scorer's normalisation constant `S`
    /// (§3, ScorerVariant).
    pub fn top_k_sum(&self, k: usize) -> f64 {
        let mut values: Vec<f64> = self.0.values().copied().collect();
        values.sort_by(|a, b| b.partial_cmp(a).expect("weights are never NaN, validated on input"));
        values.into_iter().take(k).sum()
    }
}

/// Default weight preset: every buff weighted equally. Matches §8 scenario S2.
pub fn default_weights() -> Weights {
    Weights::new(EnumMap::from_fn(|_| 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalogue_grids_sum_to_one() {
        let catalogue = default_catalogue();
        for buff in catalogue.buffs() {
            let grid = catalogue.grid(buff);
            let total: f64 = grid.iter().map(|(_, _, p)| p).sum();
            assert!((total - 1.0).abs() < 1e-9, "{buff:?} probabilities sum to {total}");
        }
    }

    #[test]
    fn default_catalogue_values_strictly_increasing_and_positive() {
        let catalogue = default_catalogue();
        for buff in catalogue.buffs() {
            let grid = catalogue.grid(buff);
            let values: Vec<u32> = grid.iter().map(|(_, v, _)| v).collect();
            assert!(values.windows(2).all(|w| w[0] < w[1]));
            assert!(values[0] > 0);
        }
    }

    #[test]
    fn default_catalogue_has_no_duplicate_buffs() {
        let catalogue = default_catalogue();
        let mut seen = std::collections::HashSet::new();
        for buff in catalogue.buffs() {
            assert!(seen.insert(buff), "duplicate buff {buff:?}");
        }
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn value_grid_rejects_non_increasing_values() {
        ValueGrid::new(&[10, 10], &[0.5, 0.5]);
    }

    #[test]
    #[should_panic(expected = "sum to 1")]
    fn value_grid_rejects_bad_probabilities() {
        ValueGrid::new(&[1, 2], &[0.5, 0.6]);
    }

    #[test]
    fn blended_grid_renormalises() {
        let grid = default_grid(100);
        let base_counts = [32, 25, 18, 14, 8, 3];
        let extra_counts = [0, 0, 0, 0, 0, 100];
        let blended = grid.blended(&base_counts, &extra_counts);
        let total: f64 = blended.iter().map(|(_, _, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
        // heavily weighted toward the max tier now
        assert!(blended.probability(5) > grid.probability(5));
    }

    #[test]
    fn catalogue_blend_only_touches_named_buffs() {
        let catalogue = default_catalogue();
        let mut extra = std::collections::HashMap::new();
        extra.insert(Buff::CritRate, vec![0, 0, 0, 0, 0, 1_000_000]);
        let blended = catalogue.blended(&extra);
        let total: f64 = blended.grid(Buff::CritRate).iter().map(|(_, _, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(blended.grid(Buff::CritRate).probability(5) > catalogue.grid(Buff::CritRate).probability(5));
        // untouched buff keeps the exact same grid
        assert_eq!(blended.grid(Buff::CritDamage).clone(), catalogue.grid(Buff::CritDamage).clone());
    }

    #[test]
    fn buff_tag_roundtrips() {
        for buff in default_catalogue().buffs() {
            assert_eq!(Buff::from_tag(buff.tag()), Some(buff));
        }
        assert_eq!(Buff::from_tag("nonsense"), None);
    }

    #[test]
    fn top_k_sum_uniform_weights() {
        let weights = default_weights();
        assert_eq!(weights.top_k_sum(MAX_SLOTS), MAX_SLOTS as f64);
    }
}
