//! The canonical [`EnhancementState`] (§3) and the draw rule that advances it (§4.3).
//!
//! An important simplification, spelled out in SPEC_FULL.md §3's canonicalisation note: because
//! the draw rule is exchangeable (it never depends on reveal order, only on the *set* of already
//! revealed buffs) and score is a plain sum over revealed pairs, two reveal sequences that reach
//! the same set of (buff, value) pairs are indistinguishable to the DP. `EnhancementState`
//! therefore keeps its revealed pairs sorted by buff so that equal states hash and compare equal
//! regardless of the order they were revealed in; "stage" (reveal count) is derived, not stored.

use crate::catalogue::{Buff, Catalogue, MAX_SLOTS};
use crate::scorer::Scorer;
use std::hash::{Hash, Hasher};

/// One revealed (buff, value) pair. `value_idx` indexes into that buff's [`ValueGrid`], not the
/// raw value, so states stay comparable without needing the catalogue in scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Reveal {
    pub buff: Buff,
    pub value_idx: u8,
}

/// A point in the enhancement process: zero to [`MAX_SLOTS`] distinct revealed buffs, plus the
/// running score they've produced under a particular [`Scorer`].
#[derive(Debug, Clone)]
pub struct EnhancementState {
    revealed: Vec<Reveal>,
    score: f64,
}

impl EnhancementState {
    pub fn empty() -> Self {
        Self {
            revealed: Vec::new(),
            score: 0.0,
        }
    }

    /// Builds a state from an unordered list of (buff, value_idx) pairs, recomputing score from
    /// scratch via `scorer`. Used to canonicalise caller-supplied reveal lists (`suggest`,
    /// reroll baselines/candidates) — never assumed already sorted or already scored.
    pub fn from_pairs(
        pairs: &[(Buff, u8)],
        catalogue: &Catalogue,
        scorer: &Scorer,
    ) -> Result<Self, DuplicateBuff> {
        let mut revealed: Vec<Reveal> = Vec::with_capacity(pairs.len());
        for &(buff, value_idx) in pairs {
            if revealed.iter().any(|r| r.buff == buff) {
                return Err(DuplicateBuff(buff));
            }
            revealed.push(Reveal { buff, value_idx });
        }
        revealed.sort_by_key(|r| r.buff as usize);
        let score = revealed
            .iter()
            .map(|r| scorer.score_value(catalogue, r.buff, catalogue.grid(r.buff).value(r.value_idx as usize)))
            .sum();
        Ok(Self { revealed, score })
    }

    /// Extends this state by one reveal, recomputing score incrementally (§4.2: "when a state
    /// extends by one (b, v) its score grows by score(b, v)").
    pub fn extended(&self, buff: Buff, value_idx: u8, catalogue: &Catalogue, scorer: &Scorer) -> Self {
        debug_assert!(!self.revealed.iter().any(|r| r.buff == buff));
        let mut revealed = self.revealed.clone();
        let insert_at = revealed.partition_point(|r| (r.buff as usize) < buff as usize);
        revealed.insert(insert_at, Reveal { buff, value_idx });
        let added = scorer.score_value(catalogue, buff, catalogue.grid(buff).value(value_idx as usize));
        Self {
            revealed,
            score: self.score + added,
        }
    }

    pub fn revealed(&self) -> &[Reveal] {
        &self.revealed
    }

    pub fn stage(&self) -> usize {
        self.revealed.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.revealed.len() == MAX_SLOTS
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn is_revealed(&self, buff: Buff) -> bool {
        self.revealed.iter().any(|r| r.buff == buff)
    }

    pub fn succeeds(&self, target: f64) -> bool {
        self.is_terminal() && self.score + 1e-9 >= target
    }
}

/// Two states are identical for DP purposes iff their revealed sets (buff + value index) match;
/// the running score is a pure function of that set given a fixed scorer, so it is intentionally
/// excluded from equality/hashing (it also isn't `Eq`-able, being an `f64`).
impl PartialEq for EnhancementState {
    fn eq(&self, other: &Self) -> bool {
        self.revealed == other.revealed
    }
}

impl Eq for EnhancementState {}

impl Hash for EnhancementState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.revealed.hash(state);
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DuplicateBuff(pub Buff);

impl std::fmt::Display for DuplicateBuff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "duplicate buff in slot list: {:?}", self.0)
    }
}

/// One outcome of drawing the next slot from `state`: the resulting child state and the
/// probability of reaching it, `(1 / (|Buffs| - n)) * p_v` (§4.3).
pub struct DrawOutcome {
    pub child: EnhancementState,
    pub probability: f64,
}

/// Enumerates every draw outcome from `state`, which must be non-terminal. Picks an unrevealed
/// buff uniformly at random, then a value from that buff's grid with its empirical probability.
pub fn draw_outcomes(state: &EnhancementState, catalogue: &Catalogue, scorer: &Scorer) -> Vec<DrawOutcome> {
    debug_assert!(!state.is_terminal());
    let unrevealed: Vec<Buff> = catalogue.buffs().filter(|b| !state.is_revealed(*b)).collect();
    let p_buff = 1.0 / unrevealed.len() as f64;
    let mut outcomes = Vec::new();
    for buff in unrevealed {
        let grid = catalogue.grid(buff);
        for (value_idx, _value, p_value) in grid.iter() {
            let child = state.extended(buff, value_idx as u8, catalogue, scorer);
            outcomes.push(DrawOutcome {
                child,
                probability: p_buff * p_value,
            });
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{default_catalogue, default_weights};
    use crate::scorer::{Scorer, ScorerVariant};

    fn scorer() -> Scorer {
        Scorer::new(ScorerVariant::Linear, default_weights())
    }

    #[test]
    fn order_independent_states_are_equal() {
        let catalogue = default_catalogue();
        let scorer = scorer();
        let a = EnhancementState::from_pairs(&[(Buff::CritRate, 2), (Buff::CritDamage, 1)], &catalogue, &scorer).unwrap();
        let b = EnhancementState::from_pairs(&[(Buff::CritDamage, 1), (Buff::CritRate, 2)], &catalogue, &scorer).unwrap();
        assert_eq!(a, b);
        assert!((a.score() - b.score()).abs() < 1e-12);
    }

    #[test]
    fn duplicate_buff_rejected() {
        let catalogue = default_catalogue();
        let scorer = scorer();
        let result = EnhancementState::from_pairs(&[(Buff::CritRate, 0), (Buff::CritRate, 1)], &catalogue, &scorer);
        assert_eq!(result, Err(DuplicateBuff(Buff::CritRate)));
    }

    #[test]
    fn extended_matches_from_scratch() {
        let catalogue = default_catalogue();
        let scorer = scorer();
        let base = EnhancementState::from_pairs(&[(Buff::CritRate, 3)], &catalogue, &scorer).unwrap();
        let extended = base.extended(Buff::CritDamage, 2, &catalogue, &scorer);
        let from_scratch =
            EnhancementState::from_pairs(&[(Buff::CritRate, 3), (Buff::CritDamage, 2)], &catalogue, &scorer).unwrap();
        assert!((extended.score() - from_scratch.score()).abs() < 1e-9);
        assert_eq!(extended, from_scratch);
    }

    #[test]
    fn draw_outcomes_probabilities_sum_to_one() {
        let catalogue = default_catalogue();
        let scorer = scorer();
        let state = EnhancementState::empty();
        let outcomes = draw_outcomes(&state, &catalogue, &scorer);
        let total: f64 = outcomes.iter().map(|o| o.probability).sum();
        assert!((total - 1.0).abs() < 1e-9, "total={total}");
    }

    #[test]
    fn terminal_state_detection() {
        let catalogue = default_catalogue();
        let scorer = scorer();
        let pairs: Vec<(Buff, u8)> = catalogue.buffs().take(MAX_SLOTS).map(|b| (b, 0)).collect();
        let state = EnhancementState::from_pairs(&pairs, &catalogue, &scorer).unwrap();
        assert!(state.is_terminal());
        assert_eq!(state.stage(), MAX_SLOTS);
    }
}
